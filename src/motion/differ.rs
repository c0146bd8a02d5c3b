//! Frame differencing.
//!
//! Compares sampled pixels of the newest frame against the retained previous
//! frame and reports the centroid of the changed region. Sampling every 8th
//! pixel trades full-resolution accuracy for per-tick throughput; the stride,
//! the per-pixel change threshold and the confidence floor are uncalibrated
//! heuristics carried over from field tuning, kept as named constants.

use std::time::Duration;

use crate::frame::{FrameBuffer, BYTES_PER_PIXEL};

/// Sample every Nth pixel of the frame.
pub const SAMPLE_STRIDE_PX: usize = 8;
/// A sampled pixel counts as changed when |dR|+|dG|+|dB| exceeds this.
pub const DIFF_THRESHOLD: u32 = 50;
/// Minimum changed sample count required to trust a centroid.
pub const CONFIDENCE_FLOOR: u32 = 100;

/// Tunables for the differencer. Defaults match the production calibration.
#[derive(Clone, Copy, Debug)]
pub struct DifferConfig {
    pub sample_stride_px: usize,
    pub diff_threshold: u32,
    pub confidence_floor: u32,
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            sample_stride_px: SAMPLE_STRIDE_PX,
            diff_threshold: DIFF_THRESHOLD,
            confidence_floor: CONFIDENCE_FLOOR,
        }
    }
}

/// Centroid of the changed region for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionSample {
    /// Centroid in pixel space.
    pub x: f32,
    pub y: f32,
    /// Timestamp of the frame that produced this sample.
    pub timestamp: Duration,
    /// Number of changed sample points contributing to the centroid.
    pub confidence: u32,
}

/// Holds the previous frame as comparison baseline.
///
/// The differencer owns each frame only for the duration of one comparison;
/// the new frame supersedes the baseline every tick.
#[derive(Default)]
pub struct FrameDiffer {
    config: DifferConfig,
    prev: Option<FrameBuffer>,
}

impl FrameDiffer {
    pub fn new(config: DifferConfig) -> Self {
        Self { config, prev: None }
    }

    /// Drop the baseline, so the next frame is adopted without comparison.
    /// Called on session start/stop so no stale frame carries over.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    pub fn has_baseline(&self) -> bool {
        self.prev.is_some()
    }

    /// Consume one frame, returning the motion centroid if the changed-pixel
    /// count clears the confidence floor.
    ///
    /// A dimension mismatch against the baseline (the source changed
    /// resolution mid-session) is treated as "no previous frame": comparison
    /// is skipped and the new frame becomes the baseline.
    pub fn observe(&mut self, frame: FrameBuffer) -> Option<MotionSample> {
        let sample = match &self.prev {
            Some(prev) if prev.same_shape(&frame) => self.compare(prev, &frame),
            _ => None,
        };
        self.prev = Some(frame);
        sample
    }

    fn compare(&self, prev: &FrameBuffer, frame: &FrameBuffer) -> Option<MotionSample> {
        let current = frame.pixels();
        let baseline = prev.pixels();
        let width = frame.width as usize;
        // A zero stride override must not stall the scan; one is the densest
        // sampling that still terminates.
        let byte_stride = self.config.sample_stride_px.max(1) * BYTES_PER_PIXEL;

        let mut total_x = 0u64;
        let mut total_y = 0u64;
        let mut count = 0u32;

        let mut i = 0;
        while i + 2 < current.len() {
            let dr = current[i].abs_diff(baseline[i]) as u32;
            let dg = current[i + 1].abs_diff(baseline[i + 1]) as u32;
            let db = current[i + 2].abs_diff(baseline[i + 2]) as u32;

            if dr + dg + db > self.config.diff_threshold {
                let pixel_idx = i / BYTES_PER_PIXEL;
                total_x += (pixel_idx % width) as u64;
                total_y += (pixel_idx / width) as u64;
                count += 1;
            }
            i += byte_stride;
        }

        if count <= self.config.confidence_floor {
            return None;
        }

        Some(MotionSample {
            x: total_x as f32 / count as f32,
            y: total_y as f32 / count as f32,
            timestamp: frame.timestamp,
            confidence: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 320;
    const H: u32 = 240;
    const BG: [u8; 4] = [20, 20, 20, 255];
    const FG: [u8; 4] = [250, 250, 250, 255];

    fn background(at_ms: u64) -> FrameBuffer {
        FrameBuffer::filled(W, H, BG, Duration::from_millis(at_ms))
    }

    fn with_block(left: u32, top: u32, size: u32, at_ms: u64) -> FrameBuffer {
        let mut frame = background(at_ms);
        frame.fill_rect(left, top, size, size, FG);
        frame
    }

    #[test]
    fn identical_frames_report_no_motion() {
        let mut differ = FrameDiffer::default();
        assert!(differ.observe(background(0)).is_none(), "no baseline yet");
        assert!(differ.observe(background(33)).is_none());
        assert!(differ.observe(background(66)).is_none());
    }

    #[test]
    fn centroid_lies_within_the_changed_region() {
        let mut differ = FrameDiffer::default();
        differ.observe(background(0));

        // 96x96 block: ~12 sampled columns x 96 rows of changed pixels,
        // comfortably past the confidence floor.
        let (left, top, size) = (64, 80, 96);
        let sample = differ
            .observe(with_block(left, top, size, 33))
            .expect("block clears the floor");

        assert!(sample.confidence > CONFIDENCE_FLOOR);
        assert!(sample.x >= left as f32 && sample.x <= (left + size) as f32);
        assert!(sample.y >= top as f32 && sample.y <= (top + size) as f32);
    }

    #[test]
    fn small_changes_stay_below_the_confidence_floor() {
        let mut differ = FrameDiffer::default();
        differ.observe(background(0));

        // 24x24 block: at most 3 sampled columns x 24 rows = 72 < floor.
        let sample = differ.observe(with_block(100, 100, 24, 33));
        assert!(sample.is_none());
    }

    #[test]
    fn sub_threshold_pixel_deltas_are_ignored() {
        let mut differ = FrameDiffer::default();
        differ.observe(background(0));

        // Uniform +15 per channel sums to 45, under the threshold of 50.
        let dim = FrameBuffer::filled(W, H, [35, 35, 35, 255], Duration::from_millis(33));
        assert!(differ.observe(dim).is_none());
    }

    #[test]
    fn dimension_change_resets_the_baseline() {
        let mut differ = FrameDiffer::default();
        differ.observe(with_block(0, 0, 128, 0));

        // Resolution change: no comparison, new frame adopted as baseline.
        let resized = FrameBuffer::filled(W * 2, H, BG, Duration::from_millis(33));
        assert!(differ.observe(resized).is_none());

        // Identical follow-up at the new size: still no motion.
        let followup = FrameBuffer::filled(W * 2, H, BG, Duration::from_millis(66));
        assert!(differ.observe(followup).is_none());

        // A block against the new baseline registers again.
        let mut moved = FrameBuffer::filled(W * 2, H, BG, Duration::from_millis(99));
        moved.fill_rect(200, 40, 96, 96, FG);
        assert!(differ.observe(moved).is_some());
    }

    #[test]
    fn zero_stride_override_samples_every_pixel() {
        let config = DifferConfig {
            sample_stride_px: 0,
            ..DifferConfig::default()
        };
        let mut differ = FrameDiffer::new(config);
        differ.observe(FrameBuffer::filled(32, 32, BG, Duration::ZERO));

        // All 1024 pixels change, well past the floor; the scan terminates
        // and reports the frame center.
        let sample = differ
            .observe(FrameBuffer::filled(32, 32, FG, Duration::from_millis(33)))
            .expect("full-frame change");
        assert_eq!(sample.confidence, 32 * 32);
        assert_eq!(sample.x, 15.5);
    }

    #[test]
    fn reset_clears_the_baseline() {
        let mut differ = FrameDiffer::default();
        differ.observe(with_block(0, 0, 128, 0));
        assert!(differ.has_baseline());

        differ.reset();
        assert!(!differ.has_baseline());
        // First post-reset frame is baseline only, even though it differs
        // wildly from the pre-reset one.
        assert!(differ.observe(background(33)).is_none());
    }
}
