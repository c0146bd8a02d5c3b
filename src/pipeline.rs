//! Monitoring pipeline.
//!
//! Wires the four stages into one tick loop: poll the capture manager for a
//! frame, difference it against the baseline, feed the tracker, emit any
//! violation to the sink, and paint the overlay. One frame in, at most one
//! violation out; there are no feedback edges and no cross-tick queues.
//!
//! The loop is single-threaded and cooperative. Only `start` suspends (during
//! acquisition); every `tick` is synchronous and non-blocking.

use anyhow::Result;

use crate::capture::{CancelHandle, CaptureError, CaptureManager, CaptureStatus, SourceProvider};
use crate::config::SharedSettings;
use crate::motion::{DifferConfig, FrameDiffer, SpeedTracker, TrackerConfig};
use crate::overlay::{Overlay, Surface};
use crate::{now_epoch_ms, ViolationEvent, ViolationSink};

/// What one tick produced, for the caller's display layer.
#[derive(Clone, Debug)]
pub struct TickReport {
    pub speed_kmh: u32,
    pub detections: u64,
    /// Motion centroid in pixel space, when this tick's frame had trusted
    /// motion.
    pub centroid: Option<(f32, f32)>,
    /// The violation emitted this tick, if any. The sink already holds it;
    /// this copy is for immediate display.
    pub violation: Option<ViolationEvent>,
}

/// The monitoring session: capture, differencing, tracking, overlay, and the
/// violation sink, under one owner.
pub struct Monitor<P: SourceProvider, S: ViolationSink> {
    capture: CaptureManager<P>,
    differ: FrameDiffer,
    tracker: SpeedTracker,
    overlay: Overlay,
    settings: SharedSettings,
    sink: S,
}

impl<P: SourceProvider, S: ViolationSink> Monitor<P, S> {
    pub fn new(provider: P, settings: SharedSettings, sink: S) -> Self {
        Self::with_configs(
            provider,
            settings,
            sink,
            DifferConfig::default(),
            TrackerConfig::default(),
        )
    }

    pub fn with_configs(
        provider: P,
        settings: SharedSettings,
        sink: S,
        differ: DifferConfig,
        tracker: TrackerConfig,
    ) -> Self {
        Self {
            capture: CaptureManager::new(provider),
            differ: FrameDiffer::new(differ),
            tracker: SpeedTracker::new(tracker),
            overlay: Overlay::new(0, 0),
            settings,
            sink,
        }
    }

    pub fn capture_mut(&mut self) -> &mut CaptureManager<P> {
        &mut self.capture
    }

    pub fn status(&self) -> CaptureStatus {
        self.capture.status()
    }

    pub fn is_active(&self) -> bool {
        self.capture.is_active()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.capture.cancel_handle()
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The overlay surface painted by the most recent tick.
    pub fn surface(&self) -> &Surface {
        self.overlay.surface()
    }

    /// Cumulative violations this session.
    pub fn detections(&self) -> u64 {
        self.tracker.state().detections
    }

    /// Zero the detection counter without touching tracking state or the
    /// capture session.
    pub fn reset_detections(&mut self) {
        self.tracker.reset_detections();
    }

    /// Begin a monitoring session. Analysis state is cleared first so a
    /// restart never compares frames across sessions.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        self.differ.reset();
        self.tracker.reset();
        self.capture.start().await
    }

    /// End the session: release the source and clear analysis state. Safe to
    /// call when already stopped.
    pub fn stop(&mut self) {
        self.capture.stop();
        self.differ.reset();
        self.tracker.reset();
    }

    /// Run one tick. Returns `None` when there is no new frame this tick
    /// (idle, or the source has not produced one yet); the caller just polls
    /// again later.
    pub fn tick(&mut self) -> Result<Option<TickReport>> {
        let Some(frame) = self.capture.poll_frame() else {
            return Ok(None);
        };

        self.overlay.begin_tick(&frame);
        let sample = self.differ.observe(frame);

        // Threshold is read fresh each tick so settings changes apply to the
        // very next frame.
        let reading = match sample {
            Some(sample) => {
                self.tracker
                    .observe(sample, self.settings.speed_threshold_kmh(), now_epoch_ms()?)
            }
            None => self.tracker.observe_idle(),
        };

        if let Some(event) = reading.violation.clone() {
            log::info!(
                "violation {}: {} km/h ({:?}) at {}",
                event.id,
                event.speed_kmh,
                event.severity,
                event.location
            );
            self.sink.record(event);
        }

        let centroid = sample.map(|s| (s.x, s.y));
        self.overlay.paint(centroid, &reading);

        Ok(Some(TickReport {
            speed_kmh: reading.speed_kmh,
            detections: reading.detections,
            centroid,
            violation: reading.violation,
        }))
    }
}
