//! Speed estimation and violation gating.
//!
//! Converts consecutive motion samples into a scalar speed and, past the
//! detection threshold and cooldown, a `ViolationEvent`. The km/h figure is a
//! fixed linear scaling of pixels-per-second - a calibration-free heuristic,
//! not a real-world speed measurement.
//!
//! State transitions are pure: `step` maps (state, sample) to (state',
//! reading), so the tracker is unit-testable without a video source. The
//! `SpeedTracker` wrapper owns the state with single-writer discipline.

use std::time::Duration;

use crate::motion::differ::MotionSample;
use crate::{Severity, ViolationEvent, ViolationKind};

/// km/h per pixel-per-second. Arbitrary calibration constant; see module doc.
pub const SPEED_SCALE: f64 = 0.12;
/// Minimum gap between two emitted violations.
pub const VIOLATION_COOLDOWN: Duration = Duration::from_millis(3000);
/// Speeds above this are tiered High; at or below, Medium.
pub const HIGH_SEVERITY_KMH: u32 = 80;

/// Tracker tunables. Defaults preserve the production calibration.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub speed_scale: f64,
    pub cooldown: Duration,
    pub high_severity_kmh: u32,
    /// Source location label stamped onto emitted violations.
    pub location: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            speed_scale: SPEED_SCALE,
            cooldown: VIOLATION_COOLDOWN,
            high_severity_kmh: HIGH_SEVERITY_KMH,
            location: "Enforcement Zone 4".to_string(),
        }
    }
}

/// The tracker's persistent memory. Cleared when the capture session stops.
#[derive(Clone, Debug, Default)]
pub struct TrackState {
    /// Last trusted motion sample.
    pub last: Option<MotionSample>,
    /// Session time of the last emitted violation. Monotonically
    /// non-decreasing once set.
    pub last_violation_at: Option<Duration>,
    /// Cumulative violations emitted this session.
    pub detections: u64,
}

/// Output of one tracker tick.
#[derive(Clone, Debug, Default)]
pub struct TickReading {
    /// Instantaneous speed readout. Zero on no-motion ticks and on the first
    /// sample after a reset.
    pub speed_kmh: u32,
    pub violation: Option<ViolationEvent>,
    pub detections: u64,
}

pub struct SpeedTracker {
    config: TrackerConfig,
    state: TrackState,
}

impl SpeedTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: TrackState::default(),
        }
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Clear all tracker memory. Called on session stop/restart.
    pub fn reset(&mut self) {
        self.state = TrackState::default();
    }

    /// Reset only the cumulative detection counter (the dashboard's "purge").
    pub fn reset_detections(&mut self) {
        self.state.detections = 0;
    }

    /// Feed one trusted motion sample.
    ///
    /// `threshold_kmh` is read fresh from settings every tick rather than
    /// cached at start. `wall_clock_ms` stamps any emitted violation record;
    /// gating itself runs on the sample's monotonic session time.
    pub fn observe(
        &mut self,
        sample: MotionSample,
        threshold_kmh: u32,
        wall_clock_ms: u64,
    ) -> TickReading {
        let state = std::mem::take(&mut self.state);
        let (state, reading) = Self::step(&self.config, state, sample, threshold_kmh, wall_clock_ms);
        self.state = state;
        reading
    }

    /// A tick with no trusted motion: the speed readout drops to zero but the
    /// sample history is kept, so a brief occlusion does not restart tracking.
    pub fn observe_idle(&mut self) -> TickReading {
        TickReading {
            speed_kmh: 0,
            violation: None,
            detections: self.state.detections,
        }
    }

    /// Pure transition function; see module doc.
    pub fn step(
        config: &TrackerConfig,
        mut state: TrackState,
        sample: MotionSample,
        threshold_kmh: u32,
        wall_clock_ms: u64,
    ) -> (TrackState, TickReading) {
        let mut speed_kmh = 0u32;
        let mut violation = None;

        if let Some(prev) = &state.last {
            let elapsed = sample.timestamp.saturating_sub(prev.timestamp);
            if !elapsed.is_zero() {
                let dx = (sample.x - prev.x) as f64;
                let dy = (sample.y - prev.y) as f64;
                let distance_px = (dx * dx + dy * dy).sqrt();
                speed_kmh =
                    (distance_px / elapsed.as_secs_f64() * config.speed_scale).round() as u32;

                let cooled = state
                    .last_violation_at
                    .map_or(true, |at| sample.timestamp >= at + config.cooldown);

                if speed_kmh > threshold_kmh && cooled {
                    state.detections += 1;
                    state.last_violation_at = Some(sample.timestamp);
                    violation = Some(Self::make_violation(
                        config,
                        speed_kmh,
                        wall_clock_ms,
                        state.detections,
                    ));
                }
            }
            // Zero elapsed time: same-timestamp sample, keep the reading at
            // zero rather than dividing by it.
        }

        state.last = Some(sample);
        let reading = TickReading {
            speed_kmh,
            violation,
            detections: state.detections,
        };
        (state, reading)
    }

    fn make_violation(
        config: &TrackerConfig,
        speed_kmh: u32,
        wall_clock_ms: u64,
        sequence: u64,
    ) -> ViolationEvent {
        let severity = if speed_kmh > config.high_severity_kmh {
            Severity::High
        } else {
            Severity::Medium
        };
        ViolationEvent {
            id: format!("v-{wall_clock_ms}-{sequence}"),
            kind: ViolationKind::Speeding,
            severity,
            recorded_at_ms: wall_clock_ms,
            location: config.location.clone(),
            details: format!("Velocity violation: {speed_kmh} km/h recorded."),
            speed_kmh,
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
