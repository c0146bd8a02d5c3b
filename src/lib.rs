//! trafficwatch - camera-based velocity enforcement core
//!
//! This crate implements the monitoring pipeline behind a traffic dashboard:
//! acquire a live video source, locate motion by frame differencing, estimate
//! object speed from consecutive centroids, and raise speeding violations.
//!
//! # Architecture
//!
//! One frame flows through four stages per tick, with no feedback edges:
//!
//! 1. `capture`: source lifecycle (acquire with fallback, classify failures,
//!    tear down). Produces the raw frame sequence.
//! 2. `motion::differ`: compares sampled pixels against the previous frame and
//!    yields at most one motion centroid per tick.
//! 3. `motion::tracker`: turns centroid+timestamp pairs into a speed reading
//!    and, past the threshold and cooldown, a `ViolationEvent`.
//! 4. `overlay`: paints tracking annotations onto an RGBA surface. Output
//!    only; no decision authority.
//!
//! The tick loop is single-threaded and cooperative; only acquisition
//! suspends, and it is cancellable. Violations flow out through a
//! `ViolationSink` (newest-first feed by default).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod capture;
pub mod config;
pub mod frame;
pub mod motion;
pub mod overlay;
pub mod pipeline;
pub mod telemetry;

pub use capture::{
    CaptureConfig, CaptureError, CaptureErrorKind, CaptureManager, CaptureStatus, Facing,
    SourceProvider, SyntheticProvider, SyntheticScene, VideoSource,
};
pub use config::{DetectionSettings, MonitorConfig, SharedSettings};
pub use frame::FrameBuffer;
pub use motion::{FrameDiffer, MotionSample, SpeedTracker, TickReading, TrackState, TrackerConfig};
pub use overlay::{Overlay, Surface};
pub use pipeline::{Monitor, TickReport};
pub use telemetry::{LinkStatus, TrafficLink, TrafficNode, TrafficSimulator, TrafficStats};

/// Seconds-since-epoch wall clock, for violation record stamps only. The
/// pipeline itself runs on monotonic session time.
pub fn now_epoch_ms() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
}

// -------------------- Violation Events --------------------

/// What a violation record claims happened.
///
/// The camera pipeline only ever produces `Speeding`; the other kinds exist
/// because the feed also displays records from external producers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Speeding,
    RedLight,
    WrongWay,
    InvalidPlate,
}

/// Severity tier, derived from recorded speed for the camera pipeline.
/// That path never produces `Low`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// An emitted violation. Immutable once created; ownership transfers to the
/// sink on emission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViolationEvent {
    pub id: String,
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Wall-clock stamp, milliseconds since the Unix epoch.
    pub recorded_at_ms: u64,
    /// Operator-facing source location label, e.g. "Enforcement Zone 4".
    pub location: String,
    pub details: String,
    pub speed_kmh: u32,
}

/// Consumer of emitted violations.
pub trait ViolationSink {
    fn record(&mut self, event: ViolationEvent);
}

impl ViolationSink for Vec<ViolationEvent> {
    fn record(&mut self, event: ViolationEvent) {
        self.push(event);
    }
}

/// Bounded newest-first feed, matching the dashboard's display list: new
/// events are prepended and the oldest fall off the back.
#[derive(Clone, Debug)]
pub struct ViolationFeed {
    entries: VecDeque<ViolationEvent>,
    capacity: usize,
}

pub const DEFAULT_FEED_CAPACITY: usize = 256;

impl ViolationFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_FEED_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ViolationEvent> {
        self.entries.iter()
    }

    pub fn latest(&self, n: usize) -> impl Iterator<Item = &ViolationEvent> {
        self.entries.iter().take(n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ViolationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationSink for ViolationFeed {
    fn record(&mut self, event: ViolationEvent) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> ViolationEvent {
        ViolationEvent {
            id: id.to_string(),
            kind: ViolationKind::Speeding,
            severity: Severity::Medium,
            recorded_at_ms: 0,
            location: "Enforcement Zone 4".to_string(),
            details: String::new(),
            speed_kmh: 42,
        }
    }

    #[test]
    fn feed_prepends_newest_first() {
        let mut feed = ViolationFeed::new();
        feed.record(event("a"));
        feed.record(event("b"));
        feed.record(event("c"));

        let ids: Vec<_> = feed.iter().map(|ev| ev.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
        assert_eq!(feed.latest(2).count(), 2);
    }

    #[test]
    fn feed_drops_oldest_past_capacity() {
        let mut feed = ViolationFeed::with_capacity(2);
        feed.record(event("a"));
        feed.record(event("b"));
        feed.record(event("c"));

        let ids: Vec<_> = feed.iter().map(|ev| ev.id.as_str()).collect();
        assert_eq!(ids, ["c", "b"]);
    }

    #[test]
    fn violation_event_serializes_with_snake_case_tags() {
        let json = serde_json::to_string(&event("v-1")).expect("serialize");
        assert!(json.contains("\"speeding\""));
        assert!(json.contains("\"medium\""));
    }
}
