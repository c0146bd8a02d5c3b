//! Motion analysis.
//!
//! Two stages, both infallible in steady state: the differencer locates the
//! centroid of change between consecutive frames, and the tracker turns
//! consecutive centroids into a speed reading and violation events. A missing
//! baseline or a mid-session dimension change is a recognized condition, not
//! an error.

pub mod differ;
pub mod tracker;

pub use differ::{DifferConfig, FrameDiffer, MotionSample};
pub use tracker::{SpeedTracker, TickReading, TrackState, TrackerConfig};
