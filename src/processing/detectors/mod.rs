pub mod beat;

pub use beat::BeatDetector;

/// A detected heartbeat, in seconds since session start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    pub timestamp: f64,
}
