// Capture pipeline modules

pub mod frame;
pub mod ring;
pub mod service;
pub mod source;

pub use frame::Frame;
pub use ring::FrameRing;
pub use service::{CaptureService, CaptureStats};

use source::SourceError;

/// Capture loop lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Not yet started
    Idle,
    /// Acquiring the frame source (may fall back once)
    Opening,
    /// Steady state: pulling frames, polling the trigger
    Capturing,
    /// Releasing the source and winding down the flush worker
    Draining,
    /// Terminal: all resources released
    Closed,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::Opening => "opening",
            CaptureStatus::Capturing => "capturing",
            CaptureStatus::Draining => "draining",
            CaptureStatus::Closed => "closed",
        }
    }
}

/// Error type for capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("ring buffer capacity must be at least one frame")]
    InvalidCapacity,

    #[error("frame source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),

    #[error("frame reads stalled after {failures} consecutive failures")]
    ReadStalled { failures: u32 },
}

pub type Result<T> = std::result::Result<T, CaptureError>;
