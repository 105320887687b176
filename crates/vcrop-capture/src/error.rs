//! Error types for frame capture.

use thiserror::Error;

/// Failures while drawing or extracting a masked frame.
///
/// These never abort a recording: the sampler logs them and skips the tick.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The mask or video rectangle cannot be mapped onto source pixels.
    #[error("Invalid capture geometry: {0}")]
    Geometry(String),

    /// The video element has no decoded frame (unloaded, not yet ready).
    #[error("Pixel source detached")]
    Detached,

    /// The platform failed to draw or read back pixels.
    #[error("Draw failed: {0}")]
    Draw(String),
}

/// Result type alias for capture operations.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
