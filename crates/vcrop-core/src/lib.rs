//! vcrop Core - Foundation types for the capture-to-encode pipeline
//!
//! This crate provides the fundamental types used throughout vcrop:
//! - Pixel buffers and captured frames
//! - Output frame rate and timestamp maths
//! - Geometric primitives for mask-to-source mapping
//! - Pipeline configuration and the fixed output contract

pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod time;

pub use config::{H264Level, OutputProfile, PipelineConfig};
pub use error::{Result, VcropError};
pub use frame::{CapturedFrame, FrameId, PixelBuffer};
pub use geometry::{Rect, SourceRect};
pub use time::{FrameRate, Timestamp};

/// Fixed output contract: every recording is encoded to these values.
pub mod output {
    use crate::time::FrameRate;

    /// Output width in pixels (portrait).
    pub const WIDTH: u32 = 720;

    /// Output height in pixels (portrait).
    pub const HEIGHT: u32 = 1280;

    /// Output frame rate.
    pub const FRAME_RATE: FrameRate = FrameRate::FPS_30;

    /// Target bitrate of the primary encoder configuration.
    pub const BITRATE_BPS: u32 = 2_500_000;

    /// Bitrate used by the minimal fallback configuration.
    pub const FALLBACK_BITRATE_BPS: u32 = 1_000_000;

    /// A key frame is forced on the first frame and every N frames after it.
    pub const KEYFRAME_INTERVAL: u64 = 30;

    /// Container file extension.
    pub const EXTENSION: &str = "mp4";
}

/// Memory budget constants for the capture side.
pub mod memory_budget {
    /// Estimated bytes of captured-but-unencoded frames before a pass is forced.
    pub const CAPTURE_CEILING: usize = 256 * 1024 * 1024; // 256 MB

    /// Maximum number of free buffers kept by the pool.
    pub const POOL_CAPACITY: usize = 24;

    /// Queue depth above which a warning is logged.
    pub const QUEUE_WARN_DEPTH: usize = 90;
}
