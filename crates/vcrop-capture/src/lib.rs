//! vcrop Capture - producer side of the pipeline
//!
//! Architecture:
//! - `BufferPool`: recycles fixed-size RGBA buffers
//! - `FrameSampler`: per-tick decision to capture the masked region
//! - `CaptureQueue`: FIFO of captured frames awaiting a resampler pass
//! - `source`: capability traits for the player and mask widget

pub mod buffer_pool;
pub mod error;
pub mod queue;
pub mod sampler;
pub mod source;

pub use buffer_pool::{BufferPool, PoolStats};
pub use error::{CaptureError, CaptureResult};
pub use queue::CaptureQueue;
pub use sampler::{FrameSampler, SampleOutcome, SamplerConfig, SamplerStats};
pub use source::{BufferSource, FixedMask, MaskGeometry, PixelSource, PlaybackControl};
