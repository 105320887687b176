//! vcrop Pipeline - orchestration of one recording
//!
//! - `Resampler`: maps irregular captures onto the fixed output frame grid
//! - `PipelineController`: phase machine, pass scheduling and teardown
//! - `RecordingOutput`: the finished file and its generated name

pub mod cancel;
pub mod controller;
pub mod error;
pub mod events;
pub mod metrics;
pub mod output;
pub mod resampler;

pub use cancel::CancelHandle;
pub use controller::{PassReport, PipelineController, PipelinePhase, PipelineState};
pub use error::{PipelineError, PipelineResult};
pub use events::{EventSink, PipelineEvent};
pub use metrics::PipelineMetrics;
pub use output::{generate_file_name, RecordingOutput};
pub use resampler::{Horizon, OutputFrameSlot, Resampler, ResamplerStats, SlotKind};
