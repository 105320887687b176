//! Read-only pipeline telemetry.
//!
//! Metrics only steer backpressure relief; they never change what is encoded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Frames accepted by the sampler.
    pub frames_captured: u64,
    /// Ticks skipped because drawing failed.
    pub capture_failures: u64,
    /// Frames handed to the encoder.
    pub frames_encoded: u64,
    /// Frames the encoder failed on or timed out on.
    pub frames_dropped: u64,
    /// Output indices consumed by the resampler.
    pub output_frames: u64,
    pub duplicates_skipped: u64,
    pub extras: u64,
    /// Current capture queue depth.
    pub queue_depth: usize,
    pub queue_high_water: usize,
    /// Estimated bytes held by queue, pool and resampler.
    pub memory_bytes: usize,
    pub passes: u64,
    /// Passes forced by the memory ceiling.
    pub forced_passes: u64,
}

impl PipelineMetrics {
    /// Memory estimate in MiB, for display.
    pub fn memory_mib(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }
}
