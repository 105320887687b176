//! Pipeline configuration.
//!
//! Output geometry, codec profile and bitrate default to the fixed output
//! contract in [`crate::output`]; the remaining knobs tune capture cadence,
//! backpressure and timeouts. Loaded from JSON with every field optional.

use crate::error::{Result, VcropError};
use crate::memory_budget;
use crate::output;
use crate::time::FrameRate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// H.264 level constraint requested from the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum H264Level {
    #[serde(rename = "3.1")]
    L3_1,
    #[serde(rename = "4.0")]
    L4_0,
    #[serde(rename = "4.2")]
    L4_2,
    #[serde(rename = "5.1")]
    L5_1,
}

impl H264Level {
    /// Level name as understood by ffmpeg/x264.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L3_1 => "3.1",
            Self::L4_0 => "4.0",
            Self::L4_2 => "4.2",
            Self::L5_1 => "5.1",
        }
    }

    /// MaxFS: largest frame size in 16x16 macroblocks allowed at this level.
    pub fn max_frame_macroblocks(self) -> u32 {
        match self {
            Self::L3_1 => 3_600,
            Self::L4_0 | Self::L4_2 => 8_192,
            Self::L5_1 => 36_864,
        }
    }

    /// Whether a `width` x `height` frame fits this level.
    pub fn fits(self, width: u32, height: u32) -> bool {
        let mbs = width.div_ceil(16) * height.div_ceil(16);
        mbs <= self.max_frame_macroblocks()
    }
}

/// The output encoding profile (single codec, fixed geometry and rate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub bitrate_bps: u32,
    pub fallback_bitrate_bps: u32,
    pub keyframe_interval: u64,
    pub level: H264Level,
}

impl Default for OutputProfile {
    fn default() -> Self {
        Self {
            width: output::WIDTH,
            height: output::HEIGHT,
            frame_rate: output::FRAME_RATE,
            bitrate_bps: output::BITRATE_BPS,
            fallback_bitrate_bps: output::FALLBACK_BITRATE_BPS,
            keyframe_interval: output::KEYFRAME_INTERVAL,
            level: H264Level::L3_1,
        }
    }
}

/// Configuration for one recording pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output encoding profile.
    pub output: OutputProfile,
    /// Target sampling rate; the sampler accepts at most one frame per
    /// `1000 / capture_fps` milliseconds.
    pub capture_fps: f64,
    /// Countdown shown before recording starts.
    pub countdown_ms: u64,
    /// Frames taken from the queue by the first resampler pass.
    pub first_chunk_size: usize,
    /// Frames taken from the queue by every later pass.
    pub chunk_size: usize,
    /// Queue depth that triggers the first pass.
    pub first_pass_threshold: usize,
    /// Queue depth that triggers every later pass.
    pub pass_threshold: usize,
    /// Estimated capture memory (queue + pool + retained) that forces a pass.
    pub memory_ceiling_bytes: usize,
    /// Maximum free buffers kept by the pool.
    pub pool_capacity: usize,
    /// Queue depth above which a warning is logged.
    pub queue_warn_depth: usize,
    /// Initialize the encoder session while the countdown runs.
    pub prewarm_session: bool,
    /// Per-frame encode timeout.
    pub frame_timeout_ms: u64,
    /// Timeout for draining the encoder at the end of a recording.
    pub flush_timeout_ms: u64,
    /// The resampler yields to the scheduler after this many output frames.
    pub yield_every: usize,
    /// Fraction of the total duration, at the end, in which duplicate output
    /// frames are emitted instead of skipped.
    pub tail_fraction: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output: OutputProfile::default(),
            capture_fps: 30.0,
            countdown_ms: 3_000,
            first_chunk_size: 5,
            chunk_size: 30,
            first_pass_threshold: 5,
            pass_threshold: 30,
            memory_ceiling_bytes: memory_budget::CAPTURE_CEILING,
            pool_capacity: memory_budget::POOL_CAPACITY,
            queue_warn_depth: memory_budget::QUEUE_WARN_DEPTH,
            prewarm_session: true,
            frame_timeout_ms: 5_000,
            flush_timeout_ms: 30_000,
            yield_every: 5,
            tail_fraction: 0.1,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Minimum time between two accepted samples.
    pub fn capture_interval_ms(&self) -> f64 {
        1000.0 / self.capture_fps
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let out = &self.output;
        if !out.frame_rate.is_valid() {
            return Err(VcropError::Config("output frame rate must be non-zero".into()));
        }
        if out.width == 0 || out.height == 0 || out.width % 2 != 0 || out.height % 2 != 0 {
            return Err(VcropError::Config(format!(
                "output size {}x{} must be non-zero and even",
                out.width, out.height
            )));
        }
        if out.bitrate_bps == 0 || out.fallback_bitrate_bps == 0 {
            return Err(VcropError::Config("bitrates must be non-zero".into()));
        }
        if out.keyframe_interval == 0 {
            return Err(VcropError::Config("keyframe interval must be non-zero".into()));
        }
        if !(self.capture_fps.is_finite() && self.capture_fps > 0.0) {
            return Err(VcropError::Config(format!(
                "capture fps {} must be positive",
                self.capture_fps
            )));
        }
        if self.first_chunk_size == 0 || self.chunk_size == 0 {
            return Err(VcropError::Config("chunk sizes must be non-zero".into()));
        }
        if self.first_pass_threshold == 0 || self.pass_threshold == 0 {
            return Err(VcropError::Config("pass thresholds must be non-zero".into()));
        }
        if self.yield_every == 0 {
            return Err(VcropError::Config("yield_every must be non-zero".into()));
        }
        if !(0.0..1.0).contains(&self.tail_fraction) {
            return Err(VcropError::Config(format!(
                "tail fraction {} must be in [0, 1)",
                self.tail_fraction
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.output.width, 720);
        assert_eq!(config.output.height, 1280);
        assert!((config.capture_interval_ms() - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_default_output_fits_level() {
        let out = OutputProfile::default();
        assert!(out.level.fits(out.width, out.height));
        assert!(!H264Level::L3_1.fits(1080, 1920));
        assert!(H264Level::L4_0.fits(1080, 1920));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{ "capture_fps": 24.0, "countdown_ms": 0, "output": { "level": "4.0" } }"#,
        )
        .unwrap();
        assert_eq!(config.capture_fps, 24.0);
        assert_eq!(config.countdown_ms, 0);
        assert_eq!(config.output.level, H264Level::L4_0);
        assert_eq!(config.output.width, output::WIDTH);
        assert_eq!(config.chunk_size, 30);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let odd = r#"{ "output": { "width": 721 } }"#;
        assert!(matches!(
            PipelineConfig::from_json_str(odd),
            Err(VcropError::Config(_))
        ));

        let tail = r#"{ "tail_fraction": 1.5 }"#;
        assert!(PipelineConfig::from_json_str(tail).is_err());

        assert!(matches!(
            PipelineConfig::from_json_str("{ not json"),
            Err(VcropError::Serialization(_))
        ));
    }
}
