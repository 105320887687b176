//! Encoder capability interface and configuration fallback.
//!
//! The runtime platform supplies the encoder and muxer primitives through
//! [`CodecPlatform`]. Configuration is attempted against an ordered list of
//! candidates: the full output profile first, then a minimal one.

use crate::chunk::ChunkSender;
use crate::error::{EncodeError, EncodeResult};
use crate::writer::ContainerMuxer;
use tracing::{info, warn};
use vcrop_core::{FrameRate, H264Level, OutputProfile, PixelBuffer, Timestamp};

/// Encoder configuration for the single supported codec (H.264 baseline).
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
    /// Frame-rate hint.
    pub frame_rate: Option<FrameRate>,
    /// Level constraint.
    pub level: Option<H264Level>,
    /// Favour latency over compression.
    pub realtime: bool,
    /// Distance between forced key frames.
    pub keyframe_interval: u64,
}

impl EncoderConfig {
    /// Full configuration for the output profile.
    pub fn primary(profile: &OutputProfile) -> Self {
        Self {
            width: profile.width,
            height: profile.height,
            bitrate_bps: profile.bitrate_bps,
            frame_rate: Some(profile.frame_rate),
            level: Some(profile.level),
            realtime: true,
            keyframe_interval: profile.keyframe_interval,
        }
    }

    /// Minimal configuration: lower bitrate, no optional fields.
    pub fn fallback(profile: &OutputProfile) -> Self {
        Self {
            width: profile.width,
            height: profile.height,
            bitrate_bps: profile.fallback_bitrate_bps,
            frame_rate: None,
            level: None,
            realtime: false,
            keyframe_interval: profile.keyframe_interval,
        }
    }

    /// Candidates in the order they are tried.
    pub fn candidates(profile: &OutputProfile) -> [Self; 2] {
        [Self::primary(profile), Self::fallback(profile)]
    }
}

/// A streaming video encoder.
///
/// Encoded output is delivered on the [`ChunkSender`] given to `configure`,
/// in submission order.
#[allow(async_fn_in_trait)]
pub trait VideoEncoder {
    /// Apply a configuration. A rejected configuration leaves the encoder
    /// unconfigured so another candidate can be tried.
    fn configure(&mut self, config: &EncoderConfig, output: ChunkSender) -> EncodeResult<()>;

    /// Submit one RGBA frame.
    async fn encode(&mut self, frame: &PixelBuffer, timestamp: Timestamp, key_frame: bool) -> EncodeResult<()>;

    /// Emit everything still buffered inside the encoder.
    async fn flush(&mut self) -> EncodeResult<()>;

    /// Release encoder resources. Must be idempotent.
    fn close(&mut self);
}

/// Factory for the encoder and container primitives of one runtime.
pub trait CodecPlatform {
    type Encoder: VideoEncoder;
    type Muxer: ContainerMuxer;

    /// Whether an H.264 encoder exists at all.
    fn encoder_available(&self) -> bool;

    /// A fresh, unconfigured encoder.
    fn create_encoder(&self) -> Self::Encoder;

    /// A fresh container for the output profile.
    fn create_muxer(&self, profile: &OutputProfile) -> EncodeResult<Self::Muxer>;
}

/// Which candidate configuration was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfiguredWith {
    Primary,
    Fallback,
}

/// Outcome of [`try_configure`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigAttempt {
    pub used: ConfiguredWith,
    pub config: EncoderConfig,
    /// Why the primary configuration was rejected, if it was.
    pub primary_rejection: Option<String>,
}

/// Configure `encoder` with the first candidate it accepts.
///
/// Only [`EncodeError::ConfigRejected`] moves on to the next candidate; any
/// other error (e.g. the encoder being unavailable) is returned at once.
pub fn try_configure<E: VideoEncoder + ?Sized>(
    encoder: &mut E,
    candidates: &[EncoderConfig; 2],
    output: &ChunkSender,
) -> EncodeResult<ConfigAttempt> {
    let [primary, fallback] = candidates;

    let primary_rejection = match encoder.configure(primary, output.clone()) {
        Ok(()) => {
            info!(bitrate = primary.bitrate_bps, "Encoder configured");
            return Ok(ConfigAttempt {
                used: ConfiguredWith::Primary,
                config: primary.clone(),
                primary_rejection: None,
            });
        }
        Err(EncodeError::ConfigRejected(reason)) => reason,
        Err(e) => return Err(e),
    };

    warn!(reason = %primary_rejection, "Primary encoder configuration rejected, trying fallback");
    match encoder.configure(fallback, output.clone()) {
        Ok(()) => {
            info!(bitrate = fallback.bitrate_bps, "Encoder configured with fallback");
            Ok(ConfigAttempt {
                used: ConfiguredWith::Fallback,
                config: fallback.clone(),
                primary_rejection: Some(primary_rejection),
            })
        }
        Err(EncodeError::ConfigRejected(reason)) => Err(EncodeError::ConfigRejected(format!(
            "primary: {primary_rejection}; fallback: {reason}"
        ))),
        Err(e) => Err(e),
    }
}
