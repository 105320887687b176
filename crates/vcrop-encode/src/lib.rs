//! vcrop Encode - consumer side of the pipeline
//!
//! This crate handles:
//! - The encoder/muxer capability traits and configuration fallback
//! - The per-attempt encoder session state machine
//! - Pass-through container writing
//! - H.264 via an FFmpeg sidecar and MP4 via muxide

pub mod chunk;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod mp4;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod writer;

pub use chunk::{chunk_channel, ChunkMetadata, ChunkReceiver, ChunkSender, EncodedChunk};
pub use encoder::{try_configure, CodecPlatform, ConfigAttempt, ConfiguredWith, EncoderConfig, VideoEncoder};
pub use error::{EncodeError, EncodeResult};
pub use ffmpeg::{FfmpegEncoder, FfmpegPlatform};
pub use mp4::Mp4Muxer;
pub use session::{EncoderSession, SessionOptions, SessionState, SessionStats, SubmitOutcome};
pub use writer::{ContainerMuxer, ContainerWriter};
