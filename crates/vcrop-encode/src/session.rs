//! Encoder session: one encoder plus one container for one recording attempt.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> Encoding -> Flushing -> Finalized
//!        \______________\____________\________\___________\______-> Failed
//! ```
//!
//! Sessions are never reused. A new attempt builds a new session after the
//! previous one has been aborted.

use crate::chunk::{chunk_channel, ChunkReceiver};
use crate::encoder::{try_configure, CodecPlatform, ConfigAttempt, ConfiguredWith, EncoderConfig, VideoEncoder};
use crate::error::{EncodeError, EncodeResult};
use crate::writer::ContainerWriter;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vcrop_core::{OutputProfile, PipelineConfig, PixelBuffer, Timestamp};

/// Warnings kept for display; older ones are only counted.
const MAX_WARNINGS: usize = 64;

/// Lifecycle of an [`EncoderSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Encoding,
    Flushing,
    Finalized,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed)
    }

    /// Accepting frames.
    pub fn can_submit(self) -> bool {
        matches!(self, Self::Ready | Self::Encoding)
    }
}

/// Session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub profile: OutputProfile,
    pub frame_timeout: Duration,
    pub flush_timeout: Duration,
}

impl SessionOptions {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            profile: config.output.clone(),
            frame_timeout: config.frame_timeout(),
            flush_timeout: config.flush_timeout(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default())
    }
}

/// Result of submitting one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Handed to the encoder.
    Submitted { key_frame: bool },
    /// The encoder failed or timed out on this frame; it was dropped.
    Dropped(String),
    /// The frame was refused before reaching the encoder.
    Rejected(String),
}

/// Session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub submitted: u64,
    pub key_frames: u64,
    pub dropped: u64,
    pub timed_out: u64,
    pub rejected: u64,
    /// Chunks handed to the container.
    pub chunks: u64,
    pub chunk_bytes: u64,
    pub warnings: u64,
}

pub struct EncoderSession<P: CodecPlatform> {
    state: SessionState,
    options: SessionOptions,
    encoder: Option<P::Encoder>,
    writer: Option<ContainerWriter<P::Muxer>>,
    chunks: Option<ChunkReceiver>,
    configured: Option<ConfigAttempt>,
    frame_index: u64,
    force_key_frame: bool,
    last_timestamp: Option<Timestamp>,
    stats: SessionStats,
    warnings: Vec<String>,
}

impl<P: CodecPlatform> EncoderSession<P> {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            state: SessionState::Uninitialized,
            options,
            encoder: None,
            writer: None,
            chunks: None,
            configured: None,
            frame_index: 0,
            force_key_frame: false,
            last_timestamp: None,
            stats: SessionStats::default(),
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Recent recoverable problems, oldest first.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The configuration the encoder accepted.
    pub fn configuration(&self) -> Option<&ConfigAttempt> {
        self.configured.as_ref()
    }

    pub fn configured_with(&self) -> Option<ConfiguredWith> {
        self.configured.as_ref().map(|c| c.used)
    }

    /// Timestamp of the last frame handed to the encoder.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Create the container and configure the encoder, falling back once to
    /// the minimal configuration.
    pub fn initialize(&mut self, platform: &P) -> EncodeResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(self.invalid("initialize"));
        }
        self.state = SessionState::Initializing;

        if !platform.encoder_available() {
            return Err(self.fail(EncodeError::Unavailable("no H.264 encoder in this runtime".into())));
        }

        let muxer = match platform.create_muxer(&self.options.profile) {
            Ok(m) => m,
            Err(e) => return Err(self.fail(e)),
        };

        let (tx, rx) = chunk_channel();
        let mut encoder = platform.create_encoder();
        let candidates = EncoderConfig::candidates(&self.options.profile);
        let attempt = match try_configure(&mut encoder, &candidates, &tx) {
            Ok(a) => a,
            Err(e) => {
                encoder.close();
                return Err(self.fail(e));
            }
        };

        if let Some(reason) = &attempt.primary_rejection {
            self.warn(format!("using fallback encoder configuration: {reason}"));
        }
        info!(
            width = attempt.config.width,
            height = attempt.config.height,
            bitrate = attempt.config.bitrate_bps,
            used = ?attempt.used,
            "Encoder session ready"
        );

        self.encoder = Some(encoder);
        self.writer = Some(ContainerWriter::new(muxer));
        self.chunks = Some(rx);
        self.configured = Some(attempt);
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Submit one output frame.
    ///
    /// Per-frame failures and timeouts drop the frame and are reported in the
    /// outcome; only container failures are returned as errors, and those
    /// fail the session.
    pub async fn submit(&mut self, frame: &PixelBuffer, timestamp: Timestamp) -> EncodeResult<SubmitOutcome> {
        if !self.state.can_submit() {
            return Err(self.invalid("submit"));
        }

        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                self.stats.rejected += 1;
                let reason = format!("timestamp {timestamp} does not follow {last}");
                self.warn(reason.clone());
                return Ok(SubmitOutcome::Rejected(reason));
            }
        }
        let expected = (self.options.profile.width, self.options.profile.height);
        if frame.dimensions() != expected {
            self.stats.rejected += 1;
            let reason = format!(
                "frame is {}x{}, session expects {}x{}",
                frame.width(),
                frame.height(),
                expected.0,
                expected.1
            );
            self.warn(reason.clone());
            return Ok(SubmitOutcome::Rejected(reason));
        }

        let interval = self.options.profile.keyframe_interval.max(1);
        let key_frame = self.force_key_frame || self.frame_index % interval == 0;
        let timeout = self.options.frame_timeout;
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| EncodeError::InvalidState("session has no encoder".into()))?;

        let result = tokio::time::timeout(timeout, encoder.encode(frame, timestamp, key_frame)).await;
        self.frame_index += 1;
        self.last_timestamp = Some(timestamp);
        self.state = SessionState::Encoding;

        let outcome = match result {
            Ok(Ok(())) => {
                self.stats.submitted += 1;
                if key_frame {
                    self.stats.key_frames += 1;
                }
                self.force_key_frame = false;
                SubmitOutcome::Submitted { key_frame }
            }
            Ok(Err(e)) => {
                self.stats.dropped += 1;
                self.force_key_frame |= key_frame;
                let reason = format!("frame at {timestamp} dropped: {e}");
                self.warn(reason.clone());
                SubmitOutcome::Dropped(reason)
            }
            Err(_) => {
                self.stats.dropped += 1;
                self.stats.timed_out += 1;
                self.force_key_frame |= key_frame;
                let e = EncodeError::Timeout(timeout.as_millis() as u64);
                let reason = format!("frame at {timestamp} dropped: {e}");
                self.warn(reason.clone());
                SubmitOutcome::Dropped(reason)
            }
        };

        self.pump()?;
        Ok(outcome)
    }

    /// Move every chunk the encoder has emitted into the container.
    pub fn pump(&mut self) -> EncodeResult<usize> {
        let (Some(rx), Some(writer)) = (self.chunks.as_ref(), self.writer.as_mut()) else {
            return Ok(0);
        };

        let mut written = 0;
        let mut failure = None;
        while let Ok(chunk) = rx.try_recv() {
            if let Err(e) = writer.write(&chunk) {
                failure = Some(e);
                break;
            }
            written += 1;
            self.stats.chunks += 1;
            self.stats.chunk_bytes += chunk.data.len() as u64;
        }

        match failure {
            Some(e) => Err(self.fail(e)),
            None => Ok(written),
        }
    }

    /// Drain frames still inside the encoder. Must precede [`finalize`](Self::finalize).
    pub async fn flush(&mut self) -> EncodeResult<()> {
        if !self.state.can_submit() {
            return Err(self.invalid("flush"));
        }
        self.state = SessionState::Flushing;

        let timeout = self.options.flush_timeout;
        let result = match self.encoder.as_mut() {
            Some(encoder) => tokio::time::timeout(timeout, encoder.flush()).await,
            None => return Err(self.fail(EncodeError::InvalidState("session has no encoder".into()))),
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(_) => {
                return Err(self.fail(EncodeError::Flush(format!(
                    "encoder did not drain within {} ms",
                    timeout.as_millis()
                ))))
            }
        }

        let written = self.pump()?;
        debug!(written, total = self.stats.chunks, "Encoder flushed");
        Ok(())
    }

    /// Seal the container and return the finished file.
    pub fn finalize(&mut self) -> EncodeResult<Vec<u8>> {
        if self.state != SessionState::Flushing {
            return Err(self.invalid("finalize"));
        }
        self.pump()?;

        let Some(writer) = self.writer.take() else {
            return Err(self.fail(EncodeError::InvalidState("session has no container".into())));
        };
        match writer.finalize() {
            Ok(bytes) => {
                self.release();
                self.state = SessionState::Finalized;
                info!(
                    bytes = bytes.len(),
                    chunks = self.stats.chunks,
                    dropped = self.stats.dropped,
                    "Encoder session finalized"
                );
                Ok(bytes)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Close the encoder and discard the container. Safe from any state and
    /// safe to call repeatedly; a non-terminal session ends up `Failed`.
    pub fn abort(&mut self) {
        let had_resources = self.encoder.is_some() || self.writer.is_some();
        self.release();
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
        }
        if had_resources {
            debug!("Encoder session aborted");
        }
    }

    fn release(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.close();
        }
        self.writer = None;
        self.chunks = None;
    }

    fn fail(&mut self, err: EncodeError) -> EncodeError {
        error!(error = %err, state = ?self.state, "Encoder session failed");
        self.release();
        self.state = SessionState::Failed;
        err
    }

    fn invalid(&self, op: &str) -> EncodeError {
        EncodeError::InvalidState(format!("cannot {op} in state {:?}", self.state))
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.stats.warnings += 1;
        if self.warnings.len() == MAX_WARNINGS {
            self.warnings.remove(0);
        }
        self.warnings.push(message);
    }
}

impl<P: CodecPlatform> Drop for EncoderSession<P> {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Faults, MemoryPlatform, MEMORY_CONTAINER_HEADER};

    fn options() -> SessionOptions {
        let mut profile = OutputProfile::default();
        profile.width = 8;
        profile.height = 16;
        profile.keyframe_interval = 3;
        SessionOptions {
            profile,
            frame_timeout: Duration::from_millis(100),
            flush_timeout: Duration::from_millis(500),
        }
    }

    fn frame() -> PixelBuffer {
        PixelBuffer::test_pattern(8, 16)
    }

    fn ts(i: i64) -> Timestamp {
        Timestamp::from_micros(i * 33_333)
    }

    fn ready(platform: &MemoryPlatform) -> EncoderSession<MemoryPlatform> {
        let mut session = EncoderSession::new(options());
        session.initialize(platform).unwrap();
        session
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let platform = MemoryPlatform::default();
        let mut session = ready(&platform);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.configured_with(), Some(ConfiguredWith::Primary));

        for i in 0..7 {
            let outcome = session.submit(&frame(), ts(i)).await.unwrap();
            assert_eq!(outcome, SubmitOutcome::Submitted { key_frame: i % 3 == 0 });
        }
        assert_eq!(session.state(), SessionState::Encoding);

        session.flush().await.unwrap();
        let bytes = session.finalize().unwrap();
        assert!(bytes.starts_with(MEMORY_CONTAINER_HEADER));
        assert_eq!(session.state(), SessionState::Finalized);

        let stats = session.stats();
        assert_eq!(stats.submitted, 7);
        assert_eq!(stats.key_frames, 3);
        assert_eq!(stats.chunks, 7);

        let log = platform.log();
        assert_eq!(log.encoders_closed, 1);
        assert_eq!(log.muxers_finished, 1);
    }

    #[tokio::test]
    async fn test_unavailable_is_fatal() {
        let platform = MemoryPlatform::new(Faults {
            unavailable: true,
            ..Faults::default()
        });
        let mut session = EncoderSession::new(options());
        let err = session.initialize(&platform).unwrap_err();
        assert!(matches!(err, EncodeError::Unavailable(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(platform.log().configs.is_empty());
    }

    #[tokio::test]
    async fn test_config_rejected_once_uses_fallback() {
        let platform = MemoryPlatform::new(Faults {
            reject_configs: 1,
            ..Faults::default()
        });
        let session = ready(&platform);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.configured_with(), Some(ConfiguredWith::Fallback));
        assert_eq!(session.warnings().len(), 1);
        assert_eq!(platform.log().configs.len(), 2);
    }

    #[tokio::test]
    async fn test_both_configs_rejected() {
        let platform = MemoryPlatform::new(Faults {
            reject_configs: 2,
            ..Faults::default()
        });
        let mut session = EncoderSession::new(options());
        assert!(session.initialize(&platform).is_err());
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(platform.log().encoders_closed, 1);
    }

    #[tokio::test]
    async fn test_failed_frame_is_dropped_and_next_is_key() {
        let platform = MemoryPlatform::new(Faults {
            fail_frames: vec![0],
            ..Faults::default()
        });
        let mut session = ready(&platform);

        let first = session.submit(&frame(), ts(0)).await.unwrap();
        assert!(matches!(first, SubmitOutcome::Dropped(_)));
        let second = session.submit(&frame(), ts(1)).await.unwrap();
        assert_eq!(second, SubmitOutcome::Submitted { key_frame: true });

        session.flush().await.unwrap();
        assert!(session.finalize().is_ok());
        assert_eq!(session.stats().dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_frame_times_out() {
        let platform = MemoryPlatform::new(Faults {
            stall_frames: vec![1],
            ..Faults::default()
        });
        let mut session = ready(&platform);

        session.submit(&frame(), ts(0)).await.unwrap();
        let stalled = session.submit(&frame(), ts(1)).await.unwrap();
        assert!(matches!(stalled, SubmitOutcome::Dropped(_)));
        let after = session.submit(&frame(), ts(2)).await.unwrap();
        assert!(matches!(after, SubmitOutcome::Submitted { .. }));

        assert_eq!(session.stats().timed_out, 1);
        assert_eq!(session.state(), SessionState::Encoding);
    }

    #[tokio::test]
    async fn test_non_monotonic_timestamp_rejected() {
        let platform = MemoryPlatform::default();
        let mut session = ready(&platform);
        session.submit(&frame(), ts(2)).await.unwrap();
        let outcome = session.submit(&frame(), ts(2)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
        let outcome = session.submit(&frame(), ts(1)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
        assert_eq!(platform.log().submissions.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected() {
        let platform = MemoryPlatform::default();
        let mut session = ready(&platform);
        let outcome = session.submit(&PixelBuffer::new(4, 4), ts(0)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn test_buffered_encoder_drains_on_flush() {
        let platform = MemoryPlatform::new(Faults {
            buffered: true,
            ..Faults::default()
        });
        let mut session = ready(&platform);
        for i in 0..4 {
            session.submit(&frame(), ts(i)).await.unwrap();
        }
        assert_eq!(session.stats().chunks, 0);
        session.flush().await.unwrap();
        assert_eq!(session.stats().chunks, 4);
        assert_eq!(platform.log().muxed, (0..4).map(ts).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_flush_failure_fails_session() {
        let platform = MemoryPlatform::new(Faults {
            fail_flush: true,
            ..Faults::default()
        });
        let mut session = ready(&platform);
        session.submit(&frame(), ts(0)).await.unwrap();
        assert!(session.flush().await.is_err());
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(platform.log().encoders_closed, 1);
    }

    #[tokio::test]
    async fn test_finalize_without_frames_fails() {
        let platform = MemoryPlatform::default();
        let mut session = ready(&platform);
        session.flush().await.unwrap();
        assert!(matches!(session.finalize(), Err(EncodeError::Empty)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_finalize_requires_flush() {
        let platform = MemoryPlatform::default();
        let mut session = ready(&platform);
        session.submit(&frame(), ts(0)).await.unwrap();
        assert!(matches!(session.finalize(), Err(EncodeError::InvalidState(_))));
        assert_eq!(session.state(), SessionState::Encoding);
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let platform = MemoryPlatform::default();
        let mut session = ready(&platform);
        session.submit(&frame(), ts(0)).await.unwrap();

        session.abort();
        session.abort();
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(platform.log().encoders_closed, 1);
        assert!(session.submit(&frame(), ts(1)).await.is_err());

        drop(session);
        assert_eq!(platform.log().encoders_closed, 1);
    }

    #[tokio::test]
    async fn test_abort_after_finalize_keeps_state() {
        let platform = MemoryPlatform::default();
        let mut session = ready(&platform);
        session.submit(&frame(), ts(0)).await.unwrap();
        session.flush().await.unwrap();
        session.finalize().unwrap();
        session.abort();
        assert_eq!(session.state(), SessionState::Finalized);
    }
}
