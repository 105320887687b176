//! In-memory codec platform with fault injection.
//!
//! Produces fake Annex-B chunks (one per submitted frame) and a container that
//! is just a header followed by the chunk payloads. Every call is recorded in
//! a shared [`PlatformLog`] so tests can assert on what reached the encoder.

use crate::chunk::{ChunkMetadata, ChunkSender, EncodedChunk};
use crate::encoder::{CodecPlatform, EncoderConfig, VideoEncoder};
use crate::error::{EncodeError, EncodeResult};
use crate::writer::ContainerMuxer;
use parking_lot::Mutex;
use std::sync::Arc;
use vcrop_core::{OutputProfile, PixelBuffer, Timestamp};

/// Bytes at the start of every finished in-memory container.
pub const MEMORY_CONTAINER_HEADER: &[u8] = b"VCROPMEM";

/// Failures to inject.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Report that no encoder exists.
    pub unavailable: bool,
    /// Reject this many `configure` calls before accepting one.
    pub reject_configs: usize,
    /// Submission indices whose encode returns an error.
    pub fail_frames: Vec<u64>,
    /// Submission indices whose encode never completes.
    pub stall_frames: Vec<u64>,
    /// Hold every chunk until `flush`.
    pub buffered: bool,
    pub fail_flush: bool,
    pub fail_finish: bool,
}

/// Everything the platform has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct PlatformLog {
    /// Every configuration offered, accepted or not.
    pub configs: Vec<EncoderConfig>,
    pub rejected_configs: usize,
    /// Every `encode` call as (timestamp, key frame), including failed ones.
    pub submissions: Vec<(Timestamp, bool)>,
    pub encoders_created: usize,
    pub encoders_closed: usize,
    pub muxers_created: usize,
    pub muxers_finished: usize,
    /// Timestamps of chunks written into a container.
    pub muxed: Vec<Timestamp>,
}

/// A [`CodecPlatform`] that never leaves memory.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    faults: Faults,
    log: Arc<Mutex<PlatformLog>>,
}

impl MemoryPlatform {
    pub fn new(faults: Faults) -> Self {
        Self {
            faults,
            log: Arc::default(),
        }
    }

    /// Snapshot of the call log.
    pub fn log(&self) -> PlatformLog {
        self.log.lock().clone()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

impl CodecPlatform for MemoryPlatform {
    type Encoder = MemoryEncoder;
    type Muxer = MemoryMuxer;

    fn encoder_available(&self) -> bool {
        !self.faults.unavailable
    }

    fn create_encoder(&self) -> MemoryEncoder {
        self.log.lock().encoders_created += 1;
        MemoryEncoder {
            faults: self.faults.clone(),
            log: Arc::clone(&self.log),
            output: None,
            held: Vec::new(),
            index: 0,
            closed: false,
        }
    }

    fn create_muxer(&self, _profile: &OutputProfile) -> EncodeResult<MemoryMuxer> {
        self.log.lock().muxers_created += 1;
        Ok(MemoryMuxer {
            log: Arc::clone(&self.log),
            data: MEMORY_CONTAINER_HEADER.to_vec(),
            fail_finish: self.faults.fail_finish,
        })
    }
}

pub struct MemoryEncoder {
    faults: Faults,
    log: Arc<Mutex<PlatformLog>>,
    output: Option<ChunkSender>,
    held: Vec<EncodedChunk>,
    index: u64,
    closed: bool,
}

impl MemoryEncoder {
    fn emit(&mut self, chunk: EncodedChunk) -> EncodeResult<()> {
        if self.faults.buffered {
            self.held.push(chunk);
            return Ok(());
        }
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| EncodeError::InvalidState("encoder not configured".into()))?;
        output
            .send(chunk)
            .map_err(|_| EncodeError::Frame("chunk receiver dropped".into()))
    }
}

impl VideoEncoder for MemoryEncoder {
    fn configure(&mut self, config: &EncoderConfig, output: ChunkSender) -> EncodeResult<()> {
        let mut log = self.log.lock();
        log.configs.push(config.clone());
        if self.faults.unavailable {
            return Err(EncodeError::Unavailable("memory platform has no encoder".into()));
        }
        if log.rejected_configs < self.faults.reject_configs {
            log.rejected_configs += 1;
            return Err(EncodeError::ConfigRejected(format!(
                "injected rejection of {} bps",
                config.bitrate_bps
            )));
        }
        self.output = Some(output);
        Ok(())
    }

    async fn encode(&mut self, frame: &PixelBuffer, timestamp: Timestamp, key_frame: bool) -> EncodeResult<()> {
        if self.output.is_none() {
            return Err(EncodeError::InvalidState("encoder not configured".into()));
        }
        let index = self.index;
        self.index += 1;
        self.log.lock().submissions.push((timestamp, key_frame));

        if self.faults.stall_frames.contains(&index) {
            std::future::pending::<()>().await;
        }
        if self.faults.fail_frames.contains(&index) {
            return Err(EncodeError::Frame(format!("injected failure at frame {index}")));
        }

        let nal = if key_frame { 0x65 } else { 0x41 };
        let mut data = vec![0, 0, 0, 1, nal];
        data.extend_from_slice(&frame.as_bytes()[..frame.as_bytes().len().min(4)]);
        self.emit(EncodedChunk {
            data,
            timestamp,
            key_frame,
            metadata: ChunkMetadata {
                decoder_config: key_frame.then(|| vec![0x67, 0x42, 0x00, 0x1f]),
            },
        })
    }

    async fn flush(&mut self) -> EncodeResult<()> {
        if self.faults.fail_flush {
            return Err(EncodeError::Flush("injected flush failure".into()));
        }
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| EncodeError::InvalidState("encoder not configured".into()))?;
        for chunk in self.held.drain(..) {
            output
                .send(chunk)
                .map_err(|_| EncodeError::Flush("chunk receiver dropped".into()))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.output = None;
            self.held.clear();
            self.log.lock().encoders_closed += 1;
        }
    }
}

pub struct MemoryMuxer {
    log: Arc<Mutex<PlatformLog>>,
    data: Vec<u8>,
    fail_finish: bool,
}

impl ContainerMuxer for MemoryMuxer {
    fn write_chunk(&mut self, chunk: &EncodedChunk) -> EncodeResult<()> {
        self.data.extend_from_slice(&chunk.data);
        self.log.lock().muxed.push(chunk.timestamp);
        Ok(())
    }

    fn finish(self) -> EncodeResult<Vec<u8>> {
        if self.fail_finish {
            return Err(EncodeError::Container("injected finish failure".into()));
        }
        self.log.lock().muxers_finished += 1;
        Ok(self.data)
    }
}
