//! MP4 container backed by `muxide`, written entirely in memory.

use crate::chunk::EncodedChunk;
use crate::error::{EncodeError, EncodeResult};
use crate::writer::ContainerMuxer;
use muxide::api::{Muxer, MuxerBuilder, VideoCodec};
use parking_lot::Mutex;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::debug;
use vcrop_core::OutputProfile;

/// In-memory file the muxer writes into; a second handle reads it back.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedSink {
    pub fn len(&self) -> usize {
        self.0.lock().get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the written bytes, leaving the sink empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(self.0.lock().get_mut())
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().seek(pos)
    }
}

/// Single H.264 video track MP4.
pub struct Mp4Muxer {
    muxer: Muxer<SharedSink>,
    sink: SharedSink,
    frames: u64,
}

impl Mp4Muxer {
    pub fn new(profile: &OutputProfile) -> EncodeResult<Self> {
        let sink = SharedSink::default();
        let muxer = MuxerBuilder::new(sink.clone())
            .video(
                VideoCodec::H264,
                profile.width,
                profile.height,
                profile.frame_rate.to_fps_f64(),
            )
            .build()
            .map_err(|e| EncodeError::Container(format!("failed to create MP4 muxer: {e}")))?;
        Ok(Self { muxer, sink, frames: 0 })
    }
}

impl ContainerMuxer for Mp4Muxer {
    fn write_chunk(&mut self, chunk: &EncodedChunk) -> EncodeResult<()> {
        self.muxer
            .write_video(chunk.timestamp.as_seconds_f64(), &chunk.data, chunk.key_frame)
            .map_err(|e| EncodeError::Container(format!("frame {} rejected: {e}", self.frames)))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(self) -> EncodeResult<Vec<u8>> {
        let Self { muxer, sink, frames } = self;
        muxer
            .finish_with_stats()
            .map_err(|e| EncodeError::Container(format!("failed to finalize MP4: {e}")))?;
        let bytes = sink.take();
        debug!(frames, size = bytes.len(), "MP4 finalized");
        Ok(bytes)
    }
}
