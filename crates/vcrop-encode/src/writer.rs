//! Container writer: pass-through from encoded chunks to a sealed container.

use crate::chunk::EncodedChunk;
use crate::error::{EncodeError, EncodeResult};
use tracing::debug;
use vcrop_core::Timestamp;

/// A container primitive supplied by the platform.
pub trait ContainerMuxer {
    /// Append one encoded chunk.
    fn write_chunk(&mut self, chunk: &EncodedChunk) -> EncodeResult<()>;

    /// Seal the container (size/offset fix-ups) and return its bytes.
    fn finish(self) -> EncodeResult<Vec<u8>>;
}

/// Feeds chunks to a [`ContainerMuxer`] in the order they were emitted.
pub struct ContainerWriter<M: ContainerMuxer> {
    muxer: M,
    chunks: u64,
    key_frames: u64,
    bytes: u64,
    last_timestamp: Option<Timestamp>,
}

impl<M: ContainerMuxer> ContainerWriter<M> {
    pub fn new(muxer: M) -> Self {
        Self {
            muxer,
            chunks: 0,
            key_frames: 0,
            bytes: 0,
            last_timestamp: None,
        }
    }

    /// Write one chunk. Chunks must arrive in presentation order.
    pub fn write(&mut self, chunk: &EncodedChunk) -> EncodeResult<()> {
        if let Some(last) = self.last_timestamp {
            if chunk.timestamp <= last {
                return Err(EncodeError::Container(format!(
                    "chunk at {} does not follow {}",
                    chunk.timestamp, last
                )));
            }
        }
        if self.chunks == 0 && !chunk.key_frame {
            return Err(EncodeError::Container("first chunk is not a key frame".into()));
        }

        self.muxer.write_chunk(chunk)?;
        self.chunks += 1;
        self.bytes += chunk.data.len() as u64;
        if chunk.key_frame {
            self.key_frames += 1;
        }
        self.last_timestamp = Some(chunk.timestamp);
        Ok(())
    }

    /// Chunks written so far.
    pub fn chunk_count(&self) -> u64 {
        self.chunks
    }

    pub fn key_frame_count(&self) -> u64 {
        self.key_frames
    }

    /// Encoded payload bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Seal the container and return the finished file.
    pub fn finalize(self) -> EncodeResult<Vec<u8>> {
        if self.chunks == 0 {
            return Err(EncodeError::Empty);
        }
        let bytes = self.muxer.finish()?;
        debug!(chunks = self.chunks, size = bytes.len(), "Container sealed");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMetadata;

    #[derive(Default)]
    struct Collect(Vec<u8>);

    impl ContainerMuxer for Collect {
        fn write_chunk(&mut self, chunk: &EncodedChunk) -> EncodeResult<()> {
            self.0.extend_from_slice(&chunk.data);
            Ok(())
        }

        fn finish(self) -> EncodeResult<Vec<u8>> {
            Ok(self.0)
        }
    }

    fn chunk(micros: i64, key: bool, data: &[u8]) -> EncodedChunk {
        EncodedChunk {
            data: data.to_vec(),
            timestamp: Timestamp::from_micros(micros),
            key_frame: key,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn test_pass_through_in_order() {
        let mut writer = ContainerWriter::new(Collect::default());
        writer.write(&chunk(0, true, b"ab")).unwrap();
        writer.write(&chunk(33_333, false, b"c")).unwrap();
        assert_eq!(writer.chunk_count(), 2);
        assert_eq!(writer.key_frame_count(), 1);
        assert_eq!(writer.bytes_written(), 3);
        assert_eq!(writer.finalize().unwrap(), b"abc");
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut writer = ContainerWriter::new(Collect::default());
        writer.write(&chunk(10, true, b"a")).unwrap();
        assert!(writer.write(&chunk(10, false, b"b")).is_err());
        assert_eq!(writer.chunk_count(), 1);
    }

    #[test]
    fn test_first_chunk_must_be_key() {
        let mut writer = ContainerWriter::new(Collect::default());
        assert!(writer.write(&chunk(0, false, b"a")).is_err());
    }

    #[test]
    fn test_empty_finalize_fails() {
        let writer = ContainerWriter::new(Collect::default());
        assert!(matches!(writer.finalize(), Err(EncodeError::Empty)));
    }
}
