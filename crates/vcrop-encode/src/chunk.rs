//! Encoded chunks and the channel that carries them from encoder to container.

use crossbeam_channel::{Receiver, Sender};
use vcrop_core::Timestamp;

/// One encoded access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Annex-B H.264 bytes.
    pub data: Vec<u8>,
    /// Presentation time assigned at submission.
    pub timestamp: Timestamp,
    /// Independently decodable.
    pub key_frame: bool,
    /// Encoder-supplied metadata.
    pub metadata: ChunkMetadata,
}

/// Metadata the encoder attaches to a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Decoder configuration record, present on chunks that change it.
    pub decoder_config: Option<Vec<u8>>,
}

/// Encoder side of the chunk channel.
pub type ChunkSender = Sender<EncodedChunk>;

/// Session side of the chunk channel.
pub type ChunkReceiver = Receiver<EncodedChunk>;

/// Create the in-order chunk channel for one session.
pub fn chunk_channel() -> (ChunkSender, ChunkReceiver) {
    crossbeam_channel::unbounded()
}
