//! Error types for encoding and muxing.

use thiserror::Error;

/// Errors raised by the encoder session, its encoder and its container.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// No usable encoder exists in this runtime. Not retryable.
    #[error("Encoder unavailable: {0}")]
    Unavailable(String),

    /// The encoder refused a configuration.
    #[error("Encoder configuration rejected: {0}")]
    ConfigRejected(String),

    /// A single frame failed to encode.
    #[error("Frame encode failed: {0}")]
    Frame(String),

    /// A single frame did not finish encoding in time.
    #[error("Frame encode timed out after {0} ms")]
    Timeout(u64),

    /// Draining the encoder failed or timed out.
    #[error("Encoder flush failed: {0}")]
    Flush(String),

    /// The container rejected a chunk or could not be sealed.
    #[error("Container error: {0}")]
    Container(String),

    /// Finalize was reached without a single encoded chunk.
    #[error("No frames were encoded")]
    Empty,

    /// An operation was called in a state that does not allow it.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// IO error talking to an encoder process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for encode operations.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
