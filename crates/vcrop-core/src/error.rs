//! Error types for vcrop.

use thiserror::Error;

/// Main error type for vcrop core operations.
#[derive(Error, Debug)]
pub enum VcropError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for vcrop core operations.
pub type Result<T> = std::result::Result<T, VcropError>;
