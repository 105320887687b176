//! Error types for the pipeline controller.

use crate::controller::PipelinePhase;
use thiserror::Error;
use vcrop_core::VcropError;
use vcrop_encode::EncodeError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot {action} while {phase:?}")]
    InvalidTransition {
        action: &'static str,
        phase: PipelinePhase,
    },

    #[error("Recording cancelled")]
    Cancelled,

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Config error: {0}")]
    Config(#[from] VcropError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
