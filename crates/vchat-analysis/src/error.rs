//! Analysis error types.

use thiserror::Error;
use vchat_vlm_client::VlmError;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Model text for one frame could not be turned into events.
///
/// Recovered locally: the frame contributes no events.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Model output for frame {frame_index} is empty")]
    Empty { frame_index: u32 },

    #[error("No events recognized in model output for frame {frame_index} ({chars} chars)")]
    Unrecognized { frame_index: u32, chars: usize },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Event sequence invalid: {0}")]
    InvalidSequence(String),

    #[error(transparent)]
    Vlm(#[from] VlmError),
}

impl AnalysisError {
    pub fn invalid_sequence(msg: impl Into<String>) -> Self {
        Self::InvalidSequence(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Vlm(e) if e.is_cancelled())
    }
}
