//! Worker error types.

use thiserror::Error;

use vchat_analysis::AnalysisError;
use vchat_media::IngestionError;
use vchat_models::{ConversationId, FailureKind, JobId, JobState, JobStateError};
use vchat_vlm_client::VlmError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Job {job_id} is not ready (state: {state})")]
    JobNotReady { job_id: JobId, state: JobState },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("VLM error: {0}")]
    Vlm(#[from] VlmError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Invalid job transition: {0}")]
    Transition(#[from] JobStateError),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Ingestion(e) => e.is_cancelled(),
            WorkerError::Vlm(e) => e.is_cancelled(),
            WorkerError::Analysis(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Vlm(e) => e.is_unavailable() || e.is_retryable(),
            WorkerError::JobNotReady { state, .. } => !state.is_terminal(),
            _ => false,
        }
    }

    /// Failure class recorded on a job that ends with this error.
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_cancelled() {
            return FailureKind::Cancelled;
        }
        match self {
            WorkerError::Ingestion(_) => FailureKind::Ingestion,
            WorkerError::Vlm(_) | WorkerError::Analysis(AnalysisError::Vlm(_)) => {
                FailureKind::VlmUnavailable
            }
            _ => FailureKind::Internal,
        }
    }

    /// Message safe to show an end user.
    ///
    /// Names the job and the failure class without echoing prompts or
    /// model output.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::JobNotFound(id) => format!("Analysis job {} does not exist.", id),
            WorkerError::ConversationNotFound(id) => {
                format!("Conversation {} does not exist.", id)
            }
            WorkerError::JobNotReady { job_id, state } => format!(
                "Analysis job {} is {}; chat is available once it is done.",
                job_id, state
            ),
            WorkerError::Cancelled => "The analysis was cancelled.".to_string(),
            WorkerError::Ingestion(e) => match e {
                IngestionError::TooLong { .. }
                | IngestionError::UnsupportedFormat(_)
                | IngestionError::FileNotFound(_) => format!("The video was rejected: {}", e),
                IngestionError::Cancelled => "The analysis was cancelled.".to_string(),
                _ => "The video could not be read.".to_string(),
            },
            WorkerError::Vlm(e) if e.is_cancelled() => "The request was cancelled.".to_string(),
            WorkerError::Vlm(_) => {
                "The vision model is temporarily unavailable. Please try again.".to_string()
            }
            WorkerError::Analysis(_) | WorkerError::Transition(_) | WorkerError::ConfigError(_) => {
                "An internal error occurred while analyzing the video.".to_string()
            }
        }
    }
}
