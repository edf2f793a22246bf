//! Analysis job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::VideoId;

/// Unique identifier for an analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
///
/// `Pending → Sampling → Querying → Extracting → Summarizing → Done`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Sampling,
    Querying,
    Extracting,
    Summarizing,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Sampling => "sampling",
            JobState::Querying => "querying",
            JobState::Extracting => "extracting",
            JobState::Summarizing => "summarizing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Sampling)
            | (Sampling, Querying)
            | (Querying, Extracting)
            | (Extracting, Summarizing)
            | (Summarizing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Illegal job state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition from {from} to {to}")]
pub struct JobStateError {
    pub from: JobState,
    pub to: JobState,
}

/// Class of failure that ended a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unsupported, unreadable or oversized video
    Ingestion,
    /// Model endpoint unreachable after retries
    VlmUnavailable,
    /// Job was cancelled
    Cancelled,
    /// Anything else
    Internal,
}

/// Failure detail recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    /// State the job was in when it failed
    pub stage: JobState,
    pub kind: FailureKind,
    /// User-facing description of the cause
    pub message: String,
}

impl JobFailure {
    pub fn new(stage: JobState, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} failure during {}: {}", self.kind, self.stage, self.message)
    }
}

/// An analysis job for one video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisJob {
    /// Unique job ID
    pub id: JobId,
    /// Video being analyzed
    pub video_id: VideoId,
    /// Current state
    pub state: JobState,
    /// Failure detail, set when `state == Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(video_id: VideoId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            video_id,
            state: JobState::Pending,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to the next state, rejecting illegal transitions.
    pub fn advance(&mut self, next: JobState) -> Result<(), JobStateError> {
        if next == JobState::Failed || !self.state.can_transition_to(next) {
            return Err(JobStateError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the job as failed. The failure's stage is the current state.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<(), JobStateError> {
        if !self.state.can_transition_to(JobState::Failed) {
            return Err(JobStateError {
                from: self.state,
                to: JobState::Failed,
            });
        }
        self.failure = Some(JobFailure::new(self.state, kind, message));
        self.state = JobState::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }
}
