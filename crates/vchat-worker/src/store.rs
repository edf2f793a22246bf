//! In-memory job store keyed by job id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use vchat_analysis::{events_by_type, events_in_range};
use vchat_models::{
    AnalysisJob, Event, EventType, FailureKind, JobFailure, JobId, JobState, Summary, VideoAsset,
};

use crate::error::{WorkerError, WorkerResult};

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    pub state: JobState,
    pub event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub updated_at: DateTime<Utc>,
}

/// Results of a finished job.
#[derive(Debug, Clone)]
pub struct JobResults {
    pub asset: VideoAsset,
    pub events: Arc<Vec<Event>>,
    pub summary: Arc<Summary>,
}

impl JobResults {
    pub fn events_of_type(&self, event_type: EventType) -> Vec<&Event> {
        events_by_type(&self.events, event_type)
    }

    /// Events whose interval intersects `[start, end]` seconds.
    pub fn events_between(&self, start: f64, end: f64) -> Vec<&Event> {
        events_in_range(&self.events, start, end)
    }
}

struct JobRecord {
    job: AnalysisJob,
    asset: VideoAsset,
    events: Arc<Vec<Event>>,
    summary: Option<Arc<Summary>>,
    cancel: watch::Sender<bool>,
    state_tx: watch::Sender<JobState>,
}

impl JobRecord {
    fn snapshot(&self) -> JobStatusSnapshot {
        JobStatusSnapshot {
            job_id: self.job.id.clone(),
            state: self.job.state,
            event_count: self.events.len(),
            failure: self.job.failure.clone(),
            updated_at: self.job.updated_at,
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.job.state);
    }
}

/// Explicitly synchronized table of analysis jobs.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending job and return its cancellation receiver.
    pub async fn insert(&self, job: AnalysisJob, asset: VideoAsset) -> watch::Receiver<bool> {
        let (cancel, cancel_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(job.state);
        let record = JobRecord {
            job,
            asset,
            events: Arc::new(Vec::new()),
            summary: None,
            cancel,
            state_tx,
        };
        self.jobs
            .write()
            .await
            .insert(record.job.id.clone(), record);
        cancel_rx
    }

    pub async fn contains(&self, job_id: &JobId) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    pub async fn status(&self, job_id: &JobId) -> WorkerResult<JobStatusSnapshot> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(JobRecord::snapshot)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))
    }

    pub async fn state(&self, job_id: &JobId) -> WorkerResult<JobState> {
        Ok(self.status(job_id).await?.state)
    }

    /// Move a job to the next pipeline stage.
    pub async fn advance(&self, job_id: &JobId, next: JobState) -> WorkerResult<()> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))?;
        record.job.advance(next)?;
        record.publish();
        Ok(())
    }

    /// Store results and mark the job done.
    pub async fn complete(
        &self,
        job_id: &JobId,
        events: Vec<Event>,
        summary: Summary,
    ) -> WorkerResult<()> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))?;
        record.job.advance(JobState::Done)?;
        record.events = Arc::new(events);
        record.summary = Some(Arc::new(summary));
        record.publish();
        Ok(())
    }

    /// Mark the job failed at its current stage.
    pub async fn fail(
        &self,
        job_id: &JobId,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> WorkerResult<()> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))?;
        record.job.fail(kind, message)?;
        record.publish();
        Ok(())
    }

    /// Signal cancellation. Returns `false` if the job already finished.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<bool> {
        let jobs = self.jobs.read().await;
        let record = jobs
            .get(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))?;
        if record.job.state.is_terminal() {
            return Ok(false);
        }
        record.cancel.send_replace(true);
        Ok(true)
    }

    /// Cancellation receiver of a job, also used to abort chat turns on cleanup.
    pub async fn cancel_receiver(&self, job_id: &JobId) -> WorkerResult<watch::Receiver<bool>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|r| r.cancel.subscribe())
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))
    }

    /// Receiver that observes every state change of a job.
    pub async fn subscribe(&self, job_id: &JobId) -> WorkerResult<watch::Receiver<JobState>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|r| r.state_tx.subscribe())
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))
    }

    /// Events and summary of a finished job.
    ///
    /// Fails with [`WorkerError::JobNotReady`] unless the job is done.
    pub async fn results(&self, job_id: &JobId) -> WorkerResult<JobResults> {
        let jobs = self.jobs.read().await;
        let record = jobs
            .get(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))?;

        match (&record.summary, record.job.state) {
            (Some(summary), JobState::Done) => Ok(JobResults {
                asset: record.asset.clone(),
                events: Arc::clone(&record.events),
                summary: Arc::clone(summary),
            }),
            (_, state) => Err(WorkerError::JobNotReady {
                job_id: job_id.clone(),
                state,
            }),
        }
    }

    /// Remove a job, cancelling it first if it is still running.
    pub async fn remove(&self, job_id: &JobId) -> WorkerResult<()> {
        let record = self
            .jobs
            .write()
            .await
            .remove(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))?;
        record.cancel.send_replace(true);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
