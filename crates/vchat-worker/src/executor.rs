//! Job executor.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use vchat_media::command::wait_for_cancel;
use vchat_media::{ingest, FrameSource};
use vchat_models::{AnalysisJob, FailureKind, JobId, VideoAsset};
use vchat_vlm_client::VisionModel;

use crate::agent::ChatAgent;
use crate::config::WorkerConfig;
use crate::conversations::ConversationStore;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::record_job;
use crate::pipeline::AnalysisPipeline;
use crate::store::{JobResults, JobStatusSnapshot, JobStore};

/// Runs analysis jobs in the background, at most
/// `max_concurrent_jobs` at a time.
pub struct JobExecutor {
    config: WorkerConfig,
    jobs: Arc<JobStore>,
    conversations: Arc<ConversationStore>,
    pipeline: Arc<AnalysisPipeline>,
    model: Arc<dyn VisionModel>,
    job_semaphore: Arc<Semaphore>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        model: Arc<dyn VisionModel>,
        frames: Arc<dyn FrameSource>,
    ) -> WorkerResult<Self> {
        let pipeline = AnalysisPipeline::new(&config, Arc::clone(&model), frames)?;
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));

        info!(
            "Job executor ready with {} max concurrent jobs",
            config.max_concurrent_jobs
        );

        Ok(Self {
            config,
            jobs: Arc::new(JobStore::new()),
            conversations: Arc::new(ConversationStore::new()),
            pipeline: Arc::new(pipeline),
            model,
            job_semaphore,
        })
    }

    /// Ingest a video file and submit it for analysis.
    pub async fn submit_file(&self, path: impl AsRef<Path>) -> WorkerResult<JobId> {
        let asset = ingest(path).await?;
        Ok(self.submit_asset(asset).await)
    }

    /// Submit an ingested video. The job starts once a slot is free.
    pub async fn submit_asset(&self, asset: VideoAsset) -> JobId {
        let job = AnalysisJob::new(asset.id.clone());
        let job_id = job.id.clone();
        let cancel = self.jobs.insert(job, asset.clone()).await;

        info!(
            job_id = %job_id,
            video_id = %asset.id,
            duration_secs = asset.duration_secs,
            "Job submitted"
        );

        tokio::spawn(run_job(
            job_id.clone(),
            asset,
            Arc::clone(&self.jobs),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.job_semaphore),
            cancel,
        ));

        job_id
    }

    /// Request cancellation. Returns `false` if the job already finished.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<bool> {
        let cancelled = self.jobs.cancel(job_id).await?;
        if cancelled {
            info!(job_id = %job_id, "Cancellation requested");
        }
        Ok(cancelled)
    }

    /// Wait until the job is done or failed.
    pub async fn wait(&self, job_id: &JobId) -> WorkerResult<JobStatusSnapshot> {
        let mut state_rx = self.jobs.subscribe(job_id).await?;
        loop {
            if state_rx.borrow_and_update().is_terminal() {
                break;
            }
            if state_rx.changed().await.is_err() {
                break;
            }
        }
        self.jobs.status(job_id).await
    }

    pub async fn status(&self, job_id: &JobId) -> WorkerResult<JobStatusSnapshot> {
        self.jobs.status(job_id).await
    }

    pub async fn results(&self, job_id: &JobId) -> WorkerResult<JobResults> {
        self.jobs.results(job_id).await
    }

    /// Remove a job and every conversation bound to it.
    ///
    /// A running job is cancelled; in-flight chat turns observe the same
    /// cancellation signal.
    pub async fn cleanup(&self, job_id: &JobId) -> WorkerResult<()> {
        self.jobs.remove(job_id).await?;
        let conversations = self.conversations.remove_for_job(job_id).await;
        info!(job_id = %job_id, conversations, "Job cleaned up");
        Ok(())
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Agent answering questions about this executor's finished jobs.
    pub fn chat_agent(&self) -> ChatAgent {
        ChatAgent::new(
            Arc::clone(&self.jobs),
            Arc::clone(&self.conversations),
            Arc::clone(&self.model),
            self.config.chat.clone(),
        )
    }
}

fn outcome_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Ingestion => "ingestion_error",
        FailureKind::VlmUnavailable => "vlm_unavailable",
        FailureKind::Cancelled => "cancelled",
        FailureKind::Internal => "internal_error",
    }
}

async fn run_job(
    job_id: JobId,
    asset: VideoAsset,
    jobs: Arc<JobStore>,
    pipeline: Arc<AnalysisPipeline>,
    job_semaphore: Arc<Semaphore>,
    cancel: watch::Receiver<bool>,
) {
    let mut admission_cancel = cancel.clone();
    let _permit = tokio::select! {
        permit = job_semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                finish_failed(&jobs, &job_id, WorkerError::config_error("job semaphore closed")).await;
                return;
            }
        },
        _ = wait_for_cancel(&mut admission_cancel) => {
            finish_failed(&jobs, &job_id, WorkerError::Cancelled).await;
            return;
        }
    };

    debug!(job_id = %job_id, "Job admitted");

    let result = pipeline.run(&job_id, &asset, &jobs, &cancel).await;
    let cancelled = *cancel.borrow();
    match result {
        Ok(_) if cancelled => {
            finish_failed(&jobs, &job_id, WorkerError::Cancelled).await;
        }
        Ok(outcome) => {
            let event_count = outcome.events.len();
            match jobs.complete(&job_id, outcome.events, outcome.summary).await {
                Ok(()) => {
                    record_job("done");
                    info!(job_id = %job_id, event_count, "Job done");
                }
                Err(e) => warn!(job_id = %job_id, error = %e, "Could not record job results"),
            }
        }
        Err(e) => finish_failed(&jobs, &job_id, e).await,
    }
}

async fn finish_failed(jobs: &JobStore, job_id: &JobId, err: WorkerError) {
    let kind = err.failure_kind();
    if kind == FailureKind::Cancelled {
        info!(job_id = %job_id, "Job cancelled");
    } else {
        error!(job_id = %job_id, error = %err, "Job failed");
    }

    match jobs.fail(job_id, kind, err.user_message()).await {
        Ok(()) => record_job(outcome_label(kind)),
        // Removed by cleanup while running
        Err(WorkerError::JobNotFound(_)) => {
            debug!(job_id = %job_id, "Job removed before failure was recorded")
        }
        Err(e) => warn!(job_id = %job_id, error = %e, "Could not record job failure"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vchat_media::IngestionResult;
    use vchat_models::{FrameImage, FrameSlot, JobState, VideoFormat};
    use vchat_vlm_client::{VlmRequest, VlmResult};

    struct BlankFrames;

    #[async_trait]
    impl FrameSource for BlankFrames {
        async fn grab(
            &self,
            _asset: &VideoAsset,
            _slot: FrameSlot,
            _cancel: &watch::Receiver<bool>,
        ) -> IngestionResult<FrameImage> {
            Ok(FrameImage::jpeg(vec![0xFF, 0xD8]))
        }
    }

    struct NothingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionModel for NothingModel {
        async fn query(
            &self,
            _request: &VlmRequest,
            _cancel: &watch::Receiver<bool>,
        ) -> VlmResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("NONE".to_string())
        }
    }

    #[tokio::test]
    async fn test_job_with_no_events_completes() {
        let model = Arc::new(NothingModel {
            calls: AtomicUsize::new(0),
        });
        let executor =
            JobExecutor::new(WorkerConfig::default(), model.clone(), Arc::new(BlankFrames))
                .unwrap();
        let asset = VideoAsset::new("/tmp/empty.mp4", 3.0, 25.0, VideoFormat::Mp4);

        let job_id = executor.submit_asset(asset).await;
        let status = executor.wait(&job_id).await.unwrap();

        assert_eq!(status.state, JobState::Done);
        assert_eq!(status.event_count, 0);
        // Three frames, no narrative call for an empty event set
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        let results = executor.results(&job_id).await.unwrap();
        assert_eq!(results.summary.narrative, vchat_analysis::EMPTY_NARRATIVE);
    }

    #[tokio::test]
    async fn test_cleanup_removes_job() {
        let model = Arc::new(NothingModel {
            calls: AtomicUsize::new(0),
        });
        let executor =
            JobExecutor::new(WorkerConfig::default(), model, Arc::new(BlankFrames)).unwrap();
        let asset = VideoAsset::new("/tmp/empty.mp4", 1.0, 25.0, VideoFormat::Mp4);
        let job_id = executor.submit_asset(asset).await;
        executor.wait(&job_id).await.unwrap();

        executor.cleanup(&job_id).await.unwrap();
        assert!(matches!(
            executor.status(&job_id).await,
            Err(WorkerError::JobNotFound(_))
        ));
    }
}
