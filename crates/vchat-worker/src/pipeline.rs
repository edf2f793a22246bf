//! Analysis pipeline for one job: sample, query, extract, summarize.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

use vchat_analysis::prompts::frame_prompt;
use vchat_analysis::{
    merge_events, validate_event_sequence, EventExtractor, MergeConfig, Summarizer,
};
use vchat_media::{FrameSampler, FrameSource, IngestionError, IngestionResult, SamplerConfig};
use vchat_models::{Event, Frame, FrameSlot, JobId, JobState, Summary, VideoAsset};
use vchat_vlm_client::{ModelParams, VisionModel, VlmError, VlmRequest};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::store::JobStore;

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub events: Vec<Event>,
    pub summary: Summary,
}

/// What one sampled frame contributed.
enum FrameReply {
    Answered(FrameSlot, String),
    /// The frame was dropped; the cause fails the job if no frame answers.
    Skipped(WorkerError),
}

/// Shared, stateless pipeline used by every job.
pub struct AnalysisPipeline {
    model: Arc<dyn VisionModel>,
    frames: Arc<dyn FrameSource>,
    extractor: EventExtractor,
    summarizer: Summarizer,
    sampler: SamplerConfig,
    merge: MergeConfig,
    max_frame_parallel: usize,
}

impl AnalysisPipeline {
    pub fn new(
        config: &WorkerConfig,
        model: Arc<dyn VisionModel>,
        frames: Arc<dyn FrameSource>,
    ) -> WorkerResult<Self> {
        config
            .merge
            .validate()
            .map_err(|e| WorkerError::config_error(e.to_string()))?;

        Ok(Self {
            summarizer: Summarizer::new(Arc::clone(&model), config.summarizer.clone()),
            model,
            frames,
            extractor: EventExtractor::default(),
            sampler: config.sampler.clone(),
            merge: config.merge.clone(),
            max_frame_parallel: config.max_frame_parallel.max(1),
        })
    }

    /// Run every stage for `job_id`, advancing its state in `store`.
    ///
    /// The caller records the failure when an error is returned.
    pub async fn run(
        &self,
        job_id: &JobId,
        asset: &VideoAsset,
        store: &JobStore,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<AnalysisOutcome> {
        let mut logger = JobLogger::new(job_id);
        let span = logger.create_span();

        async move {
            store.advance(job_id, JobState::Sampling).await?;
            logger.enter(JobState::Sampling);
            let sampler = FrameSampler::new(asset.clone(), self.sampler.clone())?;
            logger.log_progress(&format!(
                "{} frames planned over {:.1}s",
                sampler.frame_count(),
                asset.duration_secs
            ));

            store.advance(job_id, JobState::Querying).await?;
            logger.enter(JobState::Querying);
            let replies = self.query_frames(&sampler, &logger, cancel).await?;

            store.advance(job_id, JobState::Extracting).await?;
            logger.enter(JobState::Extracting);
            let candidates: Vec<Event> = replies
                .iter()
                .flat_map(|(slot, text)| self.extractor.extract_lossy(*slot, text))
                .collect();
            let events = merge_events(candidates, &self.merge);
            validate_event_sequence(&events, self.merge.max_overlap)?;
            logger.log_progress(&format!(
                "{} events from {} frame replies",
                events.len(),
                replies.len()
            ));

            store.advance(job_id, JobState::Summarizing).await?;
            logger.enter(JobState::Summarizing);
            let summary = self
                .summarizer
                .summarize(&events, asset.duration_secs, cancel)
                .await?;

            logger.log_completion(&format!("{} events", events.len()));
            Ok::<_, WorkerError>(AnalysisOutcome { events, summary })
        }
        .instrument(span)
        .await
    }

    /// Query the model for every sampled frame, up to
    /// `max_frame_parallel` at a time.
    ///
    /// Replies come back in completion order; the merge step restores
    /// chronological order.
    async fn query_frames(
        &self,
        sampler: &FrameSampler,
        logger: &JobLogger,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<Vec<(FrameSlot, String)>> {
        let mut replies = Vec::with_capacity(sampler.frame_count());
        let mut skipped = 0usize;
        let mut failure: Option<WorkerError> = None;

        let mut stream = std::pin::pin!(sampler
            .frames(self.frames.as_ref(), cancel)
            .map(|frame| self.query_frame(frame, logger, cancel))
            .buffer_unordered(self.max_frame_parallel));

        while let Some(reply) = stream.next().await {
            match reply {
                Ok(FrameReply::Answered(slot, text)) => replies.push((slot, text)),
                Ok(FrameReply::Skipped(cause)) => {
                    skipped += 1;
                    // A model rejection explains an empty run better than a bad frame
                    let replace = match (&failure, &cause) {
                        (None, _) => true,
                        (Some(WorkerError::Vlm(_)), _) => false,
                        (Some(_), WorkerError::Vlm(_)) => true,
                        _ => false,
                    };
                    if replace {
                        failure = Some(cause);
                    }
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        logger.log_error(&format!("frame queries aborted: {}", e));
                    }
                    return Err(e);
                }
            }
        }

        // No frame produced a reply: the job has nothing to analyze
        if replies.is_empty() {
            if let Some(cause) = failure {
                logger.log_error(&format!("all {} frames failed: {}", skipped, cause));
                return Err(cause);
            }
        }
        if skipped > 0 {
            logger.log_warning(&format!("{} frames contributed no reply", skipped));
        }

        Ok(replies)
    }

    async fn query_frame(
        &self,
        frame: IngestionResult<Frame>,
        logger: &JobLogger,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<FrameReply> {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e @ (IngestionError::FrameExtraction { .. } | IngestionError::Timeout(_))) => {
                logger.log_warning(&format!("skipping frame: {}", e));
                return Ok(FrameReply::Skipped(e.into()));
            }
            Err(e) => return Err(e.into()),
        };

        let request = VlmRequest::new(frame_prompt(frame.timestamp()), ModelParams::frame_analysis())
            .with_image(&frame.image);
        let slot = frame.slot;
        // Image bytes are not needed past this point
        drop(frame);

        match self.model.query(&request, cancel).await {
            Ok(text) => Ok(FrameReply::Answered(slot, text)),
            Err(e @ (VlmError::Unavailable { .. } | VlmError::Cancelled)) => Err(e.into()),
            Err(e) => {
                logger.log_warning(&format!("frame {} query rejected: {}", slot.index, e));
                Ok(FrameReply::Skipped(e.into()))
            }
        }
    }
}
