//! Structured logging for analysis jobs and subscriber setup.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vchat_models::{JobId, JobState};

const DEFAULT_DIRECTIVES: [&str; 5] = [
    "vchat=info",
    "vchat_worker=info",
    "vchat_analysis=info",
    "vchat_media=info",
    "vchat_vlm_client=info",
];

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` (default: every `vchat` crate at `info`) and switches to JSON
/// output when `LOG_FORMAT=json`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(DEFAULT_DIRECTIVES.join(","))
    });

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Logs job lifecycle events with the job id and current stage attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: JobState,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: JobState::Pending,
        }
    }

    /// Record a stage transition.
    pub fn enter(&mut self, stage: JobState) {
        self.stage = stage;
        info!(job_id = %self.job_id, stage = %self.stage, "Job stage started");
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, stage = %self.stage, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stage(&self) -> JobState {
        self.stage
    }

    /// Span carrying the job id, for instrumenting a whole job run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_tracks_stage() {
        let job_id = JobId::from_string("job-42");
        let mut logger = JobLogger::new(&job_id);
        assert_eq!(logger.job_id(), "job-42");
        assert_eq!(logger.stage(), JobState::Pending);

        logger.enter(JobState::Querying);
        assert_eq!(logger.stage(), JobState::Querying);
    }
}
