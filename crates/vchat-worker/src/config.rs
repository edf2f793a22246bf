//! Worker configuration.

use std::time::Duration;

use vchat_analysis::{MergeConfig, SummarizerConfig};
use vchat_media::SamplerConfig;
use vchat_vlm_client::VlmClientConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent analysis jobs
    pub max_concurrent_jobs: usize,
    /// Frame queries a single job keeps in flight
    pub max_frame_parallel: usize,
    /// Per-frame FFmpeg timeout
    pub frame_timeout: Duration,
    /// Frame sampling
    pub sampler: SamplerConfig,
    /// Event merging
    pub merge: MergeConfig,
    /// Summary aggregation
    pub summarizer: SummarizerConfig,
    /// Conversation context
    pub chat: ChatConfig,
    /// Model endpoint
    pub vlm: VlmClientConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let sampler = SamplerConfig::default();
        Self {
            max_concurrent_jobs: 2,
            max_frame_parallel: 4,
            frame_timeout: Duration::from_secs(30),
            merge: MergeConfig::for_interval(sampler.interval()),
            sampler,
            summarizer: SummarizerConfig::default(),
            chat: ChatConfig::default(),
            vlm: VlmClientConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let sampler = SamplerConfig::from_env();
        let vlm = VlmClientConfig::from_env();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(2),
            max_frame_parallel: vlm.max_in_flight,
            frame_timeout: Duration::from_secs(
                std::env::var("FFMPEG_FRAME_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            merge: MergeConfig::from_env(sampler.interval()),
            sampler,
            summarizer: SummarizerConfig::from_env(),
            chat: ChatConfig::from_env(),
            vlm,
        }
    }
}

/// Conversation configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Token budget of each conversation context
    pub context_budget: usize,
    /// Maximum grounding events per turn
    pub grounding_events: usize,
    /// Minimum relevance score for a grounding event
    pub relevance_floor: f64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_budget: 4000,
            grounding_events: 5,
            relevance_floor: 0.1,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self {
            context_budget: std::env::var("CONTEXT_BUDGET_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4000),
            grounding_events: std::env::var("GROUNDING_EVENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            relevance_floor: std::env::var("RELEVANCE_FLOOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
        }
    }
}
