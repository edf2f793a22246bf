//! Analysis job execution and conversational agent.
//!
//! This crate provides:
//! - Job store and executor for analysis jobs
//! - The sample → query → extract → summarize pipeline
//! - Budgeted conversation contexts and grounding-event selection
//! - The chat agent answering questions about finished jobs

pub mod agent;
pub mod config;
pub mod context;
pub mod conversations;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod relevance;
pub mod store;

pub use agent::ChatAgent;
pub use config::{ChatConfig, WorkerConfig};
pub use context::{AddTurnReport, ConversationContext};
pub use conversations::{ConversationHandle, ConversationStore};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::{init_tracing, JobLogger};
pub use pipeline::{AnalysisOutcome, AnalysisPipeline};
pub use relevance::{relevance_score, select_relevant_events};
pub use store::{JobResults, JobStatusSnapshot, JobStore};
