//! Event extraction, merging and summarization.
//!
//! This crate provides:
//! - Tolerant parsing of per-frame model output into typed events
//! - Merging of candidate events into an ordered, deduplicated sequence
//! - Timeline, highlight and statistics aggregation with narrative prose
//! - Queries over a finished event sequence

pub mod error;
pub mod extractor;
pub mod merge;
pub mod metrics;
pub mod prompts;
pub mod query;
pub mod summarizer;
pub mod text;

pub use error::{AnalysisError, AnalysisResult, ParseError};
pub use extractor::{EventExtractor, ExtractorConfig};
pub use merge::{merge_events, validate_event_sequence, MergeConfig};
pub use query::{events_by_type, events_in_range, find_event, high_severity_events};
pub use summarizer::{build_digest, Summarizer, SummarizerConfig, EMPTY_NARRATIVE, FALLBACK_NARRATIVE};
