//! Shared data models for the video chat assistant.
//!
//! This crate provides Serde-serializable types for:
//! - Video assets and sampled frames
//! - Analysis jobs and their lifecycle
//! - Detected events and summaries
//! - Conversation turns

pub mod conversation;
pub mod event;
pub mod frame;
pub mod job;
pub mod summary;
pub mod timestamp;
pub mod video;

// Re-export common types
pub use conversation::{estimate_tokens, ConversationId, ConversationTurn, Role};
pub use event::{Event, EventDraft, EventError, EventId, EventSubtype, EventType, Severity};
pub use frame::{Frame, FrameImage, FrameSlot};
pub use job::{AnalysisJob, FailureKind, JobFailure, JobId, JobState, JobStateError};
pub use summary::{CategorizedEvent, NarrativeSource, Statistics, Summary, TimelineEntry};
pub use video::{VideoAsset, VideoFormat, VideoId};
