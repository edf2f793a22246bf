//! Error types for ingestion and frame extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Errors that can occur while ingesting or sampling a video.
///
/// All variants are fatal to the owning job.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Cannot open video: {reason}")]
    CannotOpen { path: PathBuf, reason: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Video is {duration_secs:.1}s long, the maximum is {max_secs:.0}s")]
    TooLong { duration_secs: f64, max_secs: f64 },

    #[error("Invalid sampling configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame extraction failed at {timestamp:.3}s: {message}")]
    FrameExtraction {
        timestamp: f64,
        message: String,
        stderr: Option<String>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl IngestionError {
    /// Create a cannot-open error.
    pub fn cannot_open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CannotOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a frame extraction error.
    pub fn frame_extraction(
        timestamp: f64,
        message: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self::FrameExtraction {
            timestamp,
            message: message.into(),
            stderr,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, IngestionError::Cancelled)
    }
}
