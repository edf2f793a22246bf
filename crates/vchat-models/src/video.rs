//! Video asset models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
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

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container formats accepted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    Mp4,
    Mov,
    Avi,
    Mkv,
    Webm,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Mov => "mov",
            VideoFormat::Avi => "avi",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Webm => "webm",
        }
    }

    /// Map an ffprobe `format_name` to a supported format.
    ///
    /// ffprobe reports comma-separated demuxer aliases
    /// (e.g. `mov,mp4,m4a,3gp,3g2,mj2`), so the file extension is used to
    /// disambiguate when it agrees with one of the aliases.
    pub fn from_container_name(name: &str, extension: Option<&str>) -> Option<Self> {
        let aliases: Vec<String> = name
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .collect();

        if let Some(ext) = extension.and_then(Self::from_extension) {
            let matches_alias = aliases.iter().any(|alias| match ext {
                VideoFormat::Mkv => alias == "matroska",
                VideoFormat::Webm => alias == "webm" || alias == "matroska",
                other => alias == other.as_str(),
            });
            if matches_alias {
                return Some(ext);
            }
        }

        aliases.iter().find_map(|alias| match alias.as_str() {
            "mp4" => Some(VideoFormat::Mp4),
            "mov" => Some(VideoFormat::Mov),
            "avi" => Some(VideoFormat::Avi),
            "matroska" => Some(VideoFormat::Mkv),
            "webm" => Some(VideoFormat::Webm),
            _ => None,
        })
    }

    /// Map a file extension (without dot) to a supported format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" => Some(VideoFormat::Mp4),
            "mov" => Some(VideoFormat::Mov),
            "avi" => Some(VideoFormat::Avi),
            "mkv" => Some(VideoFormat::Mkv),
            "webm" => Some(VideoFormat::Webm),
            _ => None,
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested video. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoAsset {
    /// Video identifier
    pub id: VideoId,
    /// Location of the source file
    pub path: PathBuf,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Source frame rate (fps)
    pub frame_rate: f64,
    /// Container format
    pub format: VideoFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoAsset {
    pub fn new(
        path: impl Into<PathBuf>,
        duration_secs: f64,
        frame_rate: f64,
        format: VideoFormat,
    ) -> Self {
        Self {
            id: VideoId::new(),
            path: path.into(),
            duration_secs,
            frame_rate,
            format,
            width: 0,
            height: 0,
        }
    }

    /// Set frame dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}
