//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use vchat_models::{VideoAsset, VideoFormat};

use crate::error::{IngestionError, IngestionResult};

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// Container demuxer names as reported by ffprobe
    pub format_name: String,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> IngestionResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(IngestionError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| IngestionError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("ffprobe failed for {}: {}", path.display(), stderr.trim());
        return Err(IngestionError::cannot_open(path, "ffprobe could not read the file"));
    }

    parse_probe_output(path, &output.stdout)
}

fn parse_probe_output(path: &Path, stdout: &[u8]) -> IngestionResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| IngestionError::cannot_open(path, "no video stream found"))?;

    // Container duration first, stream duration as a fallback
    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| IngestionError::cannot_open(path, "video duration is unknown"))?;

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        format_name: probe.format.format_name.unwrap_or_default(),
    })
}

/// Probe a file and turn it into an immutable [`VideoAsset`].
///
/// Rejects containers other than MP4, MOV, AVI, MKV and WebM. Duration
/// limits are enforced by the sampler.
pub async fn ingest(path: impl AsRef<Path>) -> IngestionResult<VideoAsset> {
    let path = path.as_ref();
    let info = probe_video(path).await?;
    asset_from_info(path, &info)
}

fn asset_from_info(path: &Path, info: &VideoInfo) -> IngestionResult<VideoAsset> {
    let extension = path.extension().and_then(|e| e.to_str());
    let format = VideoFormat::from_container_name(&info.format_name, extension)
        .ok_or_else(|| IngestionError::UnsupportedFormat(info.format_name.clone()))?;

    Ok(VideoAsset::new(path, info.duration, info.fps, format)
        .with_dimensions(info.width, info.height))
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse::<f64>().ok().filter(|fps| *fps > 0.0)
}
