//! Frame image sources.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

use vchat_models::{FrameImage, FrameSlot, VideoAsset};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{IngestionError, IngestionResult};

/// Produces the image for one sampled position of a video.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn grab(
        &self,
        asset: &VideoAsset,
        slot: FrameSlot,
        cancel: &watch::Receiver<bool>,
    ) -> IngestionResult<FrameImage>;
}

/// Extracts JPEG frames with the `ffmpeg` CLI.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    /// Output width in pixels; height keeps the aspect ratio
    pub frame_width: u32,
    /// JPEG quality scale (2 = best, 31 = worst)
    pub jpeg_quality: u8,
    /// Per-frame timeout
    pub timeout: Duration,
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self {
            frame_width: 768,
            jpeg_quality: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

impl FfmpegFrameSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    fn command(&self, asset: &VideoAsset, slot: FrameSlot) -> FfmpegCommand {
        FfmpegCommand::new(&asset.path)
            .seek(slot.timestamp)
            .single_frame()
            .video_filter(format!("scale={}:-2", self.frame_width))
            .output_format("image2pipe")
            .video_codec("mjpeg")
            .quality(self.jpeg_quality)
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn grab(
        &self,
        asset: &VideoAsset,
        slot: FrameSlot,
        cancel: &watch::Receiver<bool>,
    ) -> IngestionResult<FrameImage> {
        let cmd = self.command(asset, slot);
        let runner = FfmpegRunner::new()
            .with_timeout(self.timeout)
            .with_cancel(cancel.clone());

        let data = runner.capture(&cmd).await.map_err(|e| match e {
            IngestionError::FrameExtraction { message, stderr, .. } => {
                IngestionError::frame_extraction(slot.timestamp, message, stderr)
            }
            other => other,
        })?;

        if data.is_empty() {
            return Err(IngestionError::frame_extraction(
                slot.timestamp,
                "FFmpeg produced no image data",
                None,
            ));
        }

        Ok(FrameImage::jpeg(data))
    }
}
