//! Time-uniform frame sampling.
//!
//! Frames are drawn every `1 / sampling_rate` seconds starting at zero.
//! A video of duration `D` sampled at rate `r` yields `floor(D * r)`
//! frames; the trailing partial interval is dropped.

use futures::stream::{self, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use vchat_models::{Frame, FrameSlot, VideoAsset};

use crate::error::{IngestionError, IngestionResult};
use crate::source::FrameSource;

/// Guards `floor` against representation error (e.g. `0.1 * 30`).
const FLOOR_EPSILON: f64 = 1e-9;

/// Sampling configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Frames per second of video
    pub sampling_rate: f64,
    /// Longest accepted video
    pub max_duration: Duration,
    /// Optional cap on the number of sampled frames
    pub max_frames: Option<usize>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1.0,
            max_duration: Duration::from_secs(120),
            max_frames: None,
        }
    }
}

impl SamplerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            sampling_rate: std::env::var("SAMPLING_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            max_duration: Duration::from_secs(
                std::env::var("MAX_VIDEO_DURATION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_frames: std::env::var("MAX_SAMPLED_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Seconds between two sampled frames.
    pub fn interval(&self) -> f64 {
        1.0 / self.sampling_rate
    }

    fn validate(&self) -> IngestionResult<()> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(IngestionError::InvalidConfig(format!(
                "sampling rate must be positive, got {}",
                self.sampling_rate
            )));
        }
        Ok(())
    }
}

/// Ordered, finite sequence of frame positions.
///
/// Cloning restarts iteration from the current position; a fresh plan from
/// [`FrameSampler::plan`] always starts at frame zero.
#[derive(Debug, Clone)]
pub struct SamplePlan {
    next: u32,
    count: u32,
    rate: f64,
}

impl Iterator for SamplePlan {
    type Item = FrameSlot;

    fn next(&mut self) -> Option<FrameSlot> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(FrameSlot {
            index,
            timestamp: index as f64 / self.rate,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SamplePlan {}

/// Samples frames from one validated video asset.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    asset: VideoAsset,
    config: SamplerConfig,
    frame_count: u32,
}

impl FrameSampler {
    /// Validate the asset against the configuration.
    ///
    /// Fails with [`IngestionError::TooLong`] when the asset exceeds
    /// `max_duration`, and with [`IngestionError::InvalidConfig`] when the
    /// plan would exceed `u32::MAX` frames; nothing is read from the file.
    pub fn new(asset: VideoAsset, config: SamplerConfig) -> IngestionResult<Self> {
        config.validate()?;

        if !asset.duration_secs.is_finite() || asset.duration_secs < 0.0 {
            return Err(IngestionError::cannot_open(
                &asset.path,
                format!("invalid duration {}", asset.duration_secs),
            ));
        }

        let max_secs = config.max_duration.as_secs_f64();
        if asset.duration_secs > max_secs {
            return Err(IngestionError::TooLong {
                duration_secs: asset.duration_secs,
                max_secs,
            });
        }

        let count = planned_frames(&asset, &config);
        let frame_count = u32::try_from(count).map_err(|_| {
            IngestionError::InvalidConfig(format!(
                "sampling rate {} yields {} frames, more than a plan can index",
                config.sampling_rate, count
            ))
        })?;

        Ok(Self {
            asset,
            config,
            frame_count,
        })
    }

    pub fn asset(&self) -> &VideoAsset {
        &self.asset
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Number of frames the plan yields.
    pub fn frame_count(&self) -> usize {
        self.frame_count as usize
    }

    /// Fresh plan starting at frame zero.
    pub fn plan(&self) -> SamplePlan {
        SamplePlan {
            next: 0,
            count: self.frame_count,
            rate: self.config.sampling_rate,
        }
    }

    /// Lazily extract frames in plan order.
    ///
    /// Each frame is grabbed only when the stream is polled. Stops with
    /// [`IngestionError::Cancelled`] once the signal is set.
    pub fn frames<'a>(
        &'a self,
        source: &'a dyn FrameSource,
        cancel: &'a watch::Receiver<bool>,
    ) -> impl Stream<Item = IngestionResult<Frame>> + Send + 'a {
        debug!(
            video_id = %self.asset.id,
            frames = self.frame_count(),
            rate = self.config.sampling_rate,
            "Sampling frames"
        );

        stream::iter(self.plan()).then(move |slot| async move {
            if *cancel.borrow() {
                return Err(IngestionError::Cancelled);
            }
            let image = source.grab(&self.asset, slot, cancel).await?;
            Ok(Frame::new(slot, image))
        })
    }
}

/// `floor(D * r)` over the accepted duration, capped by `max_frames`.
/// Saturates at `usize::MAX` for absurd rates.
fn planned_frames(asset: &VideoAsset, config: &SamplerConfig) -> usize {
    let effective = asset.duration_secs.min(config.max_duration.as_secs_f64());
    let count = (effective * config.sampling_rate + FLOOR_EPSILON).floor() as usize;
    match config.max_frames {
        Some(cap) => count.min(cap),
        None => count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vchat_models::{FrameImage, VideoFormat};

    struct StubSource {
        grabs: AtomicUsize,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                grabs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FrameSource for StubSource {
        async fn grab(
            &self,
            _asset: &VideoAsset,
            slot: FrameSlot,
            _cancel: &watch::Receiver<bool>,
        ) -> IngestionResult<FrameImage> {
            self.grabs.fetch_add(1, Ordering::SeqCst);
            Ok(FrameImage::jpeg(vec![slot.index as u8]))
        }
    }

    fn asset(duration: f64) -> VideoAsset {
        VideoAsset::new("/tmp/video.mp4", duration, 30.0, VideoFormat::Mp4)
    }

    fn config(rate: f64) -> SamplerConfig {
        SamplerConfig {
            sampling_rate: rate,
            ..Default::default()
        }
    }

    #[test]
    fn test_frame_count_is_floor_of_duration_times_rate() {
        let cases = [
            (10.0, 1.0, 10),
            (10.5, 2.0, 21),
            (2.4, 0.5, 1),
            (0.9, 1.0, 0),
            (3.0, 0.1 * 30.0, 9),
            (120.0, 1.0, 120),
        ];
        for (duration, rate, expected) in cases {
            let sampler = FrameSampler::new(asset(duration), config(rate)).unwrap();
            assert_eq!(sampler.frame_count(), expected, "D={duration} r={rate}");
            assert_eq!(sampler.plan().count(), expected);
        }
    }

    #[test]
    fn test_plan_timestamps_are_index_over_rate() {
        let sampler = FrameSampler::new(asset(5.0), config(2.0)).unwrap();
        let slots: Vec<FrameSlot> = sampler.plan().collect();

        assert_eq!(slots.len(), 10);
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(slot.index, i as u32);
            assert_eq!(slot.timestamp, i as f64 / 2.0);
        }
        assert!(slots.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_too_long_is_rejected() {
        let err = FrameSampler::new(asset(150.0), config(1.0)).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::TooLong { duration_secs, max_secs } if duration_secs == 150.0 && max_secs == 120.0
        ));
    }

    #[test]
    fn test_exactly_max_duration_is_accepted() {
        assert!(FrameSampler::new(asset(120.0), config(1.0)).is_ok());
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        for rate in [0.0, -1.0, f64::NAN] {
            let err = FrameSampler::new(asset(5.0), config(rate)).unwrap_err();
            assert!(matches!(err, IngestionError::InvalidConfig(_)));
        }
    }

    #[test]
    fn test_unindexable_frame_count_is_rejected() {
        let err = FrameSampler::new(asset(100.0), config(1e9)).unwrap_err();
        assert!(matches!(err, IngestionError::InvalidConfig(_)), "got {err:?}");

        // a frame cap brings the same rate back into range
        let capped = SamplerConfig {
            max_frames: Some(8),
            ..config(1e9)
        };
        let sampler = FrameSampler::new(asset(100.0), capped).unwrap();
        assert_eq!(sampler.frame_count(), 8);
        assert_eq!(sampler.plan().len(), 8);
    }

    #[test]
    fn test_max_frames_caps_plan() {
        let cfg = SamplerConfig {
            max_frames: Some(4),
            ..config(1.0)
        };
        let sampler = FrameSampler::new(asset(60.0), cfg).unwrap();
        assert_eq!(sampler.plan().len(), 4);
    }

    #[tokio::test]
    async fn test_frames_stream_is_lazy_and_restartable() {
        let sampler = FrameSampler::new(asset(4.0), config(1.0)).unwrap();
        let source = StubSource::new();
        let (_tx, cancel) = watch::channel(false);

        let first: Vec<Frame> = sampler
            .frames(&source, &cancel)
            .take(2)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(first.len(), 2);
        assert_eq!(source.grabs.load(Ordering::SeqCst), 2);

        let all: Vec<Frame> = sampler
            .frames(&source, &cancel)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].index(), 0);
        assert_eq!(all[3].timestamp(), 3.0);
        assert_eq!(all[3].image.data, vec![3]);
    }

    #[tokio::test]
    async fn test_frames_stream_stops_when_cancelled() {
        let sampler = FrameSampler::new(asset(4.0), config(1.0)).unwrap();
        let source = StubSource::new();
        let (tx, cancel) = watch::channel(false);
        tx.send(true).unwrap();

        let results: Vec<IngestionResult<Frame>> =
            sampler.frames(&source, &cancel).take(1).collect().await;
        assert!(matches!(results[0], Err(IngestionError::Cancelled)));
        assert_eq!(source.grabs.load(Ordering::SeqCst), 0);
    }
}
