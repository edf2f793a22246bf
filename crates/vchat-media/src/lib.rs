//! FFmpeg CLI wrapper for video ingestion and frame sampling.
//!
//! This crate provides:
//! - Video probing and format validation (`ffprobe`)
//! - Time-uniform frame sampling plans
//! - Single-frame JPEG extraction (`ffmpeg`) with timeout and cancellation

pub mod command;
pub mod error;
pub mod probe;
pub mod sampler;
pub mod source;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use error::{IngestionError, IngestionResult};
pub use probe::{ingest, probe_video, VideoInfo};
pub use sampler::{FrameSampler, SamplePlan, SamplerConfig};
pub use source::{FfmpegFrameSource, FrameSource};
