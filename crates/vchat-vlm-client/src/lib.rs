//! Client for the vision-language model endpoint.
//!
//! This crate provides:
//! - An Ollama-compatible HTTP transport
//! - An explicit retry policy (exponential backoff, full jitter)
//! - A shared in-flight admission limit and per-call timeout
//! - Cooperative cancellation of in-flight queries

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::{VisionModel, VlmClient, VlmClientConfig};
pub use error::{VlmError, VlmResult};
pub use retry::RetryPolicy;
pub use transport::{OllamaTransport, VlmTransport};
pub use types::{EncodedImage, ModelParams, VlmRequest};
