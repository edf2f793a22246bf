//! Retrying, admission-limited VLM client.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::debug;

use crate::error::{VlmError, VlmResult};
use crate::metrics::record_request;
use crate::retry::RetryPolicy;
use crate::transport::{OllamaTransport, VlmTransport};
use crate::types::VlmRequest;

/// Anything that answers a prompt (plus images) with free text.
///
/// Calls are stateless; callers assemble all grounding into the request.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn query(&self, request: &VlmRequest, cancel: &watch::Receiver<bool>)
        -> VlmResult<String>;
}

/// Configuration for the VLM client.
#[derive(Debug, Clone)]
pub struct VlmClientConfig {
    /// Base URL of the model endpoint
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retry policy
    pub retry: RetryPolicy,
    /// Maximum simultaneous in-flight requests
    pub max_in_flight: usize,
}

impl Default for VlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llava:7b".to_string(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            max_in_flight: 4,
        }
    }
}

impl VlmClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VLM_API_BASE")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("VLM_MODEL").unwrap_or_else(|_| "llava:7b".to_string()),
            timeout: Duration::from_secs(
                std::env::var("VLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            retry: RetryPolicy::from_env(),
            max_in_flight: std::env::var("VLM_MAX_IN_FLIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(4),
        }
    }
}

/// Client for the vision-language model.
///
/// Cheap to clone; clones share the admission semaphore, so the in-flight
/// limit holds across every job and conversation using the same client.
#[derive(Clone)]
pub struct VlmClient {
    transport: Arc<dyn VlmTransport>,
    retry: RetryPolicy,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl VlmClient {
    /// Create a client backed by the Ollama-compatible HTTP transport.
    pub fn new(config: VlmClientConfig) -> VlmResult<Self> {
        let transport = OllamaTransport::new(&config.base_url, &config.model, config.timeout)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create from environment variables.
    pub fn from_env() -> VlmResult<Self> {
        Self::new(VlmClientConfig::from_env())
    }

    /// Create a client over any transport.
    pub fn with_transport(transport: Arc<dyn VlmTransport>, config: VlmClientConfig) -> Self {
        Self {
            transport,
            retry: config.retry,
            timeout: config.timeout,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        }
    }

    /// Whether the model endpoint is reachable.
    pub async fn health_check(&self) -> bool {
        self.transport.health_check().await
    }

    /// Whether the configured model is installed on the endpoint.
    pub async fn model_available(&self) -> VlmResult<bool> {
        self.transport.model_available().await
    }

    /// Requests currently allowed to start.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn attempt(&self, request: &VlmRequest) -> VlmResult<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| VlmError::Connection("admission semaphore closed".to_string()))?;

        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(VlmError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl VisionModel for VlmClient {
    async fn query(
        &self,
        request: &VlmRequest,
        cancel: &watch::Receiver<bool>,
    ) -> VlmResult<String> {
        let started = Instant::now();

        let result = self
            .retry
            .run("vlm_query", cancel, |_| self.attempt(request))
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        record_request(outcome, started.elapsed().as_secs_f64());
        debug!(
            outcome,
            latency_ms = started.elapsed().as_millis() as u64,
            "VLM query finished"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelParams;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Transport that fails the first `failures` calls with the given error.
    struct ScriptedTransport {
        calls: AtomicU32,
        failures: u32,
        error: fn() -> VlmError,
    }

    impl ScriptedTransport {
        fn new(failures: u32, error: fn() -> VlmError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
                error,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VlmTransport for ScriptedTransport {
        async fn send(&self, _request: &VlmRequest) -> VlmResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok("NONE".to_string())
            }
        }
    }

    /// Transport that never answers.
    struct HangingTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl VlmTransport for HangingTransport {
        async fn send(&self, _request: &VlmRequest) -> VlmResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    /// Transport that records the peak number of concurrent sends.
    struct ConcurrencyGauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl VlmTransport for ConcurrencyGauge {
        async fn send(&self, _request: &VlmRequest) -> VlmResult<String> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".to_string())
        }
    }

    fn config(max_attempts: u32) -> VlmClientConfig {
        VlmClientConfig {
            timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn request() -> VlmRequest {
        VlmRequest::new("describe the frame", ModelParams::frame_analysis())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_exactly_max_attempts() {
        let transport = Arc::new(HangingTransport {
            calls: AtomicU32::new(0),
        });
        let client = VlmClient::with_transport(transport.clone(), config(3));
        let (_tx, cancel) = watch::channel(false);

        let err = client.query(&request(), &cancel).await.unwrap_err();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        match err {
            VlmError::Unavailable { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, VlmError::Timeout(2)));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_request_fails_immediately() {
        let transport = ScriptedTransport::new(u32::MAX, || VlmError::malformed_request(400, "bad"));
        let client = VlmClient::with_transport(transport.clone(), config(3));
        let (_tx, cancel) = watch::channel(false);

        let err = client.query(&request(), &cancel).await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, VlmError::MalformedRequest { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let transport = ScriptedTransport::new(2, || VlmError::Connection("reset".into()));
        let client = VlmClient::with_transport(transport.clone(), config(3));
        let (_tx, cancel) = watch::channel(false);

        let text = client.query(&request(), &cancel).await.unwrap();

        assert_eq!(text, "NONE");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_limit_is_shared_between_clones() {
        let gauge = Arc::new(ConcurrencyGauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let client = VlmClient::with_transport(
            gauge.clone(),
            VlmClientConfig {
                max_in_flight: 2,
                ..config(1)
            },
        );
        let (_tx, cancel) = watch::channel(false);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let client = client.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                client.query(&request(), &cancel).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
        assert_eq!(client.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_reaches_in_flight_call() {
        let transport = Arc::new(HangingTransport {
            calls: AtomicU32::new(0),
        });
        let client = VlmClient::with_transport(transport, config(3));
        let (tx, cancel) = watch::channel(false);

        let handle = tokio::spawn(async move { client.query(&request(), &cancel).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_model_available_checks_installed_models() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{ "name": "mistral:latest" }]
            })))
            .mount(&server)
            .await;

        let client = VlmClient::new(VlmClientConfig {
            base_url: server.uri(),
            ..config(1)
        })
        .unwrap();

        assert!(client.health_check().await);
        assert!(!client.model_available().await.unwrap());

        let scripted = VlmClient::with_transport(ScriptedTransport::new(0, || VlmError::Timeout(1)), config(1));
        assert!(scripted.model_available().await.unwrap());
    }
}
