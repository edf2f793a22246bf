//! HTTP transport to the model endpoint.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{VlmError, VlmResult};
use crate::types::{ChatRequest, ChatResponse, TagsResponse, VlmRequest};

/// One request/response exchange with a model endpoint.
///
/// Implementations perform a single attempt; retry, admission and
/// cancellation are layered on top by [`crate::VlmClient`].
#[async_trait]
pub trait VlmTransport: Send + Sync {
    async fn send(&self, request: &VlmRequest) -> VlmResult<String>;

    /// Whether the endpoint is reachable.
    async fn health_check(&self) -> bool {
        true
    }

    /// Whether the configured model is installed on the endpoint.
    async fn model_available(&self) -> VlmResult<bool> {
        Ok(true)
    }
}

/// Ollama-compatible `/api/chat` transport.
pub struct OllamaTransport {
    http: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaTransport {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> VlmResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VlmError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models installed on the endpoint.
    pub async fn list_models(&self) -> VlmResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_reqwest(e))?;
        if !status.is_success() {
            return Err(VlmError::from_http_status(status.as_u16(), body));
        }

        let tags: TagsResponse = serde_json::from_str(&body)
            .map_err(|e| VlmError::invalid_response(format!("model list: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn map_reqwest(&self, err: reqwest::Error) -> VlmError {
        VlmError::from_reqwest(err, self.timeout.as_secs())
    }
}

#[async_trait]
impl VlmTransport for OllamaTransport {
    async fn send(&self, request: &VlmRequest) -> VlmResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest::from_request(&self.model, request);

        debug!(
            model = %self.model,
            images = request.images.len(),
            prompt_chars = request.prompt.len(),
            "Sending VLM request"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest(e))?;
        if !status.is_success() {
            return Err(VlmError::from_http_status(status.as_u16(), text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| VlmError::invalid_response(e.to_string()))?;
        Ok(parsed.message.content)
    }

    async fn health_check(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(e) => {
                warn!("VLM endpoint health check failed: {}", e);
                false
            }
        }
    }

    async fn model_available(&self) -> VlmResult<bool> {
        let models = self.list_models().await?;
        let wanted = self.model.as_str();
        Ok(models.iter().any(|name| {
            name == wanted || name.strip_suffix(":latest") == Some(wanted)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelParams;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> OllamaTransport {
        OllamaTransport::new(server.uri(), "llava:7b", Duration::from_secs(5)).unwrap()
    }

    fn request() -> VlmRequest {
        VlmRequest::new("What happens here?", ModelParams::frame_analysis())
    }

    #[tokio::test]
    async fn test_send_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llava:7b",
                "stream": false,
                "options": { "num_predict": 512 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llava:7b",
                "message": { "role": "assistant", "content": "ACTION_EVENT|a person walks|medium|person" },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = transport(&server).send(&request()).await.unwrap();
        assert_eq!(text, "ACTION_EVENT|a person walks|medium|person");
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let err = transport(&server).send(&request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, VlmError::Server { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_bad_request_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid image"))
            .mount(&server)
            .await;

        let err = transport(&server).send(&request()).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(matches!(err, VlmError::MalformedRequest { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let err = transport(&server).send(&request()).await.unwrap_err();
        assert!(matches!(err, VlmError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let t = OllamaTransport::new("http://127.0.0.1:9", "llava:7b", Duration::from_secs(2)).unwrap();
        let err = t.send(&request()).await.unwrap_err();
        assert!(err.is_retryable(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_model_available_and_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{ "name": "llava:7b" }, { "name": "mistral:latest" }]
            })))
            .mount(&server)
            .await;

        let t = transport(&server);
        assert!(t.health_check().await);
        assert!(t.model_available().await.unwrap());

        let other = OllamaTransport::new(server.uri(), "mistral", Duration::from_secs(5)).unwrap();
        assert!(other.model_available().await.unwrap());

        let missing = OllamaTransport::new(server.uri(), "bakllava", Duration::from_secs(5)).unwrap();
        assert!(!missing.model_available().await.unwrap());
    }
}
