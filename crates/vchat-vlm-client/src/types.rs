//! Request types and the Ollama-compatible wire format.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use vchat_models::FrameImage;

/// Sampling parameters sent with each query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl ModelParams {
    /// Low temperature for per-frame event description.
    pub fn frame_analysis() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.8,
            max_tokens: 512,
        }
    }

    /// Conversational answers.
    pub fn chat() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1024,
        }
    }

    /// Summary prose.
    pub fn narrative() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.9,
            max_tokens: 768,
        }
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self::chat()
    }
}

/// Base64-encoded image payload.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn encode(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&FrameImage> for EncodedImage {
    fn from(image: &FrameImage) -> Self {
        Self::encode(&image.data)
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodedImage({} chars)", self.0.len())
    }
}

/// One stateless model query.
#[derive(Debug, Clone)]
pub struct VlmRequest {
    /// Optional system instruction
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Images attached to the prompt
    pub images: Vec<EncodedImage>,
    /// Sampling parameters
    pub params: ModelParams,
}

impl VlmRequest {
    pub fn new(prompt: impl Into<String>, params: ModelParams) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            images: Vec::new(),
            params,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: &FrameImage) -> Self {
        self.images.push(EncodedImage::from(image));
        self
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub options: ChatOptions,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

impl<'a> ChatRequest<'a> {
    pub fn from_request(model: &'a str, request: &'a VlmRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
                images: Vec::new(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
            images: request.images.iter().map(EncodedImage::as_str).collect(),
        });

        Self {
            model,
            messages,
            options: ChatOptions {
                temperature: request.params.temperature,
                top_p: request.params.top_p,
                num_predict: request.params.max_tokens,
            },
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelTag {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_request_shape() {
        let image = FrameImage::jpeg(vec![0xff, 0xd8, 0xff]);
        let request = VlmRequest::new("describe", ModelParams::frame_analysis())
            .with_system("you are a video analyst")
            .with_image(&image);

        let json = serde_json::to_value(ChatRequest::from_request("llava:7b", &request)).unwrap();

        assert_eq!(json["model"], "llava:7b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][0].get("images").is_none());
        assert_eq!(json["messages"][1]["content"], "describe");
        assert_eq!(json["messages"][1]["images"][0], "/9j/");
        assert_eq!(json["options"]["num_predict"], 512);
    }

    #[test]
    fn test_encoded_image_debug_hides_payload() {
        let encoded = EncodedImage::encode(b"secret");
        assert_eq!(format!("{:?}", encoded), "EncodedImage(8 chars)");
    }
}
