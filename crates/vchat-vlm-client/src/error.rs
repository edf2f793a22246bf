//! VLM client error types.

use thiserror::Error;

pub type VlmResult<T> = Result<T, VlmError>;

#[derive(Debug, Error)]
pub enum VlmError {
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Model endpoint returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Malformed request ({status}): {message}")]
    MalformedRequest { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("VLM unavailable after {attempts} attempts: {last}")]
    Unavailable {
        attempts: u32,
        #[source]
        last: Box<VlmError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VlmError {
    pub fn malformed_request(status: u16, message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Classify a non-success HTTP status.
    ///
    /// 408, 429 and 5xx are transient; any other status is treated as a
    /// request the endpoint will never accept.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            408 | 429 | 500..=599 => Self::Server { status, body },
            _ => Self::MalformedRequest {
                status,
                message: body,
            },
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::InvalidConfig(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VlmError::Timeout(_) | VlmError::Connection(_) | VlmError::Server { .. }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, VlmError::Unavailable { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, VlmError::Cancelled)
    }

    /// Short outcome label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            VlmError::Timeout(_) => "timeout",
            VlmError::Connection(_) => "connection",
            VlmError::Server { .. } => "server_error",
            VlmError::MalformedRequest { .. } => "malformed_request",
            VlmError::InvalidResponse(_) => "invalid_response",
            VlmError::Cancelled => "cancelled",
            VlmError::Unavailable { .. } => "unavailable",
            VlmError::InvalidConfig(_) => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(VlmError::from_http_status(503, "busy").is_retryable());
        assert!(VlmError::from_http_status(500, "").is_retryable());
        assert!(VlmError::from_http_status(429, "slow down").is_retryable());
        assert!(VlmError::from_http_status(408, "").is_retryable());

        let err = VlmError::from_http_status(400, "bad image");
        assert!(!err.is_retryable());
        assert!(matches!(err, VlmError::MalformedRequest { status: 400, .. }));
        assert!(!VlmError::from_http_status(404, "model not found").is_retryable());
    }

    #[test]
    fn test_unavailable_keeps_cause() {
        let err = VlmError::Unavailable {
            attempts: 3,
            last: Box::new(VlmError::Timeout(60)),
        };
        assert!(err.is_unavailable());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("60 seconds"));
    }
}
