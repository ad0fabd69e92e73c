//! Error types for LLM operations

use serde_json::Value;
use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
///
/// Absent fields in a vendor payload (no content, no usage yet, no tool calls)
/// are never errors; they surface as empty values instead.
#[derive(Error, Debug)]
pub enum LLMError {
    /// Vendor returned a non-success status
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message extracted from the vendor's error envelope
        message: String,
    },

    /// Invalid API key or authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The vendor cannot represent this attachment
    #[error("Unsupported attachment: {0}")]
    UnsupportedAttachment(String),

    /// An adapter does not implement an operation that was invoked
    #[error("Not implemented by this provider: {0}")]
    NotImplemented(String),

    /// No cost metadata for a paid model
    #[error("Unknown model '{model}' for service '{service}' (enable allow_unknown_models to skip cost lookup)")]
    UnknownModel {
        /// Service the lookup ran against
        service: String,
        /// Model name as sent
        model: String,
    },

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Transport failed while a stream was being read
    #[error("Stream error: {0}")]
    StreamError(String),

    /// The send was aborted through its cancel handle
    #[error("Request cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LLMError {
    /// Build the transport error for a non-success status and its body
    pub fn from_status(status: u16, body: Option<&Value>, raw: Option<&str>) -> Self {
        let message = body
            .and_then(extract_error_message)
            .or_else(|| {
                raw.map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {status}"));

        match status {
            401 | 403 => Self::AuthenticationFailed(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::Api { status, message },
        }
    }

    /// HTTP status carried by this error, if it came from the transport
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::AuthenticationFailed(_) => Some(401),
            Self::RateLimitExceeded(_) => Some(429),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Pull a human-readable message out of a vendor error envelope
///
/// Handles `{"error": "text"}`, `{"error": {"type", "message"}}`,
/// `{"message": ...}`, and bare strings. Other objects are stringified.
pub fn extract_error_message(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => {
            if let Some(inner) = map.get("error") {
                return match inner {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(err) => {
                        let message = err.get("message").and_then(Value::as_str);
                        let kind = err
                            .get("type")
                            .or_else(|| err.get("status"))
                            .and_then(Value::as_str);
                        match (kind, message) {
                            (Some(kind), Some(message)) => Some(format!("{kind}: {message}")),
                            (None, Some(message)) => Some(message.to_string()),
                            _ => Some(inner.to_string()),
                        }
                    }
                    other => Some(other.to_string()),
                };
            }
            if let Some(message) = map.get("message").and_then(Value::as_str) {
                return Some(message.to_string());
            }
            Some(body.to_string())
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
