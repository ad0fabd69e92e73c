//! HTTP transport seam
//!
//! The core never talks to the network directly. It hands an [`HttpRequest`]
//! to a [`Transport`] and gets back a status, headers, and either a JSON
//! document or a byte stream. [`ReqwestTransport`] is the default.

use crate::{LLMError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, instrument};

/// Raw response bytes as they arrive from the network
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Deliver the body as a byte stream instead of a parsed document
    pub stream: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            stream: false,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
            stream: false,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Response payload
pub enum ResponseBody {
    Json(Value),
    /// Non-JSON text (usually an error page)
    Text(String),
    Stream(ByteStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Json(body),
        }
    }

    pub fn stream(status: u16, stream: ByteStream) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Stream(stream),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-success status into the matching error
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(match &self.body {
            ResponseBody::Json(value) => LLMError::from_status(self.status, Some(value), None),
            ResponseBody::Text(text) => LLMError::from_status(self.status, None, Some(text)),
            ResponseBody::Stream(_) => LLMError::from_status(self.status, None, None),
        })
    }

    /// Parsed JSON document of a successful response
    pub fn into_json(self) -> Result<Value> {
        match self.error_for_status()?.body {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Text(text) => serde_json::from_str(&text).map_err(|e| {
                LLMError::UnexpectedResponse(format!("Failed to parse response: {e}"))
            }),
            ResponseBody::Stream(_) => Err(LLMError::UnexpectedResponse(
                "Expected a JSON document, got a stream".to_string(),
            )),
        }
    }

    /// Byte stream of a successful response
    ///
    /// A JSON body is replayed as a single chunk, so a vendor that ignores
    /// the stream flag still flows through the frame parser.
    pub fn into_byte_stream(self) -> Result<ByteStream> {
        match self.error_for_status()?.body {
            ResponseBody::Stream(stream) => Ok(stream),
            ResponseBody::Json(value) => {
                let chunk = Bytes::from(value.to_string());
                Ok(Box::pin(futures::stream::iter([Ok(chunk)])))
            }
            ResponseBody::Text(text) => {
                Ok(Box::pin(futures::stream::iter([Ok(Bytes::from(text))])))
            }
        }
    }
}

/// Executes HTTP requests on behalf of the client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request; non-success statuses are returned, not raised
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport whose buffered requests time out after `timeout_secs`
    ///
    /// Streamed requests only get a connect timeout, since a long generation
    /// can legitimately outlive any fixed deadline.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    pub fn from_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url, stream = request.stream))]
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if !request.stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        debug!(status, "Received response headers");

        let body = if request.stream && response.status().is_success() {
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| LLMError::StreamError(e.to_string())));
            ResponseBody::Stream(Box::pin(stream))
        } else {
            let text = response.text().await?;
            match serde_json::from_str(&text) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(text),
            }
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_for_status_uses_envelope() {
        let response = HttpResponse::json(404, json!({"error": {"message": "no such model"}}));
        let err = response.into_json().unwrap_err();
        assert!(matches!(err, LLMError::Api { status: 404, ref message } if message == "no such model"));
    }

    #[test]
    fn test_text_body_parsing() {
        let response = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Text("not json".to_string()),
        };
        assert!(matches!(
            response.into_json(),
            Err(LLMError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_json_body_as_stream() {
        let response = HttpResponse::json(200, json!({"done": true}));
        let mut stream = response.into_byte_stream().unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], br#"{"done":true}"#);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_transport_creation() {
        assert!(ReqwestTransport::new(30).is_ok());
    }
}
