//! Provider adapter trait definition
//!
//! An adapter knows one vendor's wire format: how to shape a request body
//! from the conversation, where to send it, and how to pull content,
//! thinking, tool calls and usage out of a complete response or out of a
//! single streamed frame. Adapters do no I/O themselves.

use crate::completion::{RequestOptions, TokenUsage};
use crate::config::AdapterConfig;
use crate::registry::ModelUsageEntry;
use crate::tools::ToolCallAccumulator;
use crate::{Attachment, LLMError, Message, Result, ToolCall};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scratch state the chunk parsers may keep across frames of one stream
///
/// Created fresh (or reset) at the start of every send so nothing leaks
/// between requests.
#[derive(Debug, Default)]
pub struct StreamState {
    /// Tool calls whose arguments are still arriving
    pub tools: ToolCallAccumulator,
    /// Input tokens reported early in the stream
    pub input_tokens: Option<u64>,
    /// Output tokens reported early in the stream
    pub output_tokens: Option<u64>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.tools.reset();
        self.input_tokens = None;
        self.output_tokens = None;
    }
}

/// One normalized entry of a vendor's model listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelListing {
    /// Display name
    pub name: String,
    /// Identifier to send as `model`
    pub model: String,
    pub created: Option<DateTime<Utc>>,
    pub owned_by: Option<String>,
    /// The vendor's entry as received
    pub raw: Value,
    /// Registry metadata, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ModelUsageEntry>,
}

/// Vendor-specific request shaping and response parsing
///
/// Parsers never fail on missing fields: absent content is `""`, absent
/// usage is `None`, absent tool calls is an empty `Vec`. The `*_chunk`
/// variants default to the whole-document parsers, which is correct for
/// vendors whose stream frames have the same shape as a full response.
pub trait ProviderAdapter: Send + Sync {
    /// Instance configuration (service, base URL, auth)
    fn config(&self) -> &AdapterConfig;

    /// Service name (e.g. "anthropic", "groq")
    fn service(&self) -> &str {
        &self.config().service
    }

    /// Self-hosted provider with no metered cost
    fn is_local(&self) -> bool {
        self.config().local
    }

    /// Model used when the caller names none
    fn default_model(&self) -> Option<&str> {
        None
    }

    /// Endpoint for a chat request
    fn chat_url(&self, options: &RequestOptions) -> String;

    /// Endpoint for the model listing
    fn models_url(&self) -> String;

    /// Headers for every request (auth plus vendor extras)
    fn headers(&self) -> Vec<(String, String)> {
        self.config().auth_headers()
    }

    /// Vendor request body for the conversation
    ///
    /// `history` is only read; `thinking` and `tool_call` turns are sent
    /// with the `assistant` role.
    fn build_request(&self, history: &[Message], options: &RequestOptions) -> Result<Value>;

    /// Convert an attachment to a vendor content fragment
    fn attachment_to_content(&self, attachment: &Attachment) -> Result<Value> {
        Err(LLMError::UnsupportedAttachment(format!(
            "{} does not accept {:?} attachments",
            self.service(),
            attachment.kind
        )))
    }

    /// Assistant text of a complete response
    fn parse_content(&self, body: &Value) -> String;

    /// Reasoning text of a complete response
    fn parse_thinking(&self, _body: &Value) -> String {
        String::new()
    }

    /// Tool calls of a complete response
    fn parse_tools(&self, _body: &Value) -> Vec<ToolCall> {
        Vec::new()
    }

    /// Token counts of a complete response
    fn parse_token_usage(&self, body: &Value) -> Option<TokenUsage>;

    /// Entries of a model-listing response
    fn parse_models(&self, body: &Value) -> Vec<Value> {
        body.get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Normalize one model-listing entry
    fn parse_model(&self, _entry: &Value) -> Result<ModelListing> {
        Err(LLMError::NotImplemented(format!(
            "parse_model for {}",
            self.service()
        )))
    }

    fn parse_content_chunk(&self, frame: &Value) -> String {
        self.parse_content(frame)
    }

    fn parse_thinking_chunk(&self, frame: &Value) -> String {
        self.parse_thinking(frame)
    }

    fn parse_token_usage_chunk(&self, frame: &Value, _state: &mut StreamState) -> Option<TokenUsage> {
        self.parse_token_usage(frame)
    }

    fn parse_tools_chunk(&self, frame: &Value, _state: &mut StreamState) -> Vec<ToolCall> {
        self.parse_tools(frame)
    }

    /// Release tool calls still open when the stream ends
    fn finish_tools(&self, state: &mut StreamState) -> Vec<ToolCall> {
        state.tools.finish_all()
    }

    /// Whether this frame ends the stream
    fn is_terminal_frame(&self, frame: &Value) -> bool {
        frame.get("done").and_then(Value::as_bool) == Some(true)
    }
}

/// String at a JSON pointer, or `""`
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

/// Non-negative integer at a JSON pointer
pub(crate) fn u64_at(value: &Value, pointer: &str) -> Option<u64> {
    value.pointer(pointer).and_then(Value::as_u64)
}

/// Array at a JSON pointer, or an empty slice
pub(crate) fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// Usage from a pair of counter pointers; `None` unless at least one is present
pub(crate) fn usage_at(value: &Value, input: &str, output: &str) -> Option<TokenUsage> {
    let input_tokens = u64_at(value, input);
    let output_tokens = u64_at(value, output);
    if input_tokens.is_none() && output_tokens.is_none() {
        return None;
    }
    Some(TokenUsage::new(
        input_tokens.unwrap_or(0),
        output_tokens.unwrap_or(0),
    ))
}

/// Timestamp given as unix seconds or an RFC 3339 string
pub(crate) fn parse_created(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Join every `system` turn into one instruction string
pub(crate) fn system_prompt(history: &[Message]) -> Option<String> {
    let parts: Vec<&str> = history
        .iter()
        .filter(|m| m.role == crate::Role::System)
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// Merge caller-supplied extra fields into a request body
pub(crate) fn merge_extended(body: &mut Value, options: &RequestOptions) {
    if let Value::Object(map) = body {
        for (key, value) in &options.extended {
            map.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_helpers() {
        let body = json!({"a": {"b": "text", "n": 3, "list": [1, 2]}});
        assert_eq!(str_at(&body, "/a/b"), "text");
        assert_eq!(str_at(&body, "/a/missing"), "");
        assert_eq!(u64_at(&body, "/a/n"), Some(3));
        assert_eq!(array_at(&body, "/a/list").len(), 2);
        assert!(array_at(&body, "/nope").is_empty());
        assert_eq!(usage_at(&body, "/a/n", "/x"), Some(TokenUsage::new(3, 0)));
        assert_eq!(usage_at(&body, "/x", "/y"), None);
    }

    #[test]
    fn test_parse_created() {
        let unix = parse_created(Some(&json!(1_700_000_000))).unwrap();
        assert_eq!(unix.timestamp(), 1_700_000_000);

        let rfc = parse_created(Some(&json!("2024-05-01T12:00:00.123456Z"))).unwrap();
        assert_eq!(rfc.timestamp(), 1_714_564_800);

        assert!(parse_created(Some(&json!("yesterday"))).is_none());
        assert!(parse_created(None).is_none());
    }

    #[test]
    fn test_system_prompt_joins_turns() {
        let history = vec![
            Message::system("Be brief."),
            Message::user("hi"),
            Message::system("Answer in French."),
        ];
        assert_eq!(
            system_prompt(&history),
            Some("Be brief.\n\nAnswer in French.".to_string())
        );
        assert_eq!(system_prompt(&[Message::user("x")]), None);
    }

    #[test]
    fn test_stream_state_reset() {
        let mut state = StreamState::new();
        state.input_tokens = Some(5);
        state.tools.start(0, Some("id"), Some("name"));
        state.reset();
        assert!(state.input_tokens.is_none());
        assert!(state.tools.is_empty());
    }
}
