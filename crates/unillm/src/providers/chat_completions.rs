//! OpenAI-compatible chat completions adapter
//!
//! One implementation serves every vendor that speaks the
//! `/chat/completions` dialect: Groq, DeepSeek, xAI, OpenRouter, llamafile
//! and any generic endpoint (`apiv1`). Profiles differ only in base URL,
//! default model and how reasoning is requested.
//! See: https://platform.openai.com/docs/api-reference/chat

use crate::completion::{RequestOptions, TokenUsage};
use crate::config::{AdapterConfig, AuthStyle};
use crate::provider::{
    ModelListing, ProviderAdapter, StreamState, array_at, merge_extended, parse_created, str_at,
    usage_at,
};
use crate::tools::ToolStyle;
use crate::{Attachment, LLMError, Message, MessageContent, Result, ToolCall};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com/v1";
pub const XAI_API_BASE: &str = "https://api.x.ai/v1";
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const LLAMAFILE_API_BASE: &str = "http://127.0.0.1:8080/v1";
pub const APIV1_API_BASE: &str = "http://localhost:8080/v1";

/// How a profile asks for reasoning output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningStyle {
    /// Reasoning is implied by the model (e.g. `deepseek-reasoner`)
    Implicit,
    /// `"reasoning_effort": "high"`
    Effort,
    /// `"reasoning": {"max_tokens": n}`
    Budget,
}

/// Adapter for the chat completions dialect
#[derive(Debug, Clone)]
pub struct ChatCompletionsAdapter {
    config: AdapterConfig,
    default_model: Option<String>,
    reasoning: ReasoningStyle,
}

impl ChatCompletionsAdapter {
    /// Generic endpoint; no default model
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            default_model: None,
            reasoning: ReasoningStyle::Effort,
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningStyle) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn groq_config() -> AdapterConfig {
        AdapterConfig::new("groq", GROQ_API_BASE, AuthStyle::Bearer).stream_usage(true)
    }

    pub fn deepseek_config() -> AdapterConfig {
        AdapterConfig::new("deepseek", DEEPSEEK_API_BASE, AuthStyle::Bearer).stream_usage(true)
    }

    pub fn xai_config() -> AdapterConfig {
        AdapterConfig::new("xai", XAI_API_BASE, AuthStyle::Bearer).stream_usage(true)
    }

    pub fn openrouter_config() -> AdapterConfig {
        AdapterConfig::new("openrouter", OPENROUTER_API_BASE, AuthStyle::Bearer).stream_usage(true)
    }

    pub fn llamafile_config() -> AdapterConfig {
        AdapterConfig::new("llamafile", LLAMAFILE_API_BASE, AuthStyle::None).local(true)
    }

    pub fn apiv1_config() -> AdapterConfig {
        AdapterConfig::new("apiv1", APIV1_API_BASE, AuthStyle::Bearer).stream_usage(true)
    }

    pub fn groq(config: AdapterConfig) -> Self {
        Self::new(config).with_default_model("llama-3.3-70b-versatile")
    }

    pub fn deepseek(config: AdapterConfig) -> Self {
        Self::new(config)
            .with_default_model("deepseek-chat")
            .with_reasoning(ReasoningStyle::Implicit)
    }

    pub fn xai(config: AdapterConfig) -> Self {
        Self::new(config).with_default_model("grok-3")
    }

    pub fn openrouter(config: AdapterConfig) -> Self {
        Self::new(config)
            .with_default_model("openai/gpt-4o-mini")
            .with_reasoning(ReasoningStyle::Budget)
    }

    pub fn llamafile(config: AdapterConfig) -> Self {
        Self::new(config)
            .with_default_model("LLaMA_CPP")
            .with_reasoning(ReasoningStyle::Implicit)
    }

    fn convert_message(&self, message: &Message) -> Result<ChatMessage> {
        let role = message.role.wire_role().to_string();
        Ok(match &message.content {
            MessageContent::Text(text) => ChatMessage {
                role,
                content: Some(ChatContent::Text(text.clone())),
                tool_calls: None,
            },
            MessageContent::Parts { text, attachments } => {
                let mut parts = Vec::with_capacity(attachments.len() + 1);
                if !text.is_empty() {
                    parts.push(json!({"type": "text", "text": text}));
                }
                for attachment in attachments {
                    parts.push(self.attachment_to_content(attachment)?);
                }
                ChatMessage {
                    role,
                    content: Some(ChatContent::Parts(parts)),
                    tool_calls: None,
                }
            }
            MessageContent::ToolCall(call) => ChatMessage {
                role,
                content: None,
                tool_calls: Some(vec![call.to_function_call()]),
            },
        })
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    // null content is valid on tool-call turns
    content: Option<ChatContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<Value>),
}

impl ProviderAdapter for ChatCompletionsAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    fn chat_url(&self, _options: &RequestOptions) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url)
    }

    fn build_request(&self, history: &[Message], options: &RequestOptions) -> Result<Value> {
        let messages = history
            .iter()
            .map(|message| self.convert_message(message))
            .collect::<Result<Vec<_>>>()?;

        let (reasoning_effort, reasoning) = match (options.think, self.reasoning) {
            (false, _) | (true, ReasoningStyle::Implicit) => (None, None),
            (true, ReasoningStyle::Effort) => (Some("high"), None),
            (true, ReasoningStyle::Budget) => {
                (None, Some(json!({"max_tokens": options.thinking_budget()})))
            }
        };

        let request = ChatRequest {
            model: options.model.clone(),
            messages,
            max_tokens: options.max_tokens,
            stream: options.stream,
            stream_options: (options.stream && self.config.stream_usage)
                .then(|| json!({"include_usage": true})),
            temperature: options.temperature,
            tools: options
                .tools
                .as_ref()
                .filter(|tools| !tools.is_empty())
                .map(|tools| tools.iter().map(|t| t.wrap(ToolStyle::Functions)).collect()),
            response_format: options.json.then(|| json!({"type": "json_object"})),
            reasoning_effort,
            reasoning,
        };

        let mut body = serde_json::to_value(request)?;
        merge_extended(&mut body, options);
        Ok(body)
    }

    fn attachment_to_content(&self, attachment: &Attachment) -> Result<Value> {
        if attachment.is_image() {
            return Ok(json!({
                "type": "image_url",
                "image_url": {"url": attachment.data_url()},
            }));
        }
        Err(LLMError::UnsupportedAttachment(format!(
            "{} chat completions accept images only",
            self.config.service
        )))
    }

    fn parse_content(&self, body: &Value) -> String {
        str_at(body, "/choices/0/message/content").to_string()
    }

    fn parse_thinking(&self, body: &Value) -> String {
        reasoning_text(body.pointer("/choices/0/message"))
    }

    fn parse_tools(&self, body: &Value) -> Vec<ToolCall> {
        array_at(body, "/choices/0/message/tool_calls")
            .iter()
            .filter_map(ToolCall::from_function_call)
            .collect()
    }

    fn parse_token_usage(&self, body: &Value) -> Option<TokenUsage> {
        usage_at(body, "/usage/prompt_tokens", "/usage/completion_tokens")
    }

    fn parse_model(&self, entry: &Value) -> Result<ModelListing> {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| LLMError::UnexpectedResponse("Model entry without id".to_string()))?;
        Ok(ModelListing {
            name: id.to_string(),
            model: id.to_string(),
            created: parse_created(entry.get("created")),
            owned_by: entry
                .get("owned_by")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            raw: entry.clone(),
            usage: None,
        })
    }

    fn parse_content_chunk(&self, frame: &Value) -> String {
        str_at(frame, "/choices/0/delta/content").to_string()
    }

    fn parse_thinking_chunk(&self, frame: &Value) -> String {
        reasoning_text(frame.pointer("/choices/0/delta"))
    }

    fn parse_tools_chunk(&self, frame: &Value, state: &mut StreamState) -> Vec<ToolCall> {
        let mut calls = Vec::new();
        for (position, delta) in array_at(frame, "/choices/0/delta/tool_calls")
            .iter()
            .enumerate()
        {
            let index = delta
                .get("index")
                .and_then(Value::as_u64)
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or(position);
            state.tools.start(
                index,
                delta.get("id").and_then(Value::as_str),
                delta.pointer("/function/name").and_then(Value::as_str),
            );
            match delta.pointer("/function/arguments") {
                Some(Value::String(fragment)) => state.tools.push_arguments(index, fragment),
                // some servers send the arguments already decoded
                Some(object @ Value::Object(_)) => {
                    state.tools.set_arguments(index, &object.to_string());
                }
                _ => {}
            }
            calls.extend(state.tools.try_complete(index));
        }

        let finished = frame
            .pointer("/choices/0/finish_reason")
            .is_some_and(|reason| !reason.is_null());
        if finished {
            debug!("Choice finished, releasing open tool calls");
            calls.extend(state.tools.finish_all());
        }
        calls
    }
}

/// `reasoning_content` (DeepSeek) or `reasoning` (Groq, OpenRouter)
fn reasoning_text(message: Option<&Value>) -> String {
    let Some(message) = message else {
        return String::new();
    };
    ["reasoning_content", "reasoning"]
        .iter()
        .find_map(|key| message.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema;
    use crate::{RequestOptions, ToolDefinition};

    fn groq() -> ChatCompletionsAdapter {
        ChatCompletionsAdapter::groq(ChatCompletionsAdapter::groq_config().with_api_key("gsk"))
    }

    fn options() -> RequestOptions {
        RequestOptions::builder("llama-3.3-70b-versatile")
            .max_tokens(256)
            .build()
    }

    #[test]
    fn test_simple_text_message_conversion() {
        let history = vec![Message::system("Be brief."), Message::user("Hello")];
        let body = groq().build_request(&history, &options()).unwrap();

        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!(body.get("stream_options").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_history_roles_on_the_wire() {
        let call = ToolCall::new("call_1", "get_weather", json!({"city": "Oslo"}));
        let history = vec![
            Message::user("Weather?"),
            Message::thinking("Need the tool."),
            Message::tool_call(call),
        ];
        let body = groq().build_request(&history, &options()).unwrap();
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "assistant");
        assert!(messages[2]["content"].is_null());
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"city\":\"Oslo\"}");
    }

    #[test]
    fn test_stream_usage_and_reasoning_flags() {
        let opts = RequestOptions::builder("m").stream(true).think(true).build();

        let body = groq().build_request(&[Message::user("x")], &opts).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["reasoning_effort"], "high");

        let router = ChatCompletionsAdapter::openrouter(ChatCompletionsAdapter::openrouter_config());
        let body = router.build_request(&[Message::user("x")], &opts).unwrap();
        assert_eq!(body["reasoning"]["max_tokens"], 2048);

        let local = ChatCompletionsAdapter::llamafile(ChatCompletionsAdapter::llamafile_config());
        let body = local.build_request(&[Message::user("x")], &opts).unwrap();
        assert!(body.get("stream_options").is_none());
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn test_tools_json_and_extended_fields() {
        let tool = ToolDefinition::new("now", "Current time", schema::object(json!({}), vec![]));
        let opts = RequestOptions::builder("m")
            .tools(vec![tool])
            .json(true)
            .extend("seed", json!(7))
            .build();
        let body = groq().build_request(&[Message::user("x")], &opts).unwrap();

        assert_eq!(body["tools"][0]["function"]["name"], "now");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["seed"], 7);
    }

    #[test]
    fn test_image_attachment_and_document_rejection() {
        let image = Message::user_with_attachments(
            "What is this?",
            vec![Attachment::image("iVBORw0KGgo=", "image/png")],
        );
        let body = groq().build_request(&[image], &options()).unwrap();
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,iVBORw0KGgo=");

        let pdf = Message::user_with_attachments(
            "Summarize",
            vec![Attachment::document("JVBERi0=", "application/pdf")],
        );
        assert!(matches!(
            groq().build_request(&[pdf], &options()),
            Err(LLMError::UnsupportedAttachment(_))
        ));
    }

    #[test]
    fn test_parse_buffered_response() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "It is sunny.",
                    "reasoning_content": "Check the tool output.",
                    "tool_calls": [{
                        "id": "call_7",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Rome\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        });
        let adapter = groq();

        assert_eq!(adapter.parse_content(&body), "It is sunny.");
        assert_eq!(adapter.parse_thinking(&body), "Check the tool output.");
        let calls = adapter.parse_tools(&body);
        assert_eq!(calls[0].id, "call_7");
        assert_eq!(calls[0].input, json!({"city": "Rome"}));
        assert_eq!(adapter.parse_token_usage(&body), Some(TokenUsage::new(12, 5)));
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let adapter = groq();
        let body = json!({"choices": []});
        assert_eq!(adapter.parse_content(&body), "");
        assert_eq!(adapter.parse_thinking(&body), "");
        assert!(adapter.parse_tools(&body).is_empty());
        assert!(adapter.parse_token_usage(&body).is_none());
    }

    #[test]
    fn test_stream_chunks() {
        let adapter = groq();
        let mut state = StreamState::new();
        let frames = [
            json!({"choices": [{"delta": {"role": "assistant", "content": ""}}], "usage": null}),
            json!({"choices": [{"delta": {"reasoning": "hmm"}}]}),
            json!({"choices": [{"delta": {"content": "Hi"}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "get_weather", "arguments": "{\"ci"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "ty\":\"Oslo\"}"}}]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 3, "completion_tokens": 4}}),
        ];

        let content: String = frames.iter().map(|f| adapter.parse_content_chunk(f)).collect();
        let thinking: String = frames.iter().map(|f| adapter.parse_thinking_chunk(f)).collect();
        let calls: Vec<ToolCall> = frames
            .iter()
            .flat_map(|f| adapter.parse_tools_chunk(f, &mut state))
            .collect();
        let usage = frames
            .iter()
            .filter_map(|f| adapter.parse_token_usage_chunk(f, &mut state))
            .last();

        assert_eq!(content, "Hi");
        assert_eq!(thinking, "hmm");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input, json!({"city": "Oslo"}));
        assert_eq!(usage, Some(TokenUsage::new(3, 4)));
    }

    #[test]
    fn test_parse_model_entry() {
        let adapter = groq();
        let listing = json!({"object": "list", "data": [
            {"id": "llama-3.3-70b-versatile", "created": 1_733_447_754, "owned_by": "Meta"},
            {"object": "model"}
        ]});
        let entries = adapter.parse_models(&listing);
        assert_eq!(entries.len(), 2);

        let model = adapter.parse_model(&entries[0]).unwrap();
        assert_eq!(model.model, "llama-3.3-70b-versatile");
        assert_eq!(model.owned_by.as_deref(), Some("Meta"));
        assert!(model.created.is_some());
        assert!(adapter.parse_model(&entries[1]).is_err());
    }
}
