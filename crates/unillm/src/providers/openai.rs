//! OpenAI adapter (Responses API)
//!
//! The conversation is flattened into `input` items and system turns become
//! `instructions`. Tool calls travel as top-level `function_call` items
//! rather than as message fields. Streams are typed SSE events
//! (`response.output_text.delta`, ...) ending with `response.completed`.
//! See: https://platform.openai.com/docs/api-reference/responses

use crate::completion::{RequestOptions, TokenUsage};
use crate::config::{AdapterConfig, AuthStyle};
use crate::provider::{
    ModelListing, ProviderAdapter, StreamState, array_at, merge_extended, parse_created, str_at,
    system_prompt, usage_at,
};
use crate::tools::ToolStyle;
use crate::{Attachment, LLMError, Message, MessageContent, Result, Role, ToolCall};
use serde_json::{Value, json};
use tracing::warn;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Stream events after which nothing more arrives
const TERMINAL_EVENTS: [&str; 3] = [
    "response.completed",
    "response.incomplete",
    "response.failed",
];

/// OpenAI Responses API adapter
#[derive(Debug, Clone)]
pub struct OpenAIAdapter {
    config: AdapterConfig,
}

impl OpenAIAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn default_config() -> AdapterConfig {
        AdapterConfig::new("openai", OPENAI_API_BASE, AuthStyle::Bearer)
    }

    fn convert_message(&self, message: &Message) -> Result<Value> {
        let role = message.role.wire_role();
        Ok(match &message.content {
            MessageContent::Text(text) => json!({"role": role, "content": text}),
            MessageContent::Parts { text, attachments } => {
                let mut parts = Vec::with_capacity(attachments.len() + 1);
                if !text.is_empty() {
                    parts.push(json!({"type": "input_text", "text": text}));
                }
                for attachment in attachments {
                    parts.push(self.attachment_to_content(attachment)?);
                }
                json!({"role": role, "content": parts})
            }
            MessageContent::ToolCall(call) => json!({
                "type": "function_call",
                "call_id": call.id,
                "name": call.name,
                "arguments": call.input.to_string(),
            }),
        })
    }
}

/// Map a token budget onto the coarse effort levels the API accepts
fn reasoning_effort(options: &RequestOptions) -> &'static str {
    match options.max_thinking_tokens {
        None => "medium",
        Some(budget) if budget <= 2048 => "low",
        Some(budget) if budget <= 8192 => "medium",
        Some(_) => "high",
    }
}

fn output_index(frame: &Value) -> usize {
    frame
        .get("output_index")
        .and_then(Value::as_u64)
        .and_then(|i| usize::try_from(i).ok())
        .unwrap_or_default()
}

impl ProviderAdapter for OpenAIAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }

    fn chat_url(&self, _options: &RequestOptions) -> String {
        format!("{}/responses", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url)
    }

    fn build_request(&self, history: &[Message], options: &RequestOptions) -> Result<Value> {
        let input = history
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| self.convert_message(message))
            .collect::<Result<Vec<_>>>()?;

        let mut body = json!({
            "model": options.model,
            "input": input,
            "max_output_tokens": options.max_tokens,
            "stream": options.stream,
        });

        if let Some(instructions) = system_prompt(history) {
            body["instructions"] = json!(instructions);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(tools) = options.tools.as_ref().filter(|tools| !tools.is_empty()) {
            body["tools"] = tools
                .iter()
                .map(|tool| tool.wrap(ToolStyle::FlatFunction))
                .collect();
        }
        if options.think {
            body["reasoning"] = json!({
                "effort": reasoning_effort(options),
                "summary": "auto",
            });
        }
        if options.json {
            body["text"] = json!({"format": {"type": "json_object"}});
        }

        merge_extended(&mut body, options);
        Ok(body)
    }

    fn attachment_to_content(&self, attachment: &Attachment) -> Result<Value> {
        Ok(match (attachment.is_image(), attachment.is_url()) {
            (true, _) => json!({"type": "input_image", "image_url": attachment.data_url()}),
            (false, true) => json!({"type": "input_file", "file_url": attachment.data}),
            (false, false) => json!({
                "type": "input_file",
                "filename": "attachment",
                "file_data": attachment.data_url(),
            }),
        })
    }

    fn parse_content(&self, body: &Value) -> String {
        // a background or in-progress response has no final output yet
        if let Some(status) = body.get("status").and_then(Value::as_str) {
            if status != "completed" && status != "incomplete" {
                warn!(status, "Response not completed, no content parsed");
                return String::new();
            }
        }
        array_at(body, "/output")
            .iter()
            .filter(|item| item["type"] == "message")
            .flat_map(|item| array_at(item, "/content"))
            .filter(|part| part["type"] == "output_text")
            .map(|part| str_at(part, "/text"))
            .collect()
    }

    fn parse_thinking(&self, body: &Value) -> String {
        array_at(body, "/output")
            .iter()
            .filter(|item| item["type"] == "reasoning")
            .flat_map(|item| array_at(item, "/summary"))
            .map(|part| str_at(part, "/text"))
            .collect()
    }

    fn parse_tools(&self, body: &Value) -> Vec<ToolCall> {
        array_at(body, "/output")
            .iter()
            .filter(|item| item["type"] == "function_call")
            .filter_map(ToolCall::from_function_call)
            .collect()
    }

    fn parse_token_usage(&self, body: &Value) -> Option<TokenUsage> {
        usage_at(body, "/usage/input_tokens", "/usage/output_tokens")
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
        if frame["type"] == "response.output_text.delta" {
            return str_at(frame, "/delta").to_string();
        }
        String::new()
    }

    fn parse_thinking_chunk(&self, frame: &Value) -> String {
        if frame["type"] == "response.reasoning_summary_text.delta" {
            return str_at(frame, "/delta").to_string();
        }
        String::new()
    }

    fn parse_token_usage_chunk(&self, frame: &Value, _state: &mut StreamState) -> Option<TokenUsage> {
        let kind = frame.get("type").and_then(Value::as_str)?;
        if !TERMINAL_EVENTS.contains(&kind) {
            return None;
        }
        usage_at(
            frame,
            "/response/usage/input_tokens",
            "/response/usage/output_tokens",
        )
    }

    fn parse_tools_chunk(&self, frame: &Value, state: &mut StreamState) -> Vec<ToolCall> {
        let index = output_index(frame);
        match frame.get("type").and_then(Value::as_str) {
            Some("response.output_item.added") if frame["item"]["type"] == "function_call" => {
                state.tools.start(
                    index,
                    frame.pointer("/item/call_id").and_then(Value::as_str),
                    frame.pointer("/item/name").and_then(Value::as_str),
                );
                Vec::new()
            }
            Some("response.function_call_arguments.delta") => {
                state.tools.push_arguments(index, str_at(frame, "/delta"));
                state.tools.try_complete(index).into_iter().collect()
            }
            Some("response.output_item.done") if frame["item"]["type"] == "function_call" => {
                let item = &frame["item"];
                state.tools.start(
                    index,
                    item.get("call_id").and_then(Value::as_str),
                    item.get("name").and_then(Value::as_str),
                );
                if let Some(arguments) = item.get("arguments").and_then(Value::as_str) {
                    state.tools.set_arguments(index, arguments);
                }
                state.tools.finish(index).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    fn is_terminal_frame(&self, frame: &Value) -> bool {
        frame
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| TERMINAL_EVENTS.contains(&kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema;
    use crate::ToolDefinition;

    fn adapter() -> OpenAIAdapter {
        OpenAIAdapter::new(OpenAIAdapter::default_config().with_api_key("sk-test"))
    }

    fn completed_body() -> Value {
        json!({
            "id": "resp_1",
            "status": "completed",
            "output": [
                {"type": "reasoning", "summary": [{"type": "summary_text", "text": "Think first."}]},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "Hello "},
                    {"type": "output_text", "text": "there"}
                ]},
                {"type": "function_call", "call_id": "call_9", "name": "get_weather",
                 "arguments": "{\"city\":\"Lima\"}"}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 8, "total_tokens": 28}
        })
    }

    #[test]
    fn test_request_flattens_history_into_input() {
        let call = ToolCall::new("call_1", "lookup", json!({"q": "rust"}));
        let history = vec![
            Message::system("Be brief."),
            Message::user("Search"),
            Message::tool_call(call),
        ];
        let opts = RequestOptions::builder("gpt-4.1").max_tokens(300).build();
        let body = adapter().build_request(&history, &opts).unwrap();

        assert_eq!(body["max_output_tokens"], 300);
        assert_eq!(body["instructions"], "Be brief.");
        assert_eq!(body["input"][0]["content"], "Search");
        assert_eq!(body["input"][1]["type"], "function_call");
        assert_eq!(body["input"][1]["call_id"], "call_1");
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn test_request_options() {
        let tool = ToolDefinition::new("lookup", "Search", schema::object(json!({}), vec![]));
        let opts = RequestOptions::builder("o4-mini")
            .think(true)
            .max_thinking_tokens(16_000)
            .json(true)
            .tools(vec![tool])
            .build();
        let body = adapter().build_request(&[Message::user("x")], &opts).unwrap();

        assert_eq!(body["reasoning"]["effort"], "high");
        assert_eq!(body["text"]["format"]["type"], "json_object");
        assert_eq!(body["tools"][0]["name"], "lookup");
        assert!(body["tools"][0].get("function").is_none());
    }

    #[test]
    fn test_attachments() {
        let adapter = adapter();
        let image = adapter
            .attachment_to_content(&Attachment::image_url("https://example.com/a.png"))
            .unwrap();
        assert_eq!(image["image_url"], "https://example.com/a.png");

        let pdf = adapter
            .attachment_to_content(&Attachment::document("JVBERi0=", "application/pdf"))
            .unwrap();
        assert_eq!(pdf["type"], "input_file");
        assert_eq!(pdf["file_data"], "data:application/pdf;base64,JVBERi0=");
    }

    #[test]
    fn test_parse_completed_response() {
        let adapter = adapter();
        let body = completed_body();
        assert_eq!(adapter.parse_content(&body), "Hello there");
        assert_eq!(adapter.parse_thinking(&body), "Think first.");
        let calls = adapter.parse_tools(&body);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].input, json!({"city": "Lima"}));
        assert_eq!(adapter.parse_token_usage(&body), Some(TokenUsage::new(20, 8)));
    }

    #[test]
    fn test_pending_response_has_no_content() {
        let mut body = completed_body();
        body["status"] = json!("in_progress");
        assert_eq!(adapter().parse_content(&body), "");
    }

    #[test]
    fn test_stream_events() {
        let adapter = adapter();
        let mut state = StreamState::new();
        let frames = [
            json!({"type": "response.created", "response": {"status": "in_progress"}}),
            json!({"type": "response.reasoning_summary_text.delta", "delta": "Think "}),
            json!({"type": "response.reasoning_summary_text.delta", "delta": "first."}),
            json!({"type": "response.output_text.delta", "output_index": 1, "delta": "Hello "}),
            json!({"type": "response.output_text.delta", "output_index": 1, "delta": "there"}),
            json!({"type": "response.output_item.added", "output_index": 2,
                   "item": {"type": "function_call", "call_id": "call_9", "name": "get_weather", "arguments": ""}}),
            json!({"type": "response.function_call_arguments.delta", "output_index": 2, "delta": "{\"city\":"}),
            json!({"type": "response.function_call_arguments.delta", "output_index": 2, "delta": "\"Lima\"}"}),
            json!({"type": "response.output_item.done", "output_index": 2,
                   "item": {"type": "function_call", "call_id": "call_9", "name": "get_weather", "arguments": "{\"city\":\"Lima\"}"}}),
            json!({"type": "response.completed", "response": completed_body()}),
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

        let body = completed_body();
        assert_eq!(content, adapter.parse_content(&body));
        assert_eq!(thinking, adapter.parse_thinking(&body));
        assert_eq!(calls, adapter.parse_tools(&body));
        assert_eq!(usage, adapter.parse_token_usage(&body));
        assert!(adapter.is_terminal_frame(&frames[9]));
        assert!(!adapter.is_terminal_frame(&frames[3]));
    }

    #[test]
    fn test_tool_call_closed_without_deltas() {
        let adapter = adapter();
        let mut state = StreamState::new();
        let done = json!({"type": "response.output_item.done", "output_index": 0,
            "item": {"type": "function_call", "call_id": "call_2", "name": "now", "arguments": "{}"}});
        let calls = adapter.parse_tools_chunk(&done, &mut state);
        assert_eq!(calls, vec![ToolCall::new("call_2", "now", json!({}))]);
    }
}
