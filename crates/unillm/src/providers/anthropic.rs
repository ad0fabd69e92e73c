//! Anthropic Claude adapter
//!
//! System turns are lifted into the top-level `system` field. Streams are
//! typed SSE events; usage is split across `message_start` (input) and
//! `message_delta` (output), and tool arguments arrive as partial JSON.
//! See: https://docs.anthropic.com/en/api/messages

use crate::completion::{RequestOptions, TokenUsage};
use crate::config::{AdapterConfig, AuthStyle};
use crate::provider::{
    ModelListing, ProviderAdapter, StreamState, array_at, merge_extended, parse_created, str_at,
    system_prompt, u64_at, usage_at,
};
use crate::tools::ToolStyle;
use crate::{Attachment, LLMError, Message, MessageContent, Result, Role, ToolCall};
use serde_json::{Value, json};
use tracing::debug;

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const MIN_THINKING_BUDGET: u32 = 1024;

/// Anthropic Claude adapter
///
/// Supports all Claude models including:
/// - claude-opus-4-1
/// - claude-sonnet-4-5
/// - claude-3-7-sonnet-latest
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    config: AdapterConfig,
}

impl AnthropicAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn default_config() -> AdapterConfig {
        AdapterConfig::new(
            "anthropic",
            ANTHROPIC_API_BASE,
            AuthStyle::Header("x-api-key".to_string()),
        )
        .with_header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn convert_message(&self, message: &Message) -> Result<Value> {
        let role = message.role.wire_role();
        Ok(match &message.content {
            MessageContent::Text(text) => json!({"role": role, "content": text}),
            MessageContent::Parts { text, attachments } => {
                let mut blocks = Vec::with_capacity(attachments.len() + 1);
                for attachment in attachments {
                    blocks.push(self.attachment_to_content(attachment)?);
                }
                if !text.is_empty() {
                    blocks.push(json!({"type": "text", "text": text}));
                }
                json!({"role": role, "content": blocks})
            }
            MessageContent::ToolCall(call) => {
                json!({"role": role, "content": [call.to_tool_use()]})
            }
        })
    }
}

fn block_index(frame: &Value) -> usize {
    frame
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|i| usize::try_from(i).ok())
        .unwrap_or_default()
}

fn frame_type(frame: &Value) -> &str {
    str_at(frame, "/type")
}

impl ProviderAdapter for AnthropicAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }

    fn chat_url(&self, _options: &RequestOptions) -> String {
        format!("{}/messages", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url)
    }

    fn build_request(&self, history: &[Message], options: &RequestOptions) -> Result<Value> {
        let messages = history
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| self.convert_message(message))
            .collect::<Result<Vec<_>>>()?;

        let mut max_tokens = options.max_tokens;
        let mut body = json!({
            "model": options.model,
            "messages": messages,
            "stream": options.stream,
        });

        if let Some(system) = system_prompt(history) {
            body["system"] = json!(system);
        }
        if options.think {
            // the budget must stay below max_tokens
            let budget = options.thinking_budget().max(MIN_THINKING_BUDGET);
            if max_tokens <= budget {
                max_tokens = max_tokens.saturating_add(budget);
            }
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        } else if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        body["max_tokens"] = json!(max_tokens);

        if let Some(tools) = options.tools.as_ref().filter(|tools| !tools.is_empty()) {
            body["tools"] = tools
                .iter()
                .map(|tool| tool.wrap(ToolStyle::NativeToolUse))
                .collect();
        }

        merge_extended(&mut body, options);
        Ok(body)
    }

    fn attachment_to_content(&self, attachment: &Attachment) -> Result<Value> {
        let block_type = if attachment.is_image() { "image" } else { "document" };
        if attachment.is_url() {
            return Ok(json!({
                "type": block_type,
                "source": {"type": "url", "url": attachment.data},
            }));
        }
        if attachment.is_document() && attachment.content_type != "application/pdf" {
            return Err(LLMError::UnsupportedAttachment(format!(
                "anthropic accepts inline PDF documents only, got {}",
                attachment.content_type
            )));
        }
        Ok(json!({
            "type": block_type,
            "source": {
                "type": "base64",
                "media_type": attachment.content_type,
                "data": attachment.data,
            },
        }))
    }

    fn parse_content(&self, body: &Value) -> String {
        array_at(body, "/content")
            .iter()
            .filter(|block| block["type"] == "text")
            .map(|block| str_at(block, "/text"))
            .collect()
    }

    fn parse_thinking(&self, body: &Value) -> String {
        array_at(body, "/content")
            .iter()
            .filter(|block| block["type"] == "thinking")
            .map(|block| str_at(block, "/thinking"))
            .collect()
    }

    fn parse_tools(&self, body: &Value) -> Vec<ToolCall> {
        array_at(body, "/content")
            .iter()
            .filter(|block| block["type"] == "tool_use")
            .filter_map(ToolCall::from_tool_use)
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
        let name = entry
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or(id);
        Ok(ModelListing {
            name: name.to_string(),
            model: id.to_string(),
            created: parse_created(entry.get("created_at")),
            owned_by: Some("anthropic".to_string()),
            raw: entry.clone(),
            usage: None,
        })
    }

    fn parse_content_chunk(&self, frame: &Value) -> String {
        if frame_type(frame) == "content_block_delta" && frame["delta"]["type"] == "text_delta" {
            return str_at(frame, "/delta/text").to_string();
        }
        String::new()
    }

    fn parse_thinking_chunk(&self, frame: &Value) -> String {
        if frame_type(frame) == "content_block_delta" && frame["delta"]["type"] == "thinking_delta" {
            return str_at(frame, "/delta/thinking").to_string();
        }
        String::new()
    }

    fn parse_token_usage_chunk(&self, frame: &Value, state: &mut StreamState) -> Option<TokenUsage> {
        match frame_type(frame) {
            "message_start" => {
                state.input_tokens = u64_at(frame, "/message/usage/input_tokens");
                state.output_tokens = u64_at(frame, "/message/usage/output_tokens");
                None
            }
            "message_delta" => {
                let input = u64_at(frame, "/usage/input_tokens").or(state.input_tokens);
                let output = u64_at(frame, "/usage/output_tokens").or(state.output_tokens);
                if input.is_none() && output.is_none() {
                    return None;
                }
                Some(TokenUsage::new(input.unwrap_or(0), output.unwrap_or(0)))
            }
            _ => None,
        }
    }

    fn parse_tools_chunk(&self, frame: &Value, state: &mut StreamState) -> Vec<ToolCall> {
        let index = block_index(frame);
        match frame_type(frame) {
            "content_block_start" if frame["content_block"]["type"] == "tool_use" => {
                debug!(index, "Tool use block opened");
                state.tools.start(
                    index,
                    frame.pointer("/content_block/id").and_then(Value::as_str),
                    frame.pointer("/content_block/name").and_then(Value::as_str),
                );
                Vec::new()
            }
            "content_block_delta" if frame["delta"]["type"] == "input_json_delta" => {
                state
                    .tools
                    .push_arguments(index, str_at(frame, "/delta/partial_json"));
                state.tools.try_complete(index).into_iter().collect()
            }
            "content_block_stop" => state.tools.finish(index).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn is_terminal_frame(&self, frame: &Value) -> bool {
        frame_type(frame) == "message_stop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema;
    use crate::ToolDefinition;

    fn adapter() -> AnthropicAdapter {
        AnthropicAdapter::new(AnthropicAdapter::default_config().with_api_key("sk-ant"))
    }

    fn buffered_body() -> Value {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "The user wants weather.", "signature": "sig"},
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Oslo"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 30, "output_tokens": 12}
        })
    }

    #[test]
    fn test_headers() {
        let headers = adapter().headers();
        assert!(headers.contains(&("x-api-key".to_string(), "sk-ant".to_string())));
        assert!(headers.contains(&("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string())));
    }

    #[test]
    fn test_system_lifted_out_of_messages() {
        let history = vec![
            Message::system("Be brief."),
            Message::user("Hello"),
            Message::assistant("Hi"),
        ];
        let opts = RequestOptions::builder("claude-sonnet-4-5").temperature(0.3).build();
        let body = adapter().build_request(&history, &opts).unwrap();

        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 0.3_f32);
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_thinking_budget_below_max_tokens() {
        let opts = RequestOptions::builder("claude-sonnet-4-5")
            .max_tokens(1000)
            .think(true)
            .temperature(0.5)
            .build();
        let body = adapter().build_request(&[Message::user("x")], &opts).unwrap();

        assert_eq!(body["thinking"]["budget_tokens"], 1024);
        assert_eq!(body["max_tokens"], 2024);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_tool_history_and_tools() {
        let call = ToolCall::new("toolu_1", "get_weather", json!({"city": "Oslo"}));
        let tool = ToolDefinition::new(
            "get_weather",
            "Weather",
            schema::object(json!({"city": schema::string("City")}), vec!["city"]),
        );
        let opts = RequestOptions::builder("m").tools(vec![tool]).build();
        let history = vec![Message::user("Weather?"), Message::tool_call(call)];
        let body = adapter().build_request(&history, &opts).unwrap();

        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert!(body["tools"][0].get("input_schema").is_some());
    }

    #[test]
    fn test_attachments() {
        let adapter = adapter();
        let image = adapter
            .attachment_to_content(&Attachment::image("abc", "image/jpeg"))
            .unwrap();
        assert_eq!(image["source"]["media_type"], "image/jpeg");

        let url = adapter
            .attachment_to_content(&Attachment::document_url("https://example.com/a.pdf"))
            .unwrap();
        assert_eq!(url["type"], "document");
        assert_eq!(url["source"]["type"], "url");

        assert!(matches!(
            adapter.attachment_to_content(&Attachment::document("eA==", "text/csv")),
            Err(LLMError::UnsupportedAttachment(_))
        ));
    }

    #[test]
    fn test_parse_buffered() {
        let adapter = adapter();
        let body = buffered_body();
        assert_eq!(adapter.parse_content(&body), "Let me check.");
        assert_eq!(adapter.parse_thinking(&body), "The user wants weather.");
        assert_eq!(
            adapter.parse_tools(&body),
            vec![ToolCall::new("toolu_1", "get_weather", json!({"city": "Oslo"}))]
        );
        assert_eq!(adapter.parse_token_usage(&body), Some(TokenUsage::new(30, 12)));
    }

    #[test]
    fn test_stream_matches_buffered() {
        let adapter = adapter();
        let mut state = StreamState::new();
        let frames = [
            json!({"type": "message_start", "message": {"usage": {"input_tokens": 30, "output_tokens": 1}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "The user "}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "wants weather."}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "Let me check."}}),
            json!({"type": "content_block_stop", "index": 1}),
            json!({"type": "content_block_start", "index": 2, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}}}),
            json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": ""}}),
            json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "{\"city\": \"Os"}}),
            json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "lo\"}"}}),
            json!({"type": "content_block_stop", "index": 2}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 12}}),
            json!({"type": "message_stop"}),
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

        let body = buffered_body();
        assert_eq!(content, adapter.parse_content(&body));
        assert_eq!(thinking, adapter.parse_thinking(&body));
        assert_eq!(calls, adapter.parse_tools(&body));
        assert_eq!(usage, adapter.parse_token_usage(&body));
        assert!(adapter.is_terminal_frame(&frames[14]));
    }

    #[test]
    fn test_tool_without_arguments_closes_with_empty_input() {
        let adapter = adapter();
        let mut state = StreamState::new();
        let start = json!({"type": "content_block_start", "index": 0,
            "content_block": {"type": "tool_use", "id": "toolu_2", "name": "now", "input": {}}});
        assert!(adapter.parse_tools_chunk(&start, &mut state).is_empty());
        let stop = json!({"type": "content_block_stop", "index": 0});
        let calls = adapter.parse_tools_chunk(&stop, &mut state);
        assert_eq!(calls[0].input, json!({}));
    }

    #[test]
    fn test_parse_model_entry() {
        let entry = json!({
            "type": "model",
            "id": "claude-sonnet-4-5-20250929",
            "display_name": "Claude Sonnet 4.5",
            "created_at": "2025-09-29T00:00:00Z"
        });
        let model = adapter().parse_model(&entry).unwrap();
        assert_eq!(model.name, "Claude Sonnet 4.5");
        assert_eq!(model.model, "claude-sonnet-4-5-20250929");
        assert!(model.created.is_some());
    }
}
