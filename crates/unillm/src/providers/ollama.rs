//! Ollama adapter (local, newline-delimited JSON)
//!
//! Streamed lines have the same shape as the buffered reply; the last one
//! carries `"done": true` together with the token counters.

use crate::completion::{RequestOptions, TokenUsage};
use crate::config::{AdapterConfig, AuthStyle};
use crate::provider::{
    ModelListing, ProviderAdapter, array_at, merge_extended, parse_created, str_at, usage_at,
};
use crate::tools::ToolStyle;
use crate::{Attachment, LLMError, Message, MessageContent, Result, ToolCall};
use serde_json::{Value, json};

pub const OLLAMA_API_BASE: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    config: AdapterConfig,
}

impl OllamaAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn default_config() -> AdapterConfig {
        AdapterConfig::new("ollama", OLLAMA_API_BASE, AuthStyle::None).local(true)
    }

    fn convert_message(&self, message: &Message) -> Result<Value> {
        let role = message.role.wire_role();
        Ok(match &message.content {
            MessageContent::Text(text) => json!({"role": role, "content": text}),
            MessageContent::Parts { text, attachments } => {
                let images = attachments
                    .iter()
                    .map(|attachment| self.attachment_to_content(attachment))
                    .collect::<Result<Vec<_>>>()?;
                json!({"role": role, "content": text, "images": images})
            }
            MessageContent::ToolCall(call) => json!({
                "role": role,
                "content": "",
                "tool_calls": [{"function": {"name": call.name, "arguments": call.input}}],
            }),
        })
    }
}

impl ProviderAdapter for OllamaAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }

    fn chat_url(&self, _options: &RequestOptions) -> String {
        format!("{}/api/chat", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/api/tags", self.config.base_url)
    }

    fn build_request(&self, history: &[Message], options: &RequestOptions) -> Result<Value> {
        let messages = history
            .iter()
            .map(|message| self.convert_message(message))
            .collect::<Result<Vec<_>>>()?;

        let mut model_options = json!({"num_predict": options.max_tokens});
        if let Some(temperature) = options.temperature {
            model_options["temperature"] = json!(temperature);
        }

        let mut body = json!({
            "model": options.model,
            "messages": messages,
            "stream": options.stream,
            "options": model_options,
        });
        if options.think {
            body["think"] = json!(true);
        }
        if options.json {
            body["format"] = json!("json");
        }
        if let Some(tools) = options.tools.as_ref().filter(|tools| !tools.is_empty()) {
            body["tools"] = tools
                .iter()
                .map(|tool| tool.wrap(ToolStyle::Functions))
                .collect();
        }

        merge_extended(&mut body, options);
        Ok(body)
    }

    fn attachment_to_content(&self, attachment: &Attachment) -> Result<Value> {
        if attachment.is_image() && !attachment.is_url() {
            return Ok(Value::String(attachment.data.clone()));
        }
        Err(LLMError::UnsupportedAttachment(
            "ollama accepts inline images only".to_string(),
        ))
    }

    fn parse_content(&self, body: &Value) -> String {
        str_at(body, "/message/content").to_string()
    }

    fn parse_thinking(&self, body: &Value) -> String {
        str_at(body, "/message/thinking").to_string()
    }

    fn parse_tools(&self, body: &Value) -> Vec<ToolCall> {
        array_at(body, "/message/tool_calls")
            .iter()
            .filter_map(ToolCall::from_function_call)
            .collect()
    }

    fn parse_token_usage(&self, body: &Value) -> Option<TokenUsage> {
        usage_at(body, "/prompt_eval_count", "/eval_count")
    }

    fn parse_models(&self, body: &Value) -> Vec<Value> {
        array_at(body, "/models").to_vec()
    }

    fn parse_model(&self, entry: &Value) -> Result<ModelListing> {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| LLMError::UnexpectedResponse("Model entry without name".to_string()))?;
        let model = entry.get("model").and_then(Value::as_str).unwrap_or(name);
        Ok(ModelListing {
            name: name.to_string(),
            model: model.to_string(),
            created: parse_created(entry.get("modified_at")),
            owned_by: None,
            raw: entry.clone(),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StreamState;

    fn adapter() -> OllamaAdapter {
        OllamaAdapter::new(OllamaAdapter::default_config())
    }

    #[test]
    fn test_local_without_key() {
        let adapter = adapter();
        assert!(adapter.is_local());
        assert!(adapter.config().validate().is_ok());
        assert!(adapter.headers().is_empty());
        assert_eq!(adapter.models_url(), "http://localhost:11434/api/tags");
    }

    #[test]
    fn test_request_shape() {
        let history = vec![
            Message::user_with_attachments("What is it?", vec![Attachment::image("iVBOR", "image/png")]),
            Message::tool_call(ToolCall::new("call_1", "lookup", json!({"q": "cat"}))),
        ];
        let opts = RequestOptions::builder("llama3.1")
            .max_tokens(64)
            .think(true)
            .json(true)
            .build();
        let body = adapter().build_request(&history, &opts).unwrap();

        assert_eq!(body["options"]["num_predict"], 64);
        assert_eq!(body["messages"][0]["images"][0], "iVBOR");
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["arguments"]["q"], "cat");
        assert_eq!(body["think"], true);
        assert_eq!(body["format"], "json");
    }

    #[test]
    fn test_document_rejected() {
        let message = Message::user_with_attachments("x", vec![Attachment::document("eA==", "application/pdf")]);
        let opts = RequestOptions::builder("llama3.1").build();
        assert!(matches!(
            adapter().build_request(&[message], &opts),
            Err(LLMError::UnsupportedAttachment(_))
        ));
    }

    #[test]
    fn test_ndjson_stream_and_buffered_agree() {
        let adapter = adapter();
        let mut state = StreamState::new();
        let frames = [
            json!({"model": "qwen3", "message": {"role": "assistant", "content": "", "thinking": "Hmm"}, "done": false}),
            json!({"model": "qwen3", "message": {"role": "assistant", "content": "Hi"}, "done": false}),
            json!({"model": "qwen3", "message": {"role": "assistant", "content": " there"}, "done": false}),
            json!({"model": "qwen3", "message": {"role": "assistant", "content": ""}, "done": true,
                   "prompt_eval_count": 11, "eval_count": 6}),
        ];
        let buffered = json!({
            "message": {"role": "assistant", "content": "Hi there", "thinking": "Hmm"},
            "done": true, "prompt_eval_count": 11, "eval_count": 6
        });

        let content: String = frames.iter().map(|f| adapter.parse_content_chunk(f)).collect();
        let thinking: String = frames.iter().map(|f| adapter.parse_thinking_chunk(f)).collect();
        let usage = frames
            .iter()
            .filter_map(|f| adapter.parse_token_usage_chunk(f, &mut state))
            .last();

        assert_eq!(content, adapter.parse_content(&buffered));
        assert_eq!(thinking, adapter.parse_thinking(&buffered));
        assert_eq!(usage, adapter.parse_token_usage(&buffered));
        assert!(adapter.is_terminal_frame(&frames[3]));
        assert!(!adapter.is_terminal_frame(&frames[0]));
    }

    #[test]
    fn test_tool_calls_without_ids() {
        let body = json!({"message": {"role": "assistant", "content": "", "tool_calls": [
            {"function": {"name": "get_weather", "arguments": {"city": "Paris"}}}
        ]}, "done": true});
        let calls = adapter().parse_tools(&body);
        assert_eq!(calls[0].input, json!({"city": "Paris"}));
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_parse_tags() {
        let listing = json!({"models": [{
            "name": "qwen3:latest",
            "model": "qwen3:latest",
            "modified_at": "2025-05-01T10:00:00.000000-07:00",
            "size": 5_200_000_000_u64
        }]});
        let adapter = adapter();
        let model = adapter.parse_model(&adapter.parse_models(&listing)[0]).unwrap();
        assert_eq!(model.model, "qwen3:latest");
        assert!(model.created.is_some());
    }
}
