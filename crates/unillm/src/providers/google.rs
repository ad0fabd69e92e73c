//! Google Gemini adapter
//!
//! The model is part of the URL, not the body. Every streamed SSE frame is a
//! complete `GenerateContentResponse` fragment, so the chunk parsers are the
//! buffered ones. Gemini sends no id with function calls; synthetic ids are
//! assigned on parse.

use crate::completion::{RequestOptions, TokenUsage};
use crate::config::{AdapterConfig, AuthStyle};
use crate::provider::{
    ModelListing, ProviderAdapter, array_at, merge_extended, str_at, system_prompt, u64_at,
};
use crate::tools::ToolStyle;
use crate::{Attachment, LLMError, Message, MessageContent, Result, Role, ToolCall};
use serde_json::{Value, json};

pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    config: AdapterConfig,
}

impl GoogleAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn default_config() -> AdapterConfig {
        AdapterConfig::new(
            "google",
            GOOGLE_API_BASE,
            AuthStyle::Header("x-goog-api-key".to_string()),
        )
    }

    fn convert_message(&self, message: &Message, role: &str) -> Result<Value> {
        let parts = match &message.content {
            MessageContent::Text(text) => vec![json!({"text": text})],
            MessageContent::Parts { text, attachments } => {
                let mut parts = Vec::with_capacity(attachments.len() + 1);
                if !text.is_empty() {
                    parts.push(json!({"text": text}));
                }
                for attachment in attachments {
                    parts.push(self.attachment_to_content(attachment)?);
                }
                parts
            }
            MessageContent::ToolCall(call) => vec![json!({
                "functionCall": {"name": call.name, "args": call.input},
            })],
        };
        Ok(json!({"role": role, "parts": parts}))
    }
}

/// Role of a turn in `contents`; system turns go to `systemInstruction` instead
fn content_role(role: Role) -> Option<&'static str> {
    match role {
        Role::System => None,
        Role::User => Some("user"),
        Role::Assistant | Role::Thinking | Role::ToolCall => Some("model"),
    }
}

/// Parts of the first candidate
fn parts(body: &Value) -> &[Value] {
    array_at(body, "/candidates/0/content/parts")
}

fn is_thought(part: &Value) -> bool {
    part.get("thought").and_then(Value::as_bool) == Some(true)
}

impl ProviderAdapter for GoogleAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }

    fn chat_url(&self, options: &RequestOptions) -> String {
        if options.stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.config.base_url, options.model
            )
        } else {
            format!(
                "{}/models/{}:generateContent",
                self.config.base_url, options.model
            )
        }
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url)
    }

    fn build_request(&self, history: &[Message], options: &RequestOptions) -> Result<Value> {
        let contents = history
            .iter()
            .filter_map(|message| {
                content_role(message.role).map(|role| self.convert_message(message, role))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut generation = json!({"maxOutputTokens": options.max_tokens});
        if let Some(temperature) = options.temperature {
            generation["temperature"] = json!(temperature);
        }
        if options.json {
            generation["responseMimeType"] = json!("application/json");
        }
        if options.think {
            generation["thinkingConfig"] = json!({
                "includeThoughts": true,
                "thinkingBudget": options.thinking_budget(),
            });
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation,
        });
        if let Some(system) = system_prompt(history) {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if let Some(tools) = options.tools.as_ref().filter(|tools| !tools.is_empty()) {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|tool| tool.wrap(ToolStyle::FunctionDeclaration))
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }

        merge_extended(&mut body, options);
        Ok(body)
    }

    fn attachment_to_content(&self, attachment: &Attachment) -> Result<Value> {
        if attachment.is_url() {
            return Err(LLMError::UnsupportedAttachment(
                "google accepts inline attachment data only".to_string(),
            ));
        }
        Ok(json!({
            "inlineData": {
                "mimeType": attachment.content_type,
                "data": attachment.data,
            },
        }))
    }

    fn parse_content(&self, body: &Value) -> String {
        parts(body)
            .iter()
            .filter(|part| !is_thought(part))
            .map(|part| str_at(part, "/text"))
            .collect()
    }

    fn parse_thinking(&self, body: &Value) -> String {
        parts(body)
            .iter()
            .filter(|part| is_thought(part))
            .map(|part| str_at(part, "/text"))
            .collect()
    }

    fn parse_tools(&self, body: &Value) -> Vec<ToolCall> {
        parts(body)
            .iter()
            .filter_map(|part| part.get("functionCall"))
            .filter_map(ToolCall::from_function_call)
            .collect()
    }

    fn parse_token_usage(&self, body: &Value) -> Option<TokenUsage> {
        let input = u64_at(body, "/usageMetadata/promptTokenCount");
        let candidates = u64_at(body, "/usageMetadata/candidatesTokenCount");
        let thoughts = u64_at(body, "/usageMetadata/thoughtsTokenCount");
        if input.is_none() && candidates.is_none() {
            return None;
        }
        Some(TokenUsage::new(
            input.unwrap_or(0),
            candidates.unwrap_or(0) + thoughts.unwrap_or(0),
        ))
    }

    fn parse_models(&self, body: &Value) -> Vec<Value> {
        array_at(body, "/models").to_vec()
    }

    fn parse_model(&self, entry: &Value) -> Result<ModelListing> {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| LLMError::UnexpectedResponse("Model entry without name".to_string()))?;
        let model = name.strip_prefix("models/").unwrap_or(name);
        let display = entry
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or(model);
        Ok(ModelListing {
            name: display.to_string(),
            model: model.to_string(),
            created: None,
            owned_by: Some("google".to_string()),
            raw: entry.clone(),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StreamState;
    use crate::tools::schema;
    use crate::ToolDefinition;

    fn adapter() -> GoogleAdapter {
        GoogleAdapter::new(GoogleAdapter::default_config().with_api_key("AIza"))
    }

    #[test]
    fn test_urls_carry_model() {
        let adapter = adapter();
        let buffered = RequestOptions::builder("gemini-2.5-pro").build();
        let streamed = RequestOptions::builder("gemini-2.5-pro").stream(true).build();
        assert_eq!(
            adapter.chat_url(&buffered),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert!(
            adapter
                .chat_url(&streamed)
                .ends_with("gemini-2.5-pro:streamGenerateContent?alt=sse")
        );
        assert_eq!(adapter.headers()[0].0, "x-goog-api-key");
    }

    #[test]
    fn test_request_shape() {
        let call = ToolCall::new("call_1", "lookup", json!({"q": "x"}));
        let tool = ToolDefinition::new("lookup", "Search", schema::object(json!({}), vec![]));
        let history = vec![
            Message::system("Be brief."),
            Message::user("Hi"),
            Message::assistant("Hello"),
            Message::tool_call(call),
        ];
        let opts = RequestOptions::builder("gemini-2.5-flash")
            .think(true)
            .json(true)
            .max_tokens(2000)
            .tools(vec![tool])
            .build();
        let body = adapter().build_request(&history, &opts).unwrap();

        assert!(body.get("model").is_none());
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["functionCall"]["args"]["q"], "x");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2000);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 1024);
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "lookup");
    }

    #[test]
    fn test_system_turns_only_in_instruction() {
        let history = vec![
            Message::user("Hi"),
            Message::system("First rule."),
            Message::thinking("Considering"),
            Message::system("Second rule."),
        ];
        let body = adapter()
            .build_request(&history, &RequestOptions::builder("gemini-2.5-flash").build())
            .unwrap();

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "First rule.\n\nSecond rule."
        );
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|turn| turn["role"].as_str())
            .collect();
        assert_eq!(roles, vec!["user", "model"]);
        assert_eq!(content_role(Role::System), None);
    }

    #[test]
    fn test_url_attachment_rejected() {
        let message = Message::user_with_attachments(
            "Describe",
            vec![Attachment::image_url("https://example.com/cat.png")],
        );
        let opts = RequestOptions::builder("gemini-2.5-flash").build();
        assert!(matches!(
            adapter().build_request(&[message], &opts),
            Err(LLMError::UnsupportedAttachment(_))
        ));
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Considering...", "thought": true},
                    {"text": "Answer: 4"},
                    {"functionCall": {"name": "calc", "args": {"expr": "2+2"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 3, "thoughtsTokenCount": 5}
        });
        let adapter = adapter();
        assert_eq!(adapter.parse_content(&body), "Answer: 4");
        assert_eq!(adapter.parse_thinking(&body), "Considering...");
        let calls = adapter.parse_tools(&body);
        assert_eq!(calls[0].name, "calc");
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(adapter.parse_token_usage(&body), Some(TokenUsage::new(9, 8)));
    }

    #[test]
    fn test_stream_frames_use_buffered_parsers() {
        let adapter = adapter();
        let mut state = StreamState::new();
        let frames = [
            json!({"candidates": [{"content": {"parts": [{"text": "Hel"}]}}],
                   "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 1}}),
            json!({"candidates": [{"content": {"parts": [{"text": "lo"}]}, "finishReason": "STOP"}],
                   "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}}),
        ];
        let content: String = frames.iter().map(|f| adapter.parse_content_chunk(f)).collect();
        let usage = frames
            .iter()
            .filter_map(|f| adapter.parse_token_usage_chunk(f, &mut state))
            .last();
        assert_eq!(content, "Hello");
        assert_eq!(usage, Some(TokenUsage::new(4, 2)));
        assert!(!frames.iter().any(|f| adapter.is_terminal_frame(f)));
    }

    #[test]
    fn test_parse_models() {
        let listing = json!({"models": [{
            "name": "models/gemini-2.5-pro",
            "displayName": "Gemini 2.5 Pro",
            "supportedGenerationMethods": ["generateContent"]
        }]});
        let adapter = adapter();
        let entries = adapter.parse_models(&listing);
        let model = adapter.parse_model(&entries[0]).unwrap();
        assert_eq!(model.model, "gemini-2.5-pro");
        assert_eq!(model.name, "Gemini 2.5 Pro");
    }
}
