//! Request options and normalized response types

use crate::{Message, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default generation budget when the caller sets none
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Provider-agnostic options for one request
///
/// Adapters translate these into their vendor's request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Model identifier (provider-specific)
    pub model: String,

    /// Whether to ask for an incremental response
    pub stream: bool,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Tools available for the LLM to call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Enable the vendor's reasoning mode
    pub think: bool,

    /// Reasoning budget, for vendors that take one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_thinking_tokens: Option<u32>,

    /// Ask for a JSON response
    pub json: bool,

    /// Extra top-level body fields, merged last
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extended: Map<String, Value>,
}

impl RequestOptions {
    /// Create a builder for request options
    pub fn builder(model: impl Into<String>) -> RequestOptionsBuilder {
        RequestOptionsBuilder::new(model)
    }

    /// Reasoning budget with the vendor-neutral default applied
    pub fn thinking_budget(&self) -> u32 {
        self.max_thinking_tokens
            .unwrap_or_else(|| (self.max_tokens / 2).max(1024))
    }
}

/// Builder for RequestOptions
pub struct RequestOptionsBuilder {
    options: RequestOptions,
}

impl RequestOptionsBuilder {
    /// Create a new builder
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            options: RequestOptions {
                model: model.into(),
                stream: false,
                max_tokens: DEFAULT_MAX_TOKENS,
                temperature: None,
                tools: None,
                think: false,
                max_thinking_tokens: None,
                json: false,
                extended: Map::new(),
            },
        }
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.options.stream = stream;
        self
    }

    /// Set the maximum tokens
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    /// Set the available tools
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.options.tools = Some(tools);
        self
    }

    pub fn think(mut self, think: bool) -> Self {
        self.options.think = think;
        self
    }

    pub fn max_thinking_tokens(mut self, budget: u32) -> Self {
        self.options.max_thinking_tokens = Some(budget);
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.options.json = json;
        self
    }

    /// Add an extra top-level body field
    pub fn extend(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.extended.insert(key.into(), value);
        self
    }

    /// Build the request options
    pub fn build(self) -> RequestOptions {
        self.options
    }
}

/// Token counts as parsed from a vendor payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens
    pub input_tokens: u64,

    /// Number of output tokens
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Token usage resolved against the model registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Dollar cost of the input tokens
    pub input_cost: f64,
    /// Dollar cost of the output tokens
    pub output_cost: f64,
    pub total_cost: f64,
    /// Served by a self-hosted provider (cost is always zero)
    pub local: bool,
}

/// Final result of one send, buffered or streamed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Service that produced the response
    pub service: String,
    /// Model the request was sent to
    pub model: String,
    /// Assistant text
    pub content: String,
    /// Reasoning text, when the vendor exposed any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Usage with cost, when the vendor reported any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Structured value produced by the content parser (or JSON mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    /// Full history after this turn was committed
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = RequestOptions::builder("claude-sonnet-4-5")
            .stream(true)
            .max_tokens(2048)
            .temperature(0.7)
            .think(true)
            .extend("top_p", serde_json::json!(0.9))
            .build();

        assert_eq!(options.model, "claude-sonnet-4-5");
        assert!(options.stream);
        assert_eq!(options.max_tokens, 2048);
        assert_eq!(options.temperature, Some(0.7));
        assert_eq!(options.thinking_budget(), 1024);
        assert_eq!(options.extended["top_p"], 0.9);
    }

    #[test]
    fn test_token_usage() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }
}
