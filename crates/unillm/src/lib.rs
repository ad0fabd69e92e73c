//! Unified chat interface over many LLM vendor APIs
//!
//! One [`LLMClient`] talks to OpenAI, Anthropic, Google Gemini, Ollama and a
//! family of OpenAI-compatible services (Groq, DeepSeek, xAI, OpenRouter,
//! llamafile, any `/v1` gateway). The client owns a conversation history,
//! sends it buffered or streamed, and commits the assistant turn (thinking,
//! text and tool calls) back into the history once the response is complete.
//!
//! - [`messages`]: conversation turns and history
//! - [`provider`]: the [`ProviderAdapter`] seam every vendor implements
//! - [`providers`]: the built-in adapters
//! - [`stream`]: SSE / NDJSON framing and cancellation
//! - [`registry`]: model metadata and token cost
//! - [`transport`]: the HTTP seam, swappable for tests

pub mod attachment;
pub mod client;
pub mod completion;
pub mod config;
pub mod error;
pub mod messages;
pub mod parsers;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod response;
pub mod stream;
pub mod tools;
pub mod transport;

pub use attachment::{Attachment, AttachmentKind};
pub use client::LLMClient;
pub use completion::{ChatResponse, RequestOptions, TokenUsage, Usage};
pub use config::{AdapterConfig, ApiKeyResolver, AuthStyle, ClientOptions, SendOptions};
pub use error::{LLMError, Result};
pub use messages::{Message, MessageContent, MessageHistory, Role};
pub use parsers::ContentParser;
pub use provider::{ModelListing, ProviderAdapter, StreamState};
pub use registry::{ModelRegistry, ModelUsageEntry};
pub use response::{ChatStream, StreamBuffers, StreamEvent};
pub use stream::CancelHandle;
pub use tools::{ToolCall, ToolDefinition, ToolStyle};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
