//! Message types and the conversation history
//!
//! The history keeps five roles. `thinking` and `tool_call` exist only in
//! memory so a conversation can be inspected or replayed; providers are sent
//! `assistant` for both (see [`Role::wire_role`]).

use crate::attachment::Attachment;
use crate::tools::ToolCall;
use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// System message (handled separately in some providers)
    System,
    /// Reasoning emitted by the model
    Thinking,
    /// Tool invocation requested by the model
    ToolCall,
}

impl Role {
    /// Role as understood by providers: `thinking` and `tool_call` become `assistant`
    pub fn wire_role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Assistant | Self::Thinking | Self::ToolCall => "assistant",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Thinking => "thinking",
            Self::ToolCall => "tool_call",
        }
    }
}

/// Message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Text with attached images or documents
    Parts {
        /// Text content
        text: String,
        /// Attachments, in order
        attachments: Vec<Attachment>,
    },
    /// A normalized tool call (only on `tool_call` messages)
    ToolCall(ToolCall),
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Message content
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create a user message with text
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a user message carrying attachments
    pub fn user_with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts {
                text: text.into(),
                attachments,
            },
        }
    }

    /// Create an assistant message with text
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create a system message with text
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a thinking message
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::new(Role::Thinking, text)
    }

    /// Create a tool-call message
    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            role: Role::ToolCall,
            content: MessageContent::ToolCall(call),
        }
    }

    /// Text of the message (empty for tool calls)
    pub fn text(&self) -> &str {
        match &self.content {
            MessageContent::Text(text) | MessageContent::Parts { text, .. } => text,
            MessageContent::ToolCall(_) => "",
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        match &self.content {
            MessageContent::Parts { attachments, .. } => attachments,
            _ => &[],
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match &self.content {
            MessageContent::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}

/// Ordered, append-only log of conversation turns
///
/// Owned by the client. Nothing in the crate removes or edits an entry; only
/// the caller can start over with [`MessageHistory::clear`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHistory {
    messages: Vec<Message>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Owned copy of the current turns
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl From<Vec<Message>> for MessageHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a MessageHistory {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
