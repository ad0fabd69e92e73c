//! Response assembly
//!
//! Drives an adapter's parsers over either one complete document or the
//! frame sequence of a stream, accumulating content, thinking, tool calls and
//! usage into [`StreamBuffers`]. A turn is committed to history exactly once,
//! when the response ends normally.

use crate::completion::{ChatResponse, TokenUsage};
use crate::messages::MessageHistory;
use crate::parsers::ContentParser;
use crate::provider::{ProviderAdapter, StreamState};
use crate::registry::{ModelUsageEntry, usage_with_cost};
use crate::stream::CancelHandle;
use crate::{LLMError, Message, Result, ToolCall};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decoded frames of one streamed response
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// Incremental output of a streamed send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamEvent {
    Content(String),
    Thinking(String),
    Usage(TokenUsage),
    ToolCalls(Vec<ToolCall>),
    /// Final accumulated buffers, emitted once after the last frame
    Buffers(StreamBuffers),
}

/// Per-field accumulation of one response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamBuffers {
    pub content: String,
    pub thinking: String,
    pub tool_calls: Vec<ToolCall>,
    /// Last usage reported
    pub usage: Option<TokenUsage>,
}

impl StreamBuffers {
    /// Turns this response appends to history: thinking, then the answer,
    /// then one turn per tool call
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.tool_calls.len() + 2);
        if !self.thinking.is_empty() {
            messages.push(Message::thinking(self.thinking.clone()));
        }
        if !self.content.is_empty() {
            messages.push(Message::assistant(self.content.clone()));
        }
        messages.extend(self.tool_calls.iter().cloned().map(Message::tool_call));
        messages
    }
}

/// Everything needed to turn buffers into a [`ChatResponse`]
#[derive(Clone)]
pub struct TurnContext {
    pub service: String,
    pub model: String,
    /// Registry entry used for cost, resolved before sending
    pub entry: Option<ModelUsageEntry>,
    pub local: bool,
    pub parser: Option<ContentParser>,
}

impl fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnContext")
            .field("service", &self.service)
            .field("model", &self.model)
            .field("entry", &self.entry.as_ref().map(|e| &e.model))
            .field("local", &self.local)
            .field("parser", &self.parser.is_some())
            .finish()
    }
}

impl TurnContext {
    /// Commit the buffers to history and compose the final response
    pub fn finalize(&self, buffers: StreamBuffers, history: &mut MessageHistory) -> ChatResponse {
        history.extend(buffers.to_messages());

        let usage = buffers
            .usage
            .map(|usage| usage_with_cost(self.entry.as_ref(), &usage, self.local));
        if let Some(usage) = &usage {
            info!(
                service = %self.service,
                model = %self.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                total_cost = usage.total_cost,
                "Turn complete"
            );
        }

        let parsed = self.parser.as_ref().and_then(|parse| {
            let parsed = parse(&buffers.content);
            if parsed.is_none() {
                warn!("Content parser returned nothing");
            }
            parsed
        });

        ChatResponse {
            service: self.service.clone(),
            model: self.model.clone(),
            content: buffers.content,
            thinking: (!buffers.thinking.is_empty()).then_some(buffers.thinking),
            tool_calls: buffers.tool_calls,
            usage,
            parsed,
            messages: history.snapshot(),
        }
    }
}

/// Run every whole-document parser once over a complete response
pub fn assemble_buffered(adapter: &dyn ProviderAdapter, body: &Value) -> StreamBuffers {
    StreamBuffers {
        content: adapter.parse_content(body),
        thinking: adapter.parse_thinking(body),
        tool_calls: adapter.parse_tools(body),
        usage: adapter.parse_token_usage(body),
    }
}

/// Run every chunk parser over one frame, in field order
///
/// Non-empty results are folded into `buffers` and returned as events.
pub fn absorb_frame(
    adapter: &dyn ProviderAdapter,
    frame: &Value,
    state: &mut StreamState,
    buffers: &mut StreamBuffers,
) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    let content = adapter.parse_content_chunk(frame);
    if !content.is_empty() {
        buffers.content.push_str(&content);
        events.push(StreamEvent::Content(content));
    }

    let thinking = adapter.parse_thinking_chunk(frame);
    if !thinking.is_empty() {
        buffers.thinking.push_str(&thinking);
        events.push(StreamEvent::Thinking(thinking));
    }

    if let Some(usage) = adapter.parse_token_usage_chunk(frame, state) {
        buffers.usage = Some(usage);
        events.push(StreamEvent::Usage(usage));
    }

    let calls = adapter.parse_tools_chunk(frame, state);
    if !calls.is_empty() {
        buffers.tool_calls.extend(calls.iter().cloned());
        events.push(StreamEvent::ToolCalls(calls));
    }

    events
}

/// A streamed send in progress
///
/// Pull events with [`ChatStream::next`], or drain everything with
/// [`ChatStream::complete`]. The stream borrows the client's history and
/// scratch state, so no other send can start until it is dropped.
pub struct ChatStream<'a> {
    frames: FrameStream,
    adapter: Arc<dyn ProviderAdapter>,
    state: &'a mut StreamState,
    history: &'a mut MessageHistory,
    context: TurnContext,
    cancel: CancelHandle,
    buffers: StreamBuffers,
    pending: VecDeque<StreamEvent>,
    response: Option<ChatResponse>,
    ended: bool,
    cancelled: bool,
}

impl fmt::Debug for ChatStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream")
            .field("service", &self.context.service)
            .field("model", &self.context.model)
            .field("buffers", &self.buffers)
            .field("ended", &self.ended)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl<'a> ChatStream<'a> {
    pub(crate) fn new(
        frames: FrameStream,
        adapter: Arc<dyn ProviderAdapter>,
        state: &'a mut StreamState,
        history: &'a mut MessageHistory,
        context: TurnContext,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            frames,
            adapter,
            state,
            history,
            context,
            cancel,
            buffers: StreamBuffers::default(),
            pending: VecDeque::new(),
            response: None,
            ended: false,
            cancelled: false,
        }
    }

    /// Next event; `None` once the stream ended or was cancelled
    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.ended {
                return None;
            }

            let frame = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.stop_cancelled();
                    return None;
                }
                frame = self.frames.next() => frame,
            };

            match frame {
                Some(Ok(frame)) => {
                    let events =
                        absorb_frame(self.adapter.as_ref(), &frame, self.state, &mut self.buffers);
                    self.pending.extend(events);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Stream interrupted, turn not committed");
                    self.ended = true;
                    return Some(Err(e));
                }
                None => self.commit(),
            }
        }
    }

    /// Drain the stream and return the final response
    ///
    /// Fails with [`LLMError::Cancelled`] if the stream was cancelled before
    /// it ended.
    pub async fn complete(mut self) -> Result<ChatResponse> {
        while let Some(event) = self.next().await {
            event?;
        }
        self.response.take().ok_or(LLMError::Cancelled)
    }

    /// Stop reading; nothing is committed
    pub fn abort(&mut self) {
        self.cancel.cancel();
        if !self.ended {
            self.stop_cancelled();
        }
    }

    /// Handle that can cancel this stream from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Buffers accumulated so far
    pub fn buffers(&self) -> &StreamBuffers {
        &self.buffers
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn stop_cancelled(&mut self) {
        debug!(
            content_bytes = self.buffers.content.len(),
            "Stream cancelled, discarding partial turn"
        );
        self.ended = true;
        self.cancelled = true;
        self.pending.clear();
        // dropping the frame stream releases the connection
        self.frames = Box::pin(futures::stream::empty());
    }

    fn commit(&mut self) {
        self.ended = true;

        let trailing = self.adapter.finish_tools(self.state);
        if !trailing.is_empty() {
            self.buffers.tool_calls.extend(trailing.iter().cloned());
            self.pending.push_back(StreamEvent::ToolCalls(trailing));
        }

        debug!(
            content_bytes = self.buffers.content.len(),
            tool_calls = self.buffers.tool_calls.len(),
            "Stream ended, committing turn"
        );
        self.pending
            .push_back(StreamEvent::Buffers(self.buffers.clone()));
        let buffers = self.buffers.clone();
        self.response = Some(self.context.finalize(buffers, self.history));
    }
}
