//! The LLM client
//!
//! Owns the conversation history, the adapter for one service, the transport
//! and a handle to the model registry. One send runs at a time: a streamed
//! send borrows the client mutably until the [`ChatStream`] is dropped.
//!
//! # Examples
//!
//! ```no_run
//! use unillm::{ClientOptions, LLMClient, SendOptions};
//!
//! # async fn run() -> unillm::Result<()> {
//! let mut client = LLMClient::new(ClientOptions::new("anthropic").with_max_tokens(512))?;
//! client.system("Answer in one sentence.");
//!
//! let response = client.chat("Why is the sky blue?", SendOptions::new()).await?;
//! println!("{}", response.content);
//!
//! let mut stream = client.stream(SendOptions::new()).await?;
//! while let Some(event) = stream.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::attachment::Attachment;
use crate::completion::ChatResponse;
use crate::config::{ClientOptions, SendOptions};
use crate::messages::{Message, MessageHistory};
use crate::parsers;
use crate::provider::{ModelListing, ProviderAdapter, StreamState};
use crate::providers;
use crate::registry::{LITELLM_TABLE_URL, ModelRegistry, ModelUsageEntry};
use crate::response::{ChatStream, TurnContext, assemble_buffered};
use crate::stream::{self, CancelHandle};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::{LLMError, Result, ToolCall};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Provider-agnostic chat client
pub struct LLMClient {
    options: ClientOptions,
    adapter: Arc<dyn ProviderAdapter>,
    transport: Arc<dyn Transport>,
    registry: Arc<ModelRegistry>,
    history: MessageHistory,
    state: StreamState,
    cancel: CancelHandle,
}

impl std::fmt::Debug for LLMClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMClient")
            .field("service", &self.adapter.service())
            .field("base_url", &self.adapter.config().base_url)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl LLMClient {
    /// Create a client talking to the service named in `options` over HTTP
    pub fn new(options: ClientOptions) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(options.timeout_secs)?);
        Self::with_transport(options, transport)
    }

    /// Create a client with a custom transport
    pub fn with_transport(options: ClientOptions, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut config = providers::default_config(&options.service)?;
        if let Some(base_url) = &options.base_url {
            config = config.with_base_url(base_url.as_str());
        }
        if let Some(key) = options.api_key.resolve(&options.service) {
            config = config.with_api_key(key);
        }
        let adapter = providers::create_adapter(config)?;
        Ok(Self::from_parts(options, adapter, transport))
    }

    /// Create a client around an adapter built elsewhere
    pub fn from_parts(
        options: ClientOptions,
        adapter: Arc<dyn ProviderAdapter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        info!(
            service = adapter.service(),
            base_url = %adapter.config().base_url,
            "LLM client created"
        );
        Self {
            options,
            adapter,
            transport,
            registry: Arc::new(ModelRegistry::new()),
            history: MessageHistory::new(),
            state: StreamState::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Use a shared registry instead of a private one
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn service(&self) -> &str {
        self.adapter.service()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Model a send without overrides would use
    pub fn model(&self) -> Option<&str> {
        self.options
            .model
            .as_deref()
            .or_else(|| self.adapter.default_model())
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn user(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Message::user(text))
    }

    pub fn user_with_attachments(
        &mut self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> &mut Self {
        self.push(Message::user_with_attachments(text, attachments))
    }

    pub fn assistant(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Message::assistant(text))
    }

    pub fn system(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Message::system(text))
    }

    pub fn thinking(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Message::thinking(text))
    }

    pub fn tool_call(&mut self, call: ToolCall) -> &mut Self {
        self.push(Message::tool_call(call))
    }

    pub fn push(&mut self, message: Message) -> &mut Self {
        self.history.push(message);
        self
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Forget the conversation
    pub fn reset(&mut self) {
        self.history.clear();
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Append a user turn, then send
    pub async fn chat(
        &mut self,
        text: impl Into<String>,
        options: SendOptions,
    ) -> Result<ChatResponse> {
        self.user(text);
        self.send(options).await
    }

    /// Send the history and wait for the complete response
    ///
    /// When streaming is enabled the response is streamed and drained, so the
    /// result is the same either way.
    #[instrument(skip(self, options), fields(service = %self.adapter.service()))]
    pub async fn send(&mut self, options: SendOptions) -> Result<ChatResponse> {
        if options.stream.unwrap_or(self.options.stream) {
            return self.stream(options).await?.complete().await;
        }

        let (request, context) = self.prepare(options.stream(false))?;
        self.cancel.rearm();
        let response = self.execute(request).await?;
        let body = response.into_json()?;

        let buffers = assemble_buffered(self.adapter.as_ref(), &body);
        Ok(context.finalize(buffers, &mut self.history))
    }

    /// Send the history and stream the response
    #[instrument(skip(self, options), fields(service = %self.adapter.service()))]
    pub async fn stream(&mut self, options: SendOptions) -> Result<ChatStream<'_>> {
        let (request, context) = self.prepare(options.stream(true))?;
        self.state.reset();
        self.cancel.rearm();
        let response = self.execute(request).await?;
        let bytes = response.into_byte_stream()?;

        let adapter = Arc::clone(&self.adapter);
        let frames = stream::frames(bytes, move |frame| adapter.is_terminal_frame(frame));
        Ok(ChatStream::new(
            Box::pin(frames),
            Arc::clone(&self.adapter),
            &mut self.state,
            &mut self.history,
            context,
            self.cancel.clone(),
        ))
    }

    /// Cancel the send in flight
    ///
    /// With no send running this has no effect; every send starts uncancelled.
    pub fn abort(&self) {
        debug!("Abort requested");
        self.cancel.cancel();
    }

    /// Handle for cancelling sends from another task
    ///
    /// The handle stays bound to this client and reaches every later send.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Fetch the vendor's model listing joined with registry metadata
    ///
    /// Models the registry does not know are skipped unless `allow_unknown`
    /// is set; local services list everything they serve.
    #[instrument(skip(self), fields(service = %self.adapter.service()))]
    pub async fn fetch_models(&self, allow_unknown: bool) -> Result<Vec<ModelListing>> {
        let request =
            HttpRequest::get(self.adapter.models_url()).with_headers(self.adapter.headers());
        let body = self.transport.execute(request).await?.into_json()?;
        let service = self.adapter.service();

        let mut models = Vec::new();
        for entry in self.adapter.parse_models(&body) {
            let mut listing = match self.adapter.parse_model(&entry) {
                Ok(listing) => listing,
                Err(e @ LLMError::NotImplemented(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Skipping model listing entry");
                    continue;
                }
            };
            listing.usage = self.registry.resolve(service, &listing.model, true);
            if listing.usage.is_none() && !allow_unknown && !self.adapter.is_local() {
                debug!(model = %listing.model, "Skipping model missing from registry");
                continue;
            }
            models.push(listing);
        }
        info!(count = models.len(), "Fetched models");
        Ok(models)
    }

    /// Merge the published LiteLLM table into this client's registry
    pub async fn refresh_registry(&self) -> Result<usize> {
        self.registry
            .refresh(self.transport.as_ref(), LITELLM_TABLE_URL)
            .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn prepare(&self, options: SendOptions) -> Result<(HttpRequest, TurnContext)> {
        let options = options.resolve(&self.options, self.adapter.default_model())?;
        let entry = self.cost_entry(&options.model)?;
        let body = self
            .adapter
            .build_request(self.history.messages(), &options)?;
        debug!(
            model = %options.model,
            stream = options.stream,
            messages = self.history.len(),
            "Prepared request"
        );

        let request = HttpRequest::post(self.adapter.chat_url(&options), body)
            .with_headers(self.adapter.headers())
            .streaming(options.stream);
        let parser = self
            .options
            .parser
            .clone()
            .or_else(|| options.json.then(parsers::json_parser));
        let context = TurnContext {
            service: self.adapter.service().to_string(),
            model: options.model,
            entry,
            local: self.adapter.is_local(),
            parser,
        };
        Ok((request, context))
    }

    /// Registry entry used for cost; unknown paid models fail before anything is sent
    fn cost_entry(&self, model: &str) -> Result<Option<ModelUsageEntry>> {
        let service = self.adapter.service();
        let entry = self.registry.resolve(service, model, true);
        if entry.is_none() && !self.adapter.is_local() && !self.options.allow_unknown_models {
            return Err(LLMError::UnknownModel {
                service: service.to_string(),
                model: model.to_string(),
            });
        }
        Ok(entry)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(LLMError::Cancelled),
            response = self.transport.execute(request) => response,
        }
    }
}
