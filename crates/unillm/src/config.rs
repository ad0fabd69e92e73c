//! Client and adapter configuration
//!
//! Auth header style, base URLs and usage-inclusion flags are configuration,
//! not behavior: every adapter instance owns an [`AdapterConfig`] that callers
//! can override without writing a new adapter.

use crate::completion::{DEFAULT_MAX_TOKENS, RequestOptions};
use crate::parsers::ContentParser;
use crate::{LLMError, Result, ToolDefinition};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Default HTTP timeout, seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// How the API key is presented to the vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Key sent verbatim in a custom header (e.g. `x-api-key`)
    Header(String),
    /// No authentication (local servers)
    None,
}

/// Per-instance adapter configuration
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Service name (e.g. "openai", "groq")
    pub service: String,

    /// Base URL, without trailing slash
    pub base_url: String,

    /// Resolved API key
    pub api_key: Option<String>,

    pub auth: AuthStyle,

    /// Extra static headers sent on every request
    pub headers: Vec<(String, String)>,

    /// Self-hosted provider with no metered cost
    pub local: bool,

    /// Ask the vendor to append usage to streamed responses
    pub stream_usage: bool,
}

impl AdapterConfig {
    pub fn new(service: impl Into<String>, base_url: impl Into<String>, auth: AuthStyle) -> Self {
        Self {
            service: service.into(),
            base_url: trim_base_url(base_url.into()),
            api_key: None,
            auth,
            headers: Vec::new(),
            local: false,
            stream_usage: false,
        }
    }

    /// Set custom API base URL
    ///
    /// Useful for proxies, self-hosted gateways and OpenAI-compatible servers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = trim_base_url(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthStyle) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn stream_usage(mut self, stream_usage: bool) -> Self {
        self.stream_usage = stream_usage;
        self
    }

    /// Check the base URL parses and that a key is present where one is needed
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            LLMError::ConfigurationError(format!("Invalid base URL '{}': {e}", self.base_url))
        })?;

        if self.api_key.is_none() && !self.local && self.auth != AuthStyle::None {
            return Err(LLMError::ConfigurationError(format!(
                "No API key for service '{}' (set {} or pass one explicitly)",
                self.service,
                unillm_utils::api_key_env_var(&self.service)
            )));
        }
        Ok(())
    }

    /// Auth and static headers for a request
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        if let Some(key) = &self.api_key {
            match &self.auth {
                AuthStyle::Bearer => {
                    headers.push(("Authorization".to_string(), format!("Bearer {key}")));
                }
                AuthStyle::Header(name) => headers.push((name.clone(), key.clone())),
                AuthStyle::None => {}
            }
        }
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Caller-supplied secret lookup, keyed by service name
pub type SecretStore = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// API key resolution strategy
///
/// Order: explicit key, then `${SERVICE}_API_KEY` from the environment, then
/// the secret-store callback. Resolved once when the client is built.
#[derive(Clone)]
pub struct ApiKeyResolver {
    explicit: Option<String>,
    use_env: bool,
    store: Option<SecretStore>,
}

impl Default for ApiKeyResolver {
    fn default() -> Self {
        Self {
            explicit: None,
            use_env: true,
            store: None,
        }
    }
}

impl fmt::Debug for ApiKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyResolver")
            .field("explicit", &self.explicit.as_ref().map(|_| "<redacted>"))
            .field("use_env", &self.use_env)
            .field("store", &self.store.is_some())
            .finish()
    }
}

impl ApiKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.explicit = Some(key.into());
        self
    }

    /// Skip the environment lookup
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn with_secret_store(
        mut self,
        store: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn resolve(&self, service: &str) -> Option<String> {
        if let Some(key) = &self.explicit {
            return Some(key.clone());
        }
        if self.use_env {
            if let Some(key) = unillm_utils::env_api_key(service) {
                return Some(key);
            }
        }
        self.store.as_ref().and_then(|store| store(service))
    }
}

/// Options a client is built with
#[derive(Clone)]
pub struct ClientOptions {
    /// Service name (see [`crate::providers::SERVICES`])
    pub service: String,
    /// Default model; falls back to the adapter's default
    pub model: Option<String>,
    /// Override the adapter's base URL
    pub base_url: Option<String>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub max_thinking_tokens: Option<u32>,
    pub think: bool,
    pub json: bool,
    pub tools: Option<Vec<ToolDefinition>>,
    /// Post-processor applied to the final content
    pub parser: Option<ContentParser>,
    pub api_key: ApiKeyResolver,
    /// Report zero cost instead of failing for models missing from the registry
    pub allow_unknown_models: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Extra top-level body fields sent on every request
    pub extended: Map<String, Value>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("service", &self.service)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("stream", &self.stream)
            .field("max_tokens", &self.max_tokens)
            .field("think", &self.think)
            .field("parser", &self.parser.is_some())
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl ClientOptions {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            model: None,
            base_url: None,
            stream: false,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            max_thinking_tokens: None,
            think: false,
            json: false,
            tools: None,
            parser: None,
            api_key: ApiKeyResolver::default(),
            allow_unknown_models: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            extended: Map::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = self.api_key.with_key(api_key);
        self
    }

    pub fn with_api_key_resolver(mut self, resolver: ApiKeyResolver) -> Self {
        self.api_key = resolver;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_think(mut self, think: bool) -> Self {
        self.think = think;
        self
    }

    pub fn with_max_thinking_tokens(mut self, budget: u32) -> Self {
        self.max_thinking_tokens = Some(budget);
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_parser(mut self, parser: ContentParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn allow_unknown_models(mut self, allow: bool) -> Self {
        self.allow_unknown_models = allow;
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_extended(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extended.insert(key.into(), value);
        self
    }
}

/// Per-send overrides of the client options
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub model: Option<String>,
    pub stream: Option<bool>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub think: Option<bool>,
    pub max_thinking_tokens: Option<u32>,
    pub json: Option<bool>,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn think(mut self, think: bool) -> Self {
        self.think = Some(think);
        self
    }

    pub fn max_thinking_tokens(mut self, budget: u32) -> Self {
        self.max_thinking_tokens = Some(budget);
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = Some(json);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Layer these overrides over the client defaults
    ///
    /// `default_model` is the adapter's fallback when neither side names a model.
    pub fn resolve(
        self,
        client: &ClientOptions,
        default_model: Option<&str>,
    ) -> Result<RequestOptions> {
        let model = self
            .model
            .or_else(|| client.model.clone())
            .or_else(|| default_model.map(ToString::to_string))
            .ok_or_else(|| {
                LLMError::InvalidRequest(format!(
                    "No model given and service '{}' has no default",
                    client.service
                ))
            })?;

        Ok(RequestOptions {
            model,
            stream: self.stream.unwrap_or(client.stream),
            max_tokens: self.max_tokens.unwrap_or(client.max_tokens),
            temperature: self.temperature.or(client.temperature),
            tools: self.tools.or_else(|| client.tools.clone()),
            think: self.think.unwrap_or(client.think),
            max_thinking_tokens: self.max_thinking_tokens.or(client.max_thinking_tokens),
            json: self.json.unwrap_or(client.json),
            extended: client.extended.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_headers() {
        let bearer = AdapterConfig::new("openai", "https://api.openai.com/v1/", AuthStyle::Bearer)
            .with_api_key("sk-1");
        assert_eq!(bearer.base_url, "https://api.openai.com/v1");
        assert_eq!(
            bearer.auth_headers(),
            vec![("Authorization".to_string(), "Bearer sk-1".to_string())]
        );

        let custom = AdapterConfig::new(
            "anthropic",
            "https://api.anthropic.com/v1",
            AuthStyle::Header("x-api-key".to_string()),
        )
        .with_api_key("sk-2")
        .with_header("anthropic-version", "2023-06-01");
        assert_eq!(custom.auth_headers().len(), 2);
        assert_eq!(custom.auth_headers()[0].0, "x-api-key");
    }

    #[test]
    fn test_validate() {
        let missing_key = AdapterConfig::new("groq", "https://api.groq.com/openai/v1", AuthStyle::Bearer);
        assert!(matches!(
            missing_key.validate(),
            Err(LLMError::ConfigurationError(_))
        ));

        let local = AdapterConfig::new("ollama", "http://localhost:11434", AuthStyle::None).local(true);
        assert!(local.validate().is_ok());

        let bad_url = AdapterConfig::new("openai", "not a url", AuthStyle::Bearer).with_api_key("k");
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn test_key_resolution_order() {
        let resolver = ApiKeyResolver::new()
            .without_env()
            .with_secret_store(|service| (service == "vault").then(|| "from-store".to_string()));
        assert_eq!(resolver.resolve("vault"), Some("from-store".to_string()));
        assert_eq!(resolver.resolve("other"), None);

        let explicit = resolver.with_key("explicit");
        assert_eq!(explicit.resolve("vault"), Some("explicit".to_string()));

        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("KEYORDER_TEST_API_KEY", "from-env");
        }
        let env_first = ApiKeyResolver::new().with_secret_store(|_| Some("store".to_string()));
        assert_eq!(env_first.resolve("keyorder-test"), Some("from-env".to_string()));
        unsafe {
            std::env::remove_var("KEYORDER_TEST_API_KEY");
        }
    }

    #[test]
    fn test_send_options_layering() {
        let client = ClientOptions::new("openai")
            .with_model("gpt-4.1")
            .with_max_tokens(100)
            .with_temperature(0.2);

        let merged = SendOptions::new()
            .stream(true)
            .max_tokens(50)
            .resolve(&client, Some("gpt-4o-mini"))
            .unwrap();
        assert_eq!(merged.model, "gpt-4.1");
        assert_eq!(merged.max_tokens, 50);
        assert_eq!(merged.temperature, Some(0.2));
        assert!(merged.stream);

        let no_model = SendOptions::new().resolve(&ClientOptions::new("apiv1"), None);
        assert!(matches!(no_model, Err(LLMError::InvalidRequest(_))));
    }
}
