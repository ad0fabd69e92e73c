//! Model capability and cost registry
//!
//! A read-mostly table of per-(service, model) metadata in LiteLLM's
//! `model_prices_and_context_window.json` shape, plus an overlay of custom
//! entries that shadows it. The registry is an explicit object: each client
//! holds an `Arc<ModelRegistry>`, and several clients may share one.

use crate::completion::{TokenUsage, Usage};
use crate::transport::{HttpRequest, Transport};
use crate::{LLMError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

/// Table compiled into the crate
const STATIC_TABLE: &str = include_str!("../data/models.json");

/// Upstream location of the LiteLLM table, for [`ModelRegistry::refresh`]
pub const LITELLM_TABLE_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

/// Suffixes stripped (one at a time, from the original name) during fuzzy lookup
const STRIPPED_SUFFIXES: [&str; 6] = [
    "-beta",
    "-thinking",
    "-exp",
    "-experimental",
    "-thinking-exp",
    "-preview",
];

/// Capability and pricing metadata for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsageEntry {
    pub service: String,
    pub model: String,
    /// `chat`, `responses`, `embedding`, ... (absent in some remote tables)
    pub mode: Option<String>,
    pub max_tokens: Option<u64>,
    pub max_input_tokens: Option<u64>,
    pub max_output_tokens: Option<u64>,
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    pub output_cost_per_reasoning_token: Option<f64>,
    pub supports_reasoning: bool,
    pub supports_function_calling: bool,
    pub supports_vision: bool,
    pub supports_web_search: bool,
    pub supports_audio_input: bool,
    pub supports_audio_output: bool,
    pub supports_prompt_caching: bool,
    pub tags: Vec<String>,
}

impl ModelUsageEntry {
    /// Entry with zero cost and no capabilities, for building custom overlays
    pub fn new(service: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            model: model.into(),
            mode: Some("chat".to_string()),
            max_tokens: None,
            max_input_tokens: None,
            max_output_tokens: None,
            input_cost_per_token: 0.0,
            output_cost_per_token: 0.0,
            output_cost_per_reasoning_token: None,
            supports_reasoning: false,
            supports_function_calling: false,
            supports_vision: false,
            supports_web_search: false,
            supports_audio_input: false,
            supports_audio_output: false,
            supports_prompt_caching: false,
            tags: Vec::new(),
        }
    }

    pub fn with_costs(mut self, input_cost_per_token: f64, output_cost_per_token: f64) -> Self {
        self.input_cost_per_token = input_cost_per_token;
        self.output_cost_per_token = output_cost_per_token;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    fn is_chat(&self) -> bool {
        matches!(self.mode.as_deref(), Some("chat" | "responses"))
    }

    fn key(&self) -> EntryKey {
        (self.service.clone(), self.model.clone())
    }
}

/// Row as it appears in the JSON table
#[derive(Debug, Deserialize)]
struct RawEntry {
    litellm_provider: Option<String>,
    mode: Option<String>,
    max_tokens: Option<Value>,
    max_input_tokens: Option<Value>,
    max_output_tokens: Option<Value>,
    #[serde(default)]
    input_cost_per_token: Option<f64>,
    #[serde(default)]
    output_cost_per_token: Option<f64>,
    output_cost_per_reasoning_token: Option<f64>,
    #[serde(default)]
    supports_reasoning: bool,
    #[serde(default)]
    supports_function_calling: bool,
    #[serde(default)]
    supports_vision: bool,
    #[serde(default)]
    supports_web_search: bool,
    #[serde(default)]
    supports_audio_input: bool,
    #[serde(default)]
    supports_audio_output: bool,
    #[serde(default)]
    supports_prompt_caching: bool,
    #[serde(default)]
    tags: Vec<String>,
}

impl RawEntry {
    fn into_entry(self, model: &str) -> Option<ModelUsageEntry> {
        let service = self.litellm_provider?;
        Some(ModelUsageEntry {
            service,
            model: model.to_string(),
            mode: self.mode,
            max_tokens: token_limit(self.max_tokens.as_ref()),
            max_input_tokens: token_limit(self.max_input_tokens.as_ref()),
            max_output_tokens: token_limit(self.max_output_tokens.as_ref()),
            input_cost_per_token: self.input_cost_per_token.unwrap_or(0.0),
            output_cost_per_token: self.output_cost_per_token.unwrap_or(0.0),
            output_cost_per_reasoning_token: self.output_cost_per_reasoning_token,
            supports_reasoning: self.supports_reasoning,
            supports_function_calling: self.supports_function_calling,
            supports_vision: self.supports_vision,
            supports_web_search: self.supports_web_search,
            supports_audio_input: self.supports_audio_input,
            supports_audio_output: self.supports_audio_output,
            supports_prompt_caching: self.supports_prompt_caching,
            tags: self.tags,
        })
    }
}

/// Limits are numbers in most rows but strings in a few upstream ones
fn token_limit(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Dollar cost of one usage report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

type EntryKey = (String, String);

/// Registry of model metadata with a custom overlay
#[derive(Debug, Default)]
pub struct ModelRegistry {
    table: RwLock<HashMap<EntryKey, ModelUsageEntry>>,
    custom: RwLock<HashMap<EntryKey, ModelUsageEntry>>,
}

impl ModelRegistry {
    /// Registry loaded with the embedded table
    pub fn new() -> Self {
        match Self::from_json(STATIC_TABLE) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "Embedded model table failed to load, starting empty");
                Self::empty()
            }
        }
    }

    /// Registry with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry built from a JSON document in the LiteLLM table shape
    pub fn from_json(json: &str) -> Result<Self> {
        let registry = Self::empty();
        let value: Value = serde_json::from_str(json)?;
        registry.merge_table(&value);
        Ok(registry)
    }

    /// Merge a table document over the static table; returns rows accepted
    ///
    /// Rows without a provider (such as LiteLLM's `sample_spec`) are skipped.
    pub fn merge_table(&self, document: &Value) -> usize {
        let Some(rows) = document.as_object() else {
            warn!("Model table is not a JSON object, ignoring");
            return 0;
        };

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut accepted = 0;
        for (model, row) in rows {
            let entry = serde_json::from_value::<RawEntry>(row.clone())
                .ok()
                .and_then(|raw| raw.into_entry(model));
            match entry {
                Some(entry) => {
                    table.insert(entry.key(), entry);
                    accepted += 1;
                }
                None => debug!(model = %model, "Skipping model table row"),
            }
        }
        accepted
    }

    /// Fetch a remote table and merge it over the current one
    #[instrument(skip(self, transport))]
    pub async fn refresh(&self, transport: &dyn Transport, url: &str) -> Result<usize> {
        let document = transport.execute(HttpRequest::get(url)).await?.into_json()?;
        let accepted = self.merge_table(&document);
        if accepted == 0 {
            return Err(LLMError::UnexpectedResponse(format!(
                "Model table at {url} contained no usable rows"
            )));
        }
        info!(accepted, "Refreshed model registry");
        Ok(accepted)
    }

    /// Find metadata for `model` on `service`
    ///
    /// Exact lookup first. With `allow_similar`, variant spellings are tried
    /// in this order: `{model}-latest`, `{model}-beta`, `{service}/{model}`,
    /// `{service}/{model}-beta`, then `model` with each of `-beta`,
    /// `-thinking`, `-exp`, `-experimental`, `-thinking-exp`, `-preview`
    /// removed. Each suffix is stripped from the original name on its own,
    /// never cumulatively. First hit wins.
    pub fn resolve(&self, service: &str, model: &str, allow_similar: bool) -> Option<ModelUsageEntry> {
        let services = service_aliases(service);

        for svc in &services {
            if let Some(entry) = self.lookup(svc, model) {
                return Some(entry);
            }
        }
        if !allow_similar {
            return None;
        }

        for svc in &services {
            for candidate in similar_names(svc, model) {
                if let Some(entry) = self.lookup(svc, &candidate) {
                    debug!(model, matched = %candidate, "Resolved model by similar name");
                    return Some(entry);
                }
            }
        }
        None
    }

    /// Chat-capable entries for `service`, sorted by model name
    ///
    /// `google` also matches entries from (or tagged) `gemini`. With
    /// `allow_unknown`, entries whose mode is not recorded are included too.
    pub fn list_by_service(&self, service: &str, allow_unknown: bool) -> Vec<ModelUsageEntry> {
        let mut merged: HashMap<EntryKey, ModelUsageEntry> = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (key, entry) in self.custom.read().unwrap_or_else(PoisonError::into_inner).iter() {
            merged.insert(key.clone(), entry.clone());
        }

        let mut entries: Vec<ModelUsageEntry> = merged
            .into_values()
            .filter(|entry| service_matches(service, entry))
            .filter(|entry| entry.is_chat() || (allow_unknown && entry.mode.is_none()))
            .collect();
        entries.sort_by(|a, b| a.model.cmp(&b.model));
        entries
    }

    /// Add or replace a custom entry; it shadows any static entry with the same key
    pub fn add_custom(&self, entry: ModelUsageEntry) {
        self.custom
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.key(), entry);
    }

    /// Remove a custom entry; returns it if present
    pub fn remove_custom(&self, service: &str, model: &str) -> Option<ModelUsageEntry> {
        self.custom
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(service.to_string(), model.to_string()))
    }

    pub fn clear_custom(&self) {
        self.custom
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of entries in the static table (custom entries excluded)
    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, service: &str, model: &str) -> Option<ModelUsageEntry> {
        let key = (service.to_string(), model.to_string());
        if let Some(entry) = self
            .custom
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Some(entry.clone());
        }
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }
}

/// Services whose rows may answer for `service`
fn service_aliases(service: &str) -> Vec<&str> {
    if service == "google" {
        vec!["google", "gemini"]
    } else {
        vec![service]
    }
}

fn service_matches(service: &str, entry: &ModelUsageEntry) -> bool {
    if entry.service == service {
        return true;
    }
    service == "google" && (entry.service == "gemini" || entry.tags.iter().any(|t| t == "gemini"))
}

fn similar_names(service: &str, model: &str) -> Vec<String> {
    let mut names = vec![
        format!("{model}-latest"),
        format!("{model}-beta"),
        format!("{service}/{model}"),
        format!("{service}/{model}-beta"),
    ];
    names.extend(
        STRIPPED_SUFFIXES
            .iter()
            .filter_map(|suffix| model.strip_suffix(suffix))
            .filter(|stripped| !stripped.is_empty())
            .map(ToString::to_string),
    );
    names
}

/// Dollar cost of `usage`; always zero for local providers
pub fn cost_of(entry: Option<&ModelUsageEntry>, usage: &TokenUsage, is_local: bool) -> Cost {
    let Some(entry) = entry.filter(|_| !is_local) else {
        return Cost::default();
    };
    let input_cost = usage.input_tokens as f64 * entry.input_cost_per_token;
    let output_cost = usage.output_tokens as f64 * entry.output_cost_per_token;
    Cost {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

/// Extend parsed token counts with totals and cost
pub fn usage_with_cost(entry: Option<&ModelUsageEntry>, usage: &TokenUsage, is_local: bool) -> Usage {
    let cost = cost_of(entry, usage, is_local);
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: usage.total(),
        input_cost: cost.input_cost,
        output_cost: cost.output_cost,
        total_cost: cost.total_cost,
        local: is_local,
    }
}
