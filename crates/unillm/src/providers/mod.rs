//! Concrete provider adapters
//!
//! This module contains one [`ProviderAdapter`] per wire dialect and the
//! factory that maps service names onto them.

pub mod anthropic;
pub mod chat_completions;
pub mod google;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use chat_completions::{ChatCompletionsAdapter, ReasoningStyle};
pub use google::GoogleAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;

use crate::config::AdapterConfig;
use crate::provider::ProviderAdapter;
use crate::{LLMError, Result};
use std::sync::Arc;

/// Every service name [`create_adapter`] understands
pub const SERVICES: [&str; 10] = [
    "openai",
    "anthropic",
    "google",
    "ollama",
    "groq",
    "deepseek",
    "xai",
    "openrouter",
    "llamafile",
    "apiv1",
];

/// Built-in configuration (base URL, auth style) for a service
pub fn default_config(service: &str) -> Result<AdapterConfig> {
    Ok(match service {
        "openai" => OpenAIAdapter::default_config(),
        "anthropic" => AnthropicAdapter::default_config(),
        "google" => GoogleAdapter::default_config(),
        "ollama" => OllamaAdapter::default_config(),
        "groq" => ChatCompletionsAdapter::groq_config(),
        "deepseek" => ChatCompletionsAdapter::deepseek_config(),
        "xai" => ChatCompletionsAdapter::xai_config(),
        "openrouter" => ChatCompletionsAdapter::openrouter_config(),
        "llamafile" => ChatCompletionsAdapter::llamafile_config(),
        "apiv1" => ChatCompletionsAdapter::apiv1_config(),
        other => {
            return Err(LLMError::ConfigurationError(format!(
                "Unknown service '{other}' (expected one of: {})",
                SERVICES.join(", ")
            )));
        }
    })
}

/// Build the adapter for `config.service`
pub fn create_adapter(config: AdapterConfig) -> Result<Arc<dyn ProviderAdapter>> {
    config.validate()?;
    let adapter: Arc<dyn ProviderAdapter> = match config.service.as_str() {
        "openai" => Arc::new(OpenAIAdapter::new(config)),
        "anthropic" => Arc::new(AnthropicAdapter::new(config)),
        "google" => Arc::new(GoogleAdapter::new(config)),
        "ollama" => Arc::new(OllamaAdapter::new(config)),
        "groq" => Arc::new(ChatCompletionsAdapter::groq(config)),
        "deepseek" => Arc::new(ChatCompletionsAdapter::deepseek(config)),
        "xai" => Arc::new(ChatCompletionsAdapter::xai(config)),
        "openrouter" => Arc::new(ChatCompletionsAdapter::openrouter(config)),
        "llamafile" => Arc::new(ChatCompletionsAdapter::llamafile(config)),
        "apiv1" => Arc::new(ChatCompletionsAdapter::new(config)),
        other => {
            return Err(LLMError::ConfigurationError(format!(
                "Unknown service '{other}'"
            )));
        }
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_service_has_a_config_and_adapter() {
        for service in SERVICES {
            let config = default_config(service).unwrap().with_api_key("key");
            let adapter = create_adapter(config).unwrap();
            assert_eq!(adapter.service(), service);
        }
    }

    #[test]
    fn test_local_services() {
        let local: Vec<&str> = SERVICES
            .iter()
            .copied()
            .filter(|s| default_config(s).unwrap().local)
            .collect();
        assert_eq!(local, vec!["ollama", "llamafile"]);
    }

    #[test]
    fn test_unknown_service() {
        assert!(matches!(
            default_config("mystery"),
            Err(LLMError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = default_config("anthropic").unwrap();
        assert!(create_adapter(config).is_err());
    }
}
