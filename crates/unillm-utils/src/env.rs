//! Environment lookups
//!
//! API keys are sourced from `${SERVICE}_API_KEY` when the caller does not
//! pass one explicitly.

/// Name of the environment variable holding the API key for `service`
///
/// The service name is uppercased and `-`/`.` become `_`, so `openrouter`
/// maps to `OPENROUTER_API_KEY` and `my-proxy` to `MY_PROXY_API_KEY`.
pub fn api_key_env_var(service: &str) -> String {
    let normalized: String = service
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    format!("{normalized}_API_KEY")
}

/// Read the API key for `service` from the environment
///
/// Empty values are treated as unset.
pub fn env_api_key(service: &str) -> Option<String> {
    std::env::var(api_key_env_var(service))
        .ok()
        .filter(|key| !key.trim().is_empty())
}
