//! Logging and tracing utilities
//!
//! Every unillm module logs under its own module path, so enabling a single
//! area is an `EnvFilter` directive such as `unillm::stream=debug`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a filter directive for unillm diagnostics
pub const DEBUG_ENV_VAR: &str = "UNILLM_DEBUG";

/// Initialize tracing subscriber with default configuration
///
/// The filter comes from `UNILLM_DEBUG` when set, then `RUST_LOG`, and falls
/// back to `info`.
pub fn init_tracing() {
    let filter = std::env::var(DEBUG_ENV_VAR)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    install(filter);
}

/// Initialize tracing with an explicit filter directive (e.g. `unillm::providers=debug`)
///
/// An unparsable directive falls back to `info`.
pub fn init_tracing_with_filter(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter);
}

fn install(filter: EnvFilter) {
    // A second initialisation (tests, embedding applications) is not an error.
    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
