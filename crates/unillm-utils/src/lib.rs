//! Shared utilities for unillm
//!
//! This crate provides the pieces of host-environment plumbing used across
//! the unillm workspace: tracing setup and environment lookups for API keys
//! and debug flags.

pub mod env;
pub mod logging;

pub use env::{api_key_env_var, env_api_key};
pub use logging::{init_tracing, init_tracing_with_filter};
