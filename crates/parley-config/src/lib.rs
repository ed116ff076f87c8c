//! Configuration for Parley
//!
//! Loaded from a TOML file with `{{ env.VAR }}` placeholder expansion.
//! Every section is optional so an empty file (or no file at all) yields
//! a usable configuration that relies on environment credentials.

#![allow(clippy::must_use_candidate)]

mod duration;
mod env;
mod loader;
pub mod logging;
pub mod models;
pub mod providers;

use serde::Deserialize;

pub use env::ExpandError;
pub use logging::{LogFormat, LoggingConfig};
pub use models::{ModelsConfig, SearchConfig, StreamingConfig};
pub use providers::{ProviderConfig, ProvidersConfig};

/// Top-level Parley configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Per-provider credentials and overrides keyed by provider name
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// External web search settings
    #[serde(default)]
    pub search: SearchConfig,
    /// Model descriptor cache and metadata source
    #[serde(default)]
    pub models: ModelsConfig,
    /// Streaming behaviour
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}
