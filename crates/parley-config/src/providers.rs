use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Provider settings keyed by provider name (e.g. `anthropic`, `ollama`)
pub type ProvidersConfig = IndexMap<String, ProviderConfig>;

/// Credentials and overrides for a single provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key; takes precedence over the provider's environment variable
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model used when a request leaves the model empty
    #[serde(default)]
    pub default_model: Option<String>,
    /// Set to `false` to hide the provider entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_model: None,
            enabled: true,
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_enabled() -> bool {
    true
}
