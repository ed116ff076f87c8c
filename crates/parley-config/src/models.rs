use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Third-party model metadata catalog
const DEFAULT_METADATA_URL: &str = "https://models.dev/api.json";

/// Model descriptor cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// How long a resolved model descriptor stays fresh
    #[serde(default = "default_cache_ttl", deserialize_with = "crate::duration::deserialize")]
    pub cache_ttl: Duration,
    /// Catalog used to enrich static model lists
    #[serde(default = "default_metadata_url")]
    pub metadata_url: Url,
    /// Disable to rely on static tables and listing endpoints only
    #[serde(default = "default_metadata_enabled")]
    pub metadata_enabled: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            metadata_url: default_metadata_url(),
            metadata_enabled: true,
        }
    }
}

/// Streaming completion settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamingConfig {
    /// Upper bound on waiting for usage data after the finish signal
    #[serde(default = "default_usage_wait", deserialize_with = "crate::duration::deserialize")]
    pub usage_wait: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            usage_wait: default_usage_wait(),
        }
    }
}

/// External web search provider
///
/// When a key is present the caller's own `web_search` tool is always used,
/// even on providers with a built-in search tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// API key of the external search service
    #[serde(default)]
    pub api_key: Option<SecretString>,
}

impl SearchConfig {
    /// Whether an external search key is configured
    pub const fn has_external_key(&self) -> bool {
        self.api_key.is_some()
    }
}

const fn default_cache_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

const fn default_usage_wait() -> Duration {
    Duration::from_millis(50)
}

#[allow(clippy::missing_const_for_fn)]
fn default_metadata_enabled() -> bool {
    true
}

fn default_metadata_url() -> Url {
    Url::parse(DEFAULT_METADATA_URL).expect("valid default URL")
}
