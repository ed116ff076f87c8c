//! Programmatic configuration builder for integration tests

use std::time::Duration;

use parley_config::{Config, ProviderConfig};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Minimal defaults with the metadata catalog switched off
    pub fn new() -> Self {
        let mut config = Config::default();
        config.models.metadata_enabled = false;
        Self { config }
    }

    /// Point a provider at a mock backend with a test key
    pub fn with_provider(mut self, name: &str, base_url: &str) -> Self {
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig {
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                default_model: Some("mock-model-1".to_owned()),
                enabled: true,
            },
        );
        self
    }

    /// Configure a provider without any credential
    pub fn with_keyless_provider(mut self, name: &str, base_url: &str) -> Self {
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig {
                base_url: Some(base_url.parse().expect("valid URL")),
                ..ProviderConfig::default()
            },
        );
        self
    }

    pub fn with_usage_wait(mut self, wait: Duration) -> Self {
        self.config.streaming.usage_wait = wait;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
