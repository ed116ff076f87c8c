//! Per-(provider, model) client cache

use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Client;

use crate::provider::Provider;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::google::GoogleProvider;
use crate::provider::openai::OpenAiProvider;
use crate::registry::{ProviderFamily, ResolvedProvider};

/// Builds a vendor client for a resolved provider
pub trait ProviderFactory: Send + Sync {
    fn create(&self, provider: &Arc<ResolvedProvider>, model: &str) -> Arc<dyn Provider>;
}

/// Factory for the real HTTP clients, sharing one connection pool
#[derive(Debug, Clone, Default)]
pub struct HttpProviderFactory {
    client: Client,
}

impl HttpProviderFactory {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, provider: &Arc<ResolvedProvider>, _model: &str) -> Arc<dyn Provider> {
        let provider = Arc::clone(provider);
        let client = self.client.clone();
        match provider.spec.family {
            ProviderFamily::OpenAi => Arc::new(OpenAiProvider::new(provider, client)),
            ProviderFamily::Anthropic => Arc::new(AnthropicProvider::new(provider, client)),
            ProviderFamily::Google => Arc::new(GoogleProvider::new(provider, client)),
        }
    }
}

/// Get-or-create cache of vendor clients
pub struct ClientSelector {
    factory: Arc<dyn ProviderFactory>,
    clients: DashMap<(String, String), Arc<dyn Provider>>,
}

impl ClientSelector {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
        }
    }

    /// Client for a provider and model, created on first use
    pub fn get(&self, provider: &Arc<ResolvedProvider>, model: &str) -> Arc<dyn Provider> {
        let key = (provider.name().to_owned(), model.to_owned());
        let entry = self.clients.entry(key).or_insert_with(|| {
            tracing::debug!(provider = %provider.name(), model = %model, "creating provider client");
            self.factory.create(provider, model)
        });
        Arc::clone(entry.value())
    }

    /// Number of cached clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop every cached client
    pub fn clear(&self) {
        self.clients.clear();
    }
}

impl std::fmt::Debug for ClientSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSelector").field("clients", &self.clients.len()).finish()
    }
}
