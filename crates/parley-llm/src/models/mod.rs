//! Model descriptors, their sources, and the TTL cache in front of them

mod cache;
pub mod catalog;
mod descriptor;
pub mod listing;
pub mod metadata;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use cache::TtlCache;
pub use descriptor::{FALLBACK_CONTEXT_WINDOW, ModelDescriptor};
pub use listing::CatalogSource;
pub use metadata::MetadataSource;

use crate::failure::ProviderFailure;
use crate::registry::{ListingStrategy, ResolvedProvider};

/// Where model lists and descriptors come from
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Every model the provider offers
    async fn list(&self, provider: &ResolvedProvider) -> Result<Vec<ModelDescriptor>, ProviderFailure>;

    /// Capabilities of one model absent from any dynamic listing
    ///
    /// Unknown ids get a conservative default.
    async fn describe(&self, provider: &ResolvedProvider, model_id: &str) -> ModelDescriptor;

    /// Cheap authenticated call proving the credential works
    async fn probe(&self, provider: &ResolvedProvider) -> Result<(), ProviderFailure>;
}

/// TTL-bounded, single-flight cache of model descriptors and lists
pub struct ModelCache {
    source: Arc<dyn ModelSource>,
    descriptors: TtlCache<(String, String), ModelDescriptor>,
    lists: TtlCache<String, Arc<Vec<ModelDescriptor>>>,
}

impl ModelCache {
    pub fn new(source: Arc<dyn ModelSource>, ttl: Duration) -> Self {
        Self {
            source,
            descriptors: TtlCache::new(ttl),
            lists: TtlCache::new(ttl),
        }
    }

    /// Descriptor for `(provider, model_id)`
    ///
    /// Dynamic providers are resolved through the cached listing. When that
    /// listing fails, a fallback is returned without being cached so the
    /// next lookup retries.
    pub async fn get_model(&self, provider: &ResolvedProvider, model_id: &str) -> ModelDescriptor {
        let key = (provider.name().to_owned(), model_id.to_owned());
        let described = self
            .descriptors
            .get_or_try_fetch(key, move || async move {
                if provider.spec.listing == ListingStrategy::Dynamic {
                    let listed = self.list_models(provider).await?;
                    if let Some(descriptor) = listed.iter().find(|m| m.id.eq_ignore_ascii_case(model_id)) {
                        return Ok(descriptor.clone());
                    }
                }
                Ok::<_, ProviderFailure>(self.source.describe(provider, model_id).await)
            })
            .await;

        described.unwrap_or_else(|failure| {
            tracing::warn!(
                provider = %provider.name(),
                model = %model_id,
                error = %failure,
                "model listing failed; using default capabilities"
            );
            ModelDescriptor::fallback(model_id)
        })
    }

    /// Every model the provider offers; failures are not cached
    pub async fn list_models(&self, provider: &ResolvedProvider) -> Result<Arc<Vec<ModelDescriptor>>, ProviderFailure> {
        let source = &self.source;
        self.lists
            .get_or_try_fetch(provider.name().to_owned(), move || async move {
                source.list(provider).await.map(Arc::new)
            })
            .await
    }

    /// Authenticated probe, never cached
    pub async fn probe(&self, provider: &ResolvedProvider) -> Result<(), ProviderFailure> {
        self.source.probe(provider).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures_util::future::join_all;
    use parley_config::ProvidersConfig;

    use super::*;
    use crate::failure::FailureOrigin;
    use crate::registry::ProviderRegistry;

    #[derive(Default)]
    struct CountingSource {
        describes: AtomicU32,
        lists: AtomicU32,
        fail_lists: bool,
    }

    #[async_trait]
    impl ModelSource for CountingSource {
        async fn list(&self, _: &ResolvedProvider) -> Result<Vec<ModelDescriptor>, ProviderFailure> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if self.fail_lists {
                return Err(ProviderFailure::new(FailureOrigin::Transport, "offline"));
            }
            Ok(vec![ModelDescriptor::fallback("a"), ModelDescriptor::fallback("b")])
        }

        async fn describe(&self, _: &ResolvedProvider, model_id: &str) -> ModelDescriptor {
            self.describes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            ModelDescriptor::fallback(model_id)
        }

        async fn probe(&self, _: &ResolvedProvider) -> Result<(), ProviderFailure> {
            Ok(())
        }
    }

    fn provider(name: &str) -> Arc<ResolvedProvider> {
        ProviderRegistry::with_env(&ProvidersConfig::new(), |_| None)
            .unwrap()
            .resolve(name)
            .unwrap()
    }

    #[tokio::test]
    async fn concurrent_lookups_describe_once() {
        let source = Arc::new(CountingSource::default());
        let cache = ModelCache::new(source.clone(), Duration::from_secs(3600));
        let openai = provider("openai");

        let results = join_all((0..5).map(|_| cache.get_model(&openai, "gpt-4.1"))).await;
        assert!(results.iter().all(|d| d.id == "gpt-4.1"));
        assert_eq!(source.describes.load(Ordering::SeqCst), 1);

        // same id on another provider is a separate entry
        cache.get_model(&provider("groq"), "gpt-4.1").await;
        assert_eq!(source.describes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lists_are_cached_per_provider() {
        let source = Arc::new(CountingSource::default());
        let cache = ModelCache::new(source.clone(), Duration::from_secs(3600));
        let ollama = provider("ollama");

        assert_eq!(cache.list_models(&ollama).await.unwrap().len(), 2);
        assert_eq!(cache.list_models(&ollama).await.unwrap().len(), 2);
        assert_eq!(source.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_lists_are_retried() {
        let source = Arc::new(CountingSource {
            fail_lists: true,
            ..CountingSource::default()
        });
        let cache = ModelCache::new(source.clone(), Duration::from_secs(3600));
        let ollama = provider("ollama");

        assert!(cache.list_models(&ollama).await.is_err());
        assert!(cache.list_models(&ollama).await.is_err());
        assert_eq!(source.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dynamic_descriptors_come_from_the_cached_listing() {
        let source = Arc::new(CountingSource::default());
        let cache = ModelCache::new(source.clone(), Duration::from_secs(3600));
        let ollama = provider("ollama");

        assert_eq!(cache.get_model(&ollama, "a").await.id, "a");
        assert_eq!(cache.get_model(&ollama, "b").await.id, "b");
        assert_eq!(source.lists.load(Ordering::SeqCst), 1);
        assert_eq!(source.describes.load(Ordering::SeqCst), 0);

        // not in the listing
        cache.get_model(&ollama, "qwen3").await;
        assert_eq!(source.describes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_listing_fallback_is_not_cached() {
        let source = Arc::new(CountingSource {
            fail_lists: true,
            ..CountingSource::default()
        });
        let cache = ModelCache::new(source.clone(), Duration::from_secs(3600));
        let ollama = provider("ollama");

        assert_eq!(cache.get_model(&ollama, "qwen3").await, ModelDescriptor::fallback("qwen3"));
        assert_eq!(source.lists.load(Ordering::SeqCst), 1);

        cache.get_model(&ollama, "qwen3").await;
        assert_eq!(source.lists.load(Ordering::SeqCst), 2);
        assert_eq!(source.describes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn static_and_unknown_models_through_catalog_source() {
        let source = Arc::new(CatalogSource::new(reqwest::Client::new(), MetadataSource::disabled()));
        let cache = ModelCache::new(source, Duration::from_secs(3600));
        let anthropic = provider("anthropic");

        let known = cache.get_model(&anthropic, "claude-sonnet-4-20250514").await;
        assert!(known.is_reasoning_model);
        assert_eq!(known.context_window, 200_000);

        let unknown = cache.get_model(&anthropic, "claude-next").await;
        assert_eq!(unknown, ModelDescriptor::fallback("claude-next"));

        let listed = cache.list_models(&anthropic).await.unwrap();
        assert!(listed.iter().any(|m| m.id == "claude-3-5-haiku-20241022"));
    }

    #[tokio::test]
    async fn dynamic_provider_without_base_url_lists_nothing() {
        let source = Arc::new(CatalogSource::new(reqwest::Client::new(), MetadataSource::disabled()));
        let cache = ModelCache::new(source, Duration::from_secs(3600));

        let listed = cache.list_models(&provider("openai-compatible")).await.unwrap();
        assert!(listed.is_empty());
    }
}
