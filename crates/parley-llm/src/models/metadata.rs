//! Third-party model metadata used to enrich hybrid and dynamic listings

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use super::cache::TtlCache;
use super::descriptor::ModelDescriptor;
use crate::protocol::models_dev::{MetadataCatalog, MetadataModel};

/// Fetches and searches the metadata catalog
///
/// The catalog is fetched at most once per TTL. A failed fetch yields an
/// empty catalog for that period and a warning.
pub struct MetadataSource {
    client: Client,
    url: Option<Url>,
    preloaded: Option<Arc<MetadataCatalog>>,
    catalog: TtlCache<(), Arc<MetadataCatalog>>,
}

impl MetadataSource {
    pub fn new(client: Client, url: Url, ttl: Duration) -> Self {
        Self {
            client,
            url: Some(url),
            preloaded: None,
            catalog: TtlCache::new(ttl),
        }
    }

    /// Source that never fetches and always answers from an empty catalog
    pub fn disabled() -> Self {
        Self::from_catalog(MetadataCatalog::new())
    }

    /// Source backed by a fixed catalog
    pub fn from_catalog(catalog: MetadataCatalog) -> Self {
        Self {
            client: Client::new(),
            url: None,
            preloaded: Some(Arc::new(catalog)),
            catalog: TtlCache::new(Duration::MAX),
        }
    }

    async fn catalog(&self) -> Arc<MetadataCatalog> {
        if let Some(catalog) = &self.preloaded {
            return Arc::clone(catalog);
        }
        let Some(url) = &self.url else {
            return Arc::default();
        };

        let fetched = self
            .catalog
            .get_or_try_fetch((), move || async move {
                let catalog = match self.fetch(url).await {
                    Ok(catalog) => {
                        tracing::debug!(providers = catalog.len(), "model metadata catalog loaded");
                        catalog
                    }
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "failed to load model metadata catalog");
                        MetadataCatalog::new()
                    }
                };
                Ok::<_, std::convert::Infallible>(Arc::new(catalog))
            })
            .await;

        match fetched {
            Ok(catalog) => catalog,
            Err(never) => match never {},
        }
    }

    async fn fetch(&self, url: &Url) -> Result<MetadataCatalog, reqwest::Error> {
        self.client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Find a model, preferring the given provider's section
    pub async fn lookup(&self, provider_key: Option<&str>, model_id: &str) -> Option<MetadataModel> {
        let catalog = self.catalog().await;
        find(&catalog, provider_key, model_id).cloned()
    }

    /// Apply catalog capabilities to a descriptor, when the model is known
    pub async fn enrich(&self, provider_key: Option<&str>, descriptor: ModelDescriptor) -> ModelDescriptor {
        match self.lookup(provider_key, &descriptor.id).await {
            Some(model) => apply(descriptor, &model),
            None => descriptor,
        }
    }
}

/// Candidate keys, most specific first
///
/// The normalized id, then its last path segment, then each of those without
/// a `:tag` or `@version` suffix.
fn lookup_keys(model_id: &str) -> Vec<String> {
    let normalized = model_id.trim().to_lowercase();
    let normalized = normalized.strip_prefix("models/").unwrap_or(&normalized).to_owned();

    let mut keys = vec![normalized.clone()];
    if let Some((_, segment)) = normalized.rsplit_once('/') {
        keys.push(segment.to_owned());
    }
    for key in keys.clone() {
        if let Some((prefix, _)) = key.split_once([':', '@']) {
            keys.push(prefix.to_owned());
        }
    }
    keys.retain(|k| !k.is_empty());
    keys.dedup();
    keys
}

fn find<'a>(catalog: &'a MetadataCatalog, provider_key: Option<&str>, model_id: &str) -> Option<&'a MetadataModel> {
    let keys = lookup_keys(model_id);
    let in_provider = |provider: &'a crate::protocol::models_dev::MetadataProvider| {
        keys.iter().find_map(|key| {
            provider.models.get(key.as_str()).or_else(|| {
                provider
                    .models
                    .iter()
                    .find(|(id, _)| id.to_lowercase() == *key)
                    .map(|(_, model)| model)
            })
        })
    };

    if let Some(found) = provider_key.and_then(|k| catalog.get(k)).and_then(in_provider) {
        return Some(found);
    }

    // Deterministic order for the global search
    let mut providers: Vec<_> = catalog.iter().collect();
    providers.sort_by(|a, b| a.0.cmp(b.0));
    providers.into_iter().find_map(|(_, provider)| in_provider(provider))
}

/// Catalog capabilities win over what the descriptor already says
pub fn apply(mut descriptor: ModelDescriptor, model: &MetadataModel) -> ModelDescriptor {
    if let Some(name) = model.name.as_ref().filter(|n| !n.is_empty())
        && descriptor.display_name == descriptor.id
    {
        descriptor.display_name.clone_from(name);
    }
    if let Some(context) = model.limit.context.filter(|c| *c > 0) {
        descriptor.context_window = u32::try_from(context).unwrap_or(u32::MAX);
    }
    descriptor.supports_tools = model.tool_call;
    descriptor.is_reasoning_model = model.reasoning;
    descriptor.supports_vision = model.modalities.input.iter().any(|m| m == "image");
    descriptor.supports_pdf = model.modalities.input.iter().any(|m| m == "pdf");
    descriptor
}
