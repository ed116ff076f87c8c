//! Model lists and descriptors from built-in tables, listing endpoints, and metadata

use async_trait::async_trait;
use reqwest::Client;

use super::ModelSource;
use super::catalog;
use super::descriptor::ModelDescriptor;
use super::metadata::MetadataSource;
use crate::failure::{FailureOrigin, ProviderFailure};
use crate::protocol::anthropic::AnthropicModelList;
use crate::protocol::google::GoogleModelList;
use crate::protocol::openai::{OpenAiModel, OpenAiModelList};
use crate::provider::{authorize, endpoint, read_json, send};
use crate::registry::{ListingStrategy, ProviderFamily, ResolvedProvider};

/// Production [`ModelSource`]
pub struct CatalogSource {
    client: Client,
    metadata: MetadataSource,
}

impl CatalogSource {
    pub const fn new(client: Client, metadata: MetadataSource) -> Self {
        Self { client, metadata }
    }

    /// Fetch from an `OpenAI`-compatible `/models` endpoint
    async fn fetch_openai_models(&self, provider: &ResolvedProvider) -> Result<Vec<OpenAiModel>, ProviderFailure> {
        let Some(base_url) = &provider.base_url else {
            return Err(no_base_url(provider));
        };
        let builder = authorize(
            self.client.get(endpoint(base_url, "models")),
            provider.spec.family,
            provider.api_key(),
        );
        let body: OpenAiModelList = read_json(send(builder, provider.name()).await?).await?;
        Ok(body.data)
    }

    async fn dynamic_models(&self, provider: &ResolvedProvider) -> Result<Vec<ModelDescriptor>, ProviderFailure> {
        if provider.base_url.is_none() {
            tracing::warn!(provider = %provider.name(), "no base URL configured; model list is empty");
            return Ok(Vec::new());
        }

        let listed = self.fetch_openai_models(provider).await?;
        tracing::debug!(provider = %provider.name(), count = listed.len(), "discovered models");

        let mut models = Vec::with_capacity(listed.len());
        for model in listed {
            let descriptor = self
                .metadata
                .enrich(provider.spec.metadata_key, ModelDescriptor::fallback(&model.id))
                .await;
            models.push(apply_listing(descriptor, &model));
        }
        Ok(models)
    }

    async fn hybrid_models(&self, provider: &ResolvedProvider) -> Vec<ModelDescriptor> {
        let mut models = Vec::new();
        for id in catalog::hybrid_ids(provider.name()) {
            models.push(
                self.metadata
                    .enrich(provider.spec.metadata_key, ModelDescriptor::fallback(id))
                    .await,
            );
        }
        models
    }
}

#[async_trait]
impl ModelSource for CatalogSource {
    async fn list(&self, provider: &ResolvedProvider) -> Result<Vec<ModelDescriptor>, ProviderFailure> {
        match provider.spec.listing {
            ListingStrategy::Static => Ok(catalog::static_models(provider.name()).unwrap_or_default()),
            ListingStrategy::Hybrid => Ok(self.hybrid_models(provider).await),
            ListingStrategy::Dynamic => self.dynamic_models(provider).await,
        }
    }

    async fn describe(&self, provider: &ResolvedProvider, model_id: &str) -> ModelDescriptor {
        let known = match provider.spec.listing {
            ListingStrategy::Static => catalog::static_models(provider.name())
                .and_then(|models| models.into_iter().find(|m| m.id == model_id)),
            // Dynamic listings are consulted by the cache before this is called
            ListingStrategy::Hybrid | ListingStrategy::Dynamic => None,
        };
        if let Some(descriptor) = known {
            return descriptor;
        }

        if let Some(model) = self.metadata.lookup(provider.spec.metadata_key, model_id).await {
            return super::metadata::apply(ModelDescriptor::fallback(model_id), &model);
        }

        tracing::debug!(provider = %provider.name(), model = %model_id, "unknown model, using default capabilities");
        ModelDescriptor::fallback(model_id)
    }

    async fn probe(&self, provider: &ResolvedProvider) -> Result<(), ProviderFailure> {
        match provider.spec.family {
            ProviderFamily::OpenAi => self.fetch_openai_models(provider).await.map(drop),
            ProviderFamily::Anthropic => {
                let base_url = provider.base_url.as_ref().ok_or_else(|| no_base_url(provider))?;
                let builder = authorize(
                    self.client.get(endpoint(base_url, "models")),
                    ProviderFamily::Anthropic,
                    provider.api_key(),
                );
                read_json::<AnthropicModelList>(send(builder, provider.name()).await?)
                    .await
                    .map(drop)
            }
            ProviderFamily::Google => {
                let base_url = provider.base_url.as_ref().ok_or_else(|| no_base_url(provider))?;
                let builder = authorize(
                    self.client.get(endpoint(base_url, "models")),
                    ProviderFamily::Google,
                    provider.api_key(),
                );
                let body: GoogleModelList = read_json(send(builder, provider.name()).await?).await?;
                let chat_models = body
                    .models
                    .iter()
                    .filter(|m| m.supported_generation_methods.iter().any(|method| method == "generateContent"))
                    .count();
                tracing::debug!(provider = %provider.name(), count = chat_models, "credential accepted");
                Ok(())
            }
        }
    }
}

fn no_base_url(provider: &ResolvedProvider) -> ProviderFailure {
    ProviderFailure::new(
        FailureOrigin::Transport,
        format!("no base URL configured for {}", provider.name()),
    )
}

/// Listing details, when present, are more specific than metadata
fn apply_listing(mut descriptor: ModelDescriptor, model: &OpenAiModel) -> ModelDescriptor {
    if let Some(name) = model.name.as_ref().filter(|n| !n.is_empty()) {
        descriptor.display_name.clone_from(name);
    }
    if let Some(context) = model.context_length.filter(|c| *c > 0) {
        descriptor.context_window = context;
    }
    if let Some(parameters) = &model.supported_parameters {
        descriptor.supports_tools = parameters.iter().any(|p| p == "tools");
        descriptor.is_reasoning_model = parameters.iter().any(|p| p == "reasoning" || p == "include_reasoning");
    }
    if let Some(architecture) = &model.architecture {
        descriptor.supports_vision = architecture.input_modalities.iter().any(|m| m == "image");
        descriptor.supports_pdf = architecture.input_modalities.iter().any(|m| m == "file");
    }
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_extras_map_into_descriptor() {
        let model: OpenAiModel = serde_json::from_value(serde_json::json!({
            "id": "deepseek/deepseek-r1",
            "name": "DeepSeek: R1",
            "context_length": 163_840,
            "supported_parameters": ["max_tokens", "reasoning", "include_reasoning"],
            "architecture": {"input_modalities": ["text", "file"]}
        }))
        .unwrap();

        let descriptor = apply_listing(ModelDescriptor::fallback(&model.id), &model);
        assert_eq!(descriptor.display_name, "DeepSeek: R1");
        assert_eq!(descriptor.context_window, 163_840);
        assert!(!descriptor.supports_tools);
        assert!(descriptor.is_reasoning_model);
        assert!(descriptor.supports_pdf);
        assert!(!descriptor.supports_vision);
    }

    #[test]
    fn plain_listing_keeps_existing_capabilities() {
        let model: OpenAiModel = serde_json::from_value(serde_json::json!({"id": "llama3.1:8b"})).unwrap();
        let mut base = ModelDescriptor::fallback("llama3.1:8b");
        base.is_reasoning_model = true;

        assert_eq!(apply_listing(base.clone(), &model), base);
    }
}
