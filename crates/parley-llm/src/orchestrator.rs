//! Entry point tying the registry, model cache, canonicalizer, and clients together

use std::sync::Arc;
use std::time::Duration;

use parley_config::Config;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::canonicalize::{ProviderCallParams, build_request};
use crate::classify::{classify, missing_credential, report};
use crate::client::{ClientSelector, HttpProviderFactory, ProviderFactory};
use crate::error::LlmError;
use crate::failure::ProviderFailure;
use crate::models::{CatalogSource, MetadataSource, ModelCache, ModelDescriptor, ModelSource};
use crate::provider::ProviderCompletion;
use crate::registry::{ProviderDescriptor, ProviderRegistry, ResolvedProvider};
use crate::streaming::{self, DEFAULT_USAGE_WAIT, StreamRequest, StreamingCompletion};
use crate::types::{ChatCompletionOptions, ChatCompletionResponse};

/// Default freshness of cached model descriptors
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A provider resolved from the registry, with its model operations
#[derive(Clone)]
pub struct ProviderHandle {
    provider: Arc<ResolvedProvider>,
    models: Arc<ModelCache>,
}

impl ProviderHandle {
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn display_name(&self) -> &str {
        self.provider.spec.display_name
    }

    /// Model used when a request names none
    pub fn default_model(&self) -> &str {
        &self.provider.default_model
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        self.provider.descriptor()
    }

    /// Every model the provider offers, served from the cache when fresh
    pub async fn supported_models(&self) -> Result<Arc<Vec<ModelDescriptor>>, LlmError> {
        self.models
            .list_models(&self.provider)
            .await
            .map_err(|failure| report(&failure, self.name(), ""))
    }

    /// Check that the credential is present and accepted
    pub async fn authenticate(&self) -> Result<(), LlmError> {
        if !self.provider.configured() {
            return Err(missing_credential(self.name()));
        }
        self.models
            .probe(&self.provider)
            .await
            .map_err(|failure| classify(&failure, self.name()))
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle").field("name", &self.name()).finish()
    }
}

/// Multi-provider chat completion orchestrator
pub struct Orchestrator {
    registry: ProviderRegistry,
    models: Arc<ModelCache>,
    clients: ClientSelector,
    external_search: bool,
    usage_wait: Duration,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Build with HTTP clients from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let client = Client::new();
        let metadata = if config.models.metadata_enabled {
            MetadataSource::new(client.clone(), config.models.metadata_url.clone(), config.models.cache_ttl)
        } else {
            MetadataSource::disabled()
        };

        Self::builder()
            .registry(ProviderRegistry::from_config(&config.providers)?)
            .model_source(Arc::new(CatalogSource::new(client.clone(), metadata)))
            .provider_factory(Arc::new(HttpProviderFactory::new(client)))
            .cache_ttl(config.models.cache_ttl)
            .usage_wait(config.streaming.usage_wait)
            .external_search(config.search.has_external_key())
            .build()
    }

    /// Every enabled provider and whether it has a credential
    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.registry.list_providers()
    }

    pub fn get_provider(&self, name: &str) -> Result<ProviderHandle, LlmError> {
        Ok(ProviderHandle {
            provider: self.registry.resolve(name)?,
            models: Arc::clone(&self.models),
        })
    }

    /// Capabilities of one model; unknown ids get a conservative default
    pub async fn get_model(&self, provider: &str, model_id: &str) -> Result<ModelDescriptor, LlmError> {
        let provider = self.registry.resolve(provider)?;
        Ok(self.models.get_model(&provider, model_id).await)
    }

    /// Resolve the provider and model, then build the vendor request
    async fn prepare(
        &self,
        provider: &str,
        options: &ChatCompletionOptions,
    ) -> Result<(Arc<ResolvedProvider>, ProviderCallParams), LlmError> {
        let provider = self.registry.resolve(provider)?;
        let model_id = options
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&provider.default_model);
        if model_id.is_empty() {
            return Err(LlmError::configuration(
                provider.name(),
                format!("no model given and {} has no default model", provider.spec.display_name),
            ));
        }

        let descriptor = self.models.get_model(&provider, model_id).await;
        let params = build_request(&provider, &descriptor, options, self.external_search);
        tracing::debug!(
            provider = %params.provider,
            model = %params.model,
            tools_disabled = params.tools_disabled,
            reasoning = params.reasoning_requested,
            "prepared provider call"
        );
        Ok((provider, params))
    }

    /// `prepare` abandoned as soon as `cancel` fires
    async fn prepare_or_cancel(
        &self,
        provider: &str,
        options: &ChatCompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<(Arc<ResolvedProvider>, ProviderCallParams), LlmError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let model = options.model.as_deref().unwrap_or_default();
                Err(report(&ProviderFailure::cancelled(), provider, model))
            }
            prepared = self.prepare(provider, options) => prepared,
        }
    }

    pub async fn create_chat_completion(
        &self,
        provider: &str,
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResponse, LlmError> {
        self.create_chat_completion_with(provider, options, &CancellationToken::new())
            .await
    }

    /// Non-streaming completion that aborts when `cancel` fires
    pub async fn create_chat_completion_with(
        &self,
        provider: &str,
        options: &ChatCompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let (provider, params) = self.prepare_or_cancel(provider, options, cancel).await?;
        let client = self.clients.get(&provider, &params.model);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ProviderFailure::cancelled()),
            result = client.complete(&params) => result,
        };

        match result {
            Ok(completion) => Ok(into_response(completion, &params)),
            Err(failure) => {
                let failure = failure.with_request(params.request.to_json());
                Err(report(&failure, &params.provider, &params.model))
            }
        }
    }

    pub async fn create_streaming_chat_completion(
        &self,
        provider: &str,
        options: &ChatCompletionOptions,
    ) -> Result<StreamingCompletion, LlmError> {
        self.start_stream(provider, options, None).await
    }

    /// Streaming completion that also aborts when `cancel` fires
    pub async fn create_streaming_chat_completion_with(
        &self,
        provider: &str,
        options: &ChatCompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<StreamingCompletion, LlmError> {
        self.start_stream(provider, options, Some(cancel.clone())).await
    }

    async fn start_stream(
        &self,
        provider: &str,
        options: &ChatCompletionOptions,
        cancellation: Option<CancellationToken>,
    ) -> Result<StreamingCompletion, LlmError> {
        let (provider, params) = match &cancellation {
            Some(cancel) => self.prepare_or_cancel(provider, options, cancel).await?,
            None => self.prepare(provider, options).await?,
        };
        let client = self.clients.get(&provider, &params.model);
        Ok(streaming::spawn(StreamRequest {
            provider: client,
            params,
            usage_wait: self.usage_wait,
            cancellation,
        }))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("clients", &self.clients)
            .field("external_search", &self.external_search)
            .field("usage_wait", &self.usage_wait)
            .finish_non_exhaustive()
    }
}

/// Map a vendor completion to the caller's response
fn into_response(completion: ProviderCompletion, params: &ProviderCallParams) -> ChatCompletionResponse {
    if let Some(reason) = &completion.finish_reason
        && !reason.is_expected()
    {
        tracing::warn!(provider = %params.provider, reason = ?reason, "unexpected finish reason");
    }

    let (native, invocations): (Vec<_>, Vec<_>) = completion
        .tool_invocations
        .into_iter()
        .partition(|invocation| params.is_native_tool(&invocation.name));
    for invocation in &native {
        tracing::debug!(provider = %params.provider, tool = %invocation.name, "native tool executed by provider");
    }

    ChatCompletionResponse {
        id: if completion.id.is_empty() {
            format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
        } else {
            completion.id
        },
        model: if completion.model.is_empty() {
            params.model.clone()
        } else {
            completion.model
        },
        content: completion.content,
        tool_invocations: (!invocations.is_empty()).then_some(invocations),
        usage: completion.usage,
        tools_disabled: params.tools_disabled.then_some(true),
    }
}

/// Builder for [`Orchestrator`]
///
/// Every part has a default, so `Orchestrator::builder().build()` yields an
/// orchestrator backed by environment credentials and real HTTP clients.
#[derive(Default)]
pub struct OrchestratorBuilder {
    registry: Option<ProviderRegistry>,
    model_source: Option<Arc<dyn ModelSource>>,
    factory: Option<Arc<dyn ProviderFactory>>,
    cache_ttl: Option<Duration>,
    usage_wait: Option<Duration>,
    external_search: bool,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn model_source(mut self, source: Arc<dyn ModelSource>) -> Self {
        self.model_source = Some(source);
        self
    }

    #[must_use]
    pub fn provider_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn usage_wait(mut self, wait: Duration) -> Self {
        self.usage_wait = Some(wait);
        self
    }

    /// Whether an external search provider key is configured
    #[must_use]
    pub const fn external_search(mut self, enabled: bool) -> Self {
        self.external_search = enabled;
        self
    }

    pub fn build(self) -> Result<Orchestrator, LlmError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => ProviderRegistry::from_config(&parley_config::ProvidersConfig::new())?,
        };
        let model_source = self
            .model_source
            .unwrap_or_else(|| Arc::new(CatalogSource::new(Client::new(), MetadataSource::disabled())));
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(HttpProviderFactory::default()));

        Ok(Orchestrator {
            registry,
            models: Arc::new(ModelCache::new(model_source, self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL))),
            clients: ClientSelector::new(factory),
            external_search: self.external_search,
            usage_wait: self.usage_wait.unwrap_or(DEFAULT_USAGE_WAIT),
        })
    }
}
