//! Google Generative Language API provider implementation

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use super::{
    Provider, ProviderCompletion, ProviderStream, ProviderStreamItem, authorize, endpoint, event_stream, parse_event,
    read_json, require_base_url, send, wrong_family,
};
use crate::canonicalize::{ProviderCallParams, WireRequest};
use crate::convert::google::{GoogleStreamState, failure_from_stream_error};
use crate::failure::ProviderFailure;
use crate::protocol::google::{GoogleRequest, GoogleResponse, GoogleStreamChunk};
use crate::registry::ResolvedProvider;

/// Google Gemini provider
pub struct GoogleProvider {
    provider: Arc<ResolvedProvider>,
    client: Client,
}

impl GoogleProvider {
    pub const fn new(provider: Arc<ResolvedProvider>, client: Client) -> Self {
        Self { provider, client }
    }

    fn wire_request<'a>(&self, params: &'a ProviderCallParams) -> Result<&'a GoogleRequest, ProviderFailure> {
        match &params.request {
            WireRequest::Google(request) => Ok(request),
            _ => Err(wrong_family(self.name(), "Google")),
        }
    }

    /// Build a model method URL such as `models/gemini-2.5-flash:generateContent`
    fn model_url(&self, model: &str, method: &str) -> Result<String, ProviderFailure> {
        let base = require_base_url(self.provider.base_url.as_ref(), self.name())?;
        let model = model.strip_prefix("models/").unwrap_or(model);
        Ok(endpoint(base, &format!("models/{model}:{method}")))
    }

    async fn post(&self, url: String, body: &GoogleRequest) -> Result<reqwest::Response, ProviderFailure> {
        let builder = self.client.post(url).json(body);
        let builder = authorize(builder, self.provider.spec.family, self.provider.api_key());
        send(builder, self.name()).await
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn complete(&self, params: &ProviderCallParams) -> Result<ProviderCompletion, ProviderFailure> {
        let request = self.wire_request(params)?;
        let url = self.model_url(&params.model, "generateContent")?;
        let response = self.post(url, request).await?;
        let wire_response: GoogleResponse = read_json(response).await?;

        let mut completion = ProviderCompletion::from(wire_response);
        if completion.model.is_empty() {
            completion.model.clone_from(&params.model);
        }
        Ok(completion)
    }

    async fn stream(&self, params: &ProviderCallParams) -> Result<ProviderStream, ProviderFailure> {
        let request = self.wire_request(params)?;
        let url = self.model_url(&params.model, "streamGenerateContent?alt=sse")?;
        let response = self.post(url, request).await?;

        let mut state = GoogleStreamState::new();
        Ok(event_stream(response, move |data| match parse_event(data)? {
            GoogleStreamChunk::Error(error) => Ok(vec![ProviderStreamItem::Error(failure_from_stream_error(&error))]),
            GoogleStreamChunk::Response(chunk) => Ok(state.convert_chunk(&chunk)),
        }))
    }
}
