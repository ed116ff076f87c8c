//! Anthropic Messages API provider implementation

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use super::{
    Provider, ProviderCompletion, ProviderStream, authorize, endpoint, event_stream, parse_event, read_json,
    require_base_url, send, wrong_family,
};
use crate::canonicalize::{ProviderCallParams, WireRequest};
use crate::convert::anthropic::AnthropicStreamState;
use crate::failure::ProviderFailure;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::registry::ResolvedProvider;

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    provider: Arc<ResolvedProvider>,
    client: Client,
}

impl AnthropicProvider {
    pub const fn new(provider: Arc<ResolvedProvider>, client: Client) -> Self {
        Self { provider, client }
    }

    fn wire_request<'a>(&self, params: &'a ProviderCallParams) -> Result<&'a AnthropicRequest, ProviderFailure> {
        match &params.request {
            WireRequest::Anthropic(request) => Ok(request),
            _ => Err(wrong_family(self.name(), "Anthropic")),
        }
    }

    async fn post(&self, body: &AnthropicRequest) -> Result<reqwest::Response, ProviderFailure> {
        let base = require_base_url(self.provider.base_url.as_ref(), self.name())?;
        let builder = self.client.post(endpoint(base, "messages")).json(body);
        let builder = authorize(builder, self.provider.spec.family, self.provider.api_key());
        send(builder, self.name()).await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn complete(&self, params: &ProviderCallParams) -> Result<ProviderCompletion, ProviderFailure> {
        let request = self.wire_request(params)?;
        let response = self.post(request).await?;
        let wire_response: AnthropicResponse = read_json(response).await?;
        Ok(wire_response.into())
    }

    async fn stream(&self, params: &ProviderCallParams) -> Result<ProviderStream, ProviderFailure> {
        let mut request = self.wire_request(params)?.clone();
        request.stream = Some(true);

        let response = self.post(&request).await?;

        let mut state = AnthropicStreamState::new();
        Ok(event_stream(response, move |data| {
            let event: AnthropicStreamEvent = parse_event(data)?;
            Ok(state.convert_event(event))
        }))
    }
}
