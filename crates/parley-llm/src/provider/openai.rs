//! OpenAI-compatible provider implementation

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use super::{
    Provider, ProviderCompletion, ProviderStream, ProviderStreamItem, authorize, endpoint, event_stream, parse_event,
    read_json, require_base_url, send, wrong_family,
};
use crate::canonicalize::{ProviderCallParams, WireRequest};
use crate::convert::openai::OpenAiStreamState;
use crate::failure::{FailureOrigin, ProviderFailure};
use crate::protocol::openai::{
    OpenAiErrorResponse, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions,
};
use crate::registry::ResolvedProvider;

/// Client for `OpenAI` and every host speaking its chat completions dialect
pub struct OpenAiProvider {
    provider: Arc<ResolvedProvider>,
    client: Client,
}

impl OpenAiProvider {
    pub const fn new(provider: Arc<ResolvedProvider>, client: Client) -> Self {
        Self { provider, client }
    }

    fn wire_request<'a>(&self, params: &'a ProviderCallParams) -> Result<&'a OpenAiRequest, ProviderFailure> {
        match &params.request {
            WireRequest::OpenAi(request) => Ok(request),
            _ => Err(wrong_family(self.name(), "OpenAI")),
        }
    }

    /// Build the chat completions URL
    fn completions_url(&self) -> Result<String, ProviderFailure> {
        let base = require_base_url(self.provider.base_url.as_ref(), self.name())?;
        Ok(endpoint(base, "chat/completions"))
    }

    async fn post(&self, body: &OpenAiRequest) -> Result<reqwest::Response, ProviderFailure> {
        let builder = self.client.post(self.completions_url()?).json(body);
        let builder = authorize(builder, self.provider.spec.family, self.provider.api_key());
        send(builder, self.name()).await
    }
}

/// Mid-stream error envelope, if the payload is one
fn stream_error(data: &str) -> Option<ProviderFailure> {
    let envelope: OpenAiErrorResponse = serde_json::from_str(data).ok()?;
    let mut failure = ProviderFailure::new(FailureOrigin::Stream, envelope.error.message);
    if let Some(vendor_type) = envelope.error.error_type {
        failure = failure.with_vendor_type(vendor_type);
    }
    failure.status = envelope
        .error
        .code
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());
    Some(failure)
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn complete(&self, params: &ProviderCallParams) -> Result<ProviderCompletion, ProviderFailure> {
        let request = self.wire_request(params)?;
        let response = self.post(request).await?;
        let wire_response: OpenAiResponse = read_json(response).await?;
        Ok(wire_response.into())
    }

    async fn stream(&self, params: &ProviderCallParams) -> Result<ProviderStream, ProviderFailure> {
        let mut request = self.wire_request(params)?.clone();
        request.stream = Some(true);

        // Several compatible hosts reject the unknown parameter
        if self.provider.spec.stream_usage {
            request.stream_options = Some(OpenAiStreamOptions { include_usage: true });
        }

        let response = self.post(&request).await?;

        let mut state = OpenAiStreamState::new();
        Ok(event_stream(response, move |data| {
            if data == "[DONE]" {
                return Ok(state.done());
            }
            if let Some(failure) = stream_error(data) {
                return Ok(vec![ProviderStreamItem::Error(failure)]);
            }
            let chunk: OpenAiStreamChunk = parse_event(data)?;
            Ok(state.convert_chunk(&chunk))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mid_stream_error_envelope() {
        let failure = stream_error(r#"{"error":{"message":"Rate limit reached","type":"rate_limit_error","code":429}}"#)
            .unwrap();
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.vendor_type.as_deref(), Some("rate_limit_error"));

        assert!(stream_error(r#"{"id":"c1","choices":[]}"#).is_none());
    }
}
