//! Vendor HTTP clients
//!
//! A [`Provider`] sends an already-built wire request and yields either a
//! [`ProviderCompletion`] or a stream of vendor-neutral
//! [`ProviderStreamItem`]s. Classification into typed errors happens later.

pub mod anthropic;
pub mod google;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::canonicalize::ProviderCallParams;
use crate::failure::{FailureOrigin, ProviderFailure};
use crate::protocol::anthropic::ANTHROPIC_VERSION;
use crate::registry::ProviderFamily;
use crate::types::{FinishReason, ToolInvocation, Usage};

/// Vendor-neutral item yielded by a provider stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStreamItem {
    /// Vendor response metadata
    ResponseStart { id: String, model: String },
    TextDelta(String),
    ReasoningDelta(String),
    /// Reasoning block closed
    ReasoningEnd {
        usage: Option<Usage>,
        total_usage: Option<Usage>,
    },
    /// Fully assembled tool call
    ToolCall(ToolInvocation),
    /// Usage report outside of the finish signal
    Usage(Usage),
    /// Authoritative end of generation
    Finish { reason: FinishReason, usage: Option<Usage> },
    /// In-stream vendor failure
    Error(ProviderFailure),
    /// Transport gave up before the finish signal
    Abort,
    /// Vendor event with no canonical counterpart
    Other(String),
}

/// Boxed stream of provider items
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderStreamItem, ProviderFailure>> + Send>>;

/// Result of a non-streaming call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCompletion {
    pub id: String,
    pub model: String,
    pub content: String,
    /// Every tool call, native ones included
    pub tool_invocations: Vec<ToolInvocation>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
}

/// Trait implemented by each vendor family client
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name from the registry
    fn name(&self) -> &str;

    /// Send a non-streaming completion request
    async fn complete(&self, params: &ProviderCallParams) -> Result<ProviderCompletion, ProviderFailure>;

    /// Send a streaming completion request
    async fn stream(&self, params: &ProviderCallParams) -> Result<ProviderStream, ProviderFailure>;
}

/// Join a path onto a base URL without doubling slashes
pub(crate) fn endpoint(base_url: &Url, path: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    format!("{base}/{}", path.trim_start_matches('/'))
}

/// Attach the family's authentication scheme
pub(crate) fn authorize(builder: RequestBuilder, family: ProviderFamily, api_key: Option<&SecretString>) -> RequestBuilder {
    let Some(key) = api_key else {
        return builder;
    };
    match family {
        ProviderFamily::OpenAi => builder.bearer_auth(key.expose_secret()),
        ProviderFamily::Anthropic => builder
            .header("x-api-key", key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION),
        ProviderFamily::Google => builder.header("x-goog-api-key", key.expose_secret()),
    }
}

/// Send a request and turn transport errors and non-success statuses into failures
pub(crate) async fn send(builder: RequestBuilder, provider: &str) -> Result<reqwest::Response, ProviderFailure> {
    let response = builder.send().await.map_err(|e| {
        tracing::debug!(provider = %provider, error = %e, "upstream request failed");
        ProviderFailure::from_reqwest(&e)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(provider = %provider, status = %status, "upstream returned error");
    Err(ProviderFailure::from_response(status.as_u16(), &body))
}

/// Read a JSON body, mapping decode errors to a stream failure
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderFailure> {
    let text = response.text().await.map_err(|e| ProviderFailure::from_reqwest(&e))?;
    serde_json::from_str(&text).map_err(|e| {
        let mut failure = ProviderFailure::new(FailureOrigin::Stream, format!("failed to parse response: {e}"));
        failure.body = Some(crate::failure::truncate(&text, 1024));
        failure
    })
}

/// Decode one SSE payload, mapping decode errors to a stream failure
pub(crate) fn parse_event<T: serde::de::DeserializeOwned>(data: &str) -> Result<T, ProviderFailure> {
    serde_json::from_str(data).map_err(|e| {
        let mut failure = ProviderFailure::new(FailureOrigin::Stream, format!("failed to parse stream event: {e}"));
        failure.body = Some(crate::failure::truncate(data, 1024));
        failure
    })
}

/// Turn an SSE response into a provider stream
///
/// `convert` sees every non-empty `data:` payload in order and may keep
/// state between calls.
pub(crate) fn event_stream<F>(response: reqwest::Response, mut convert: F) -> ProviderStream
where
    F: FnMut(&str) -> Result<Vec<ProviderStreamItem>, ProviderFailure> + Send + 'static,
{
    let items = response
        .bytes_stream()
        .eventsource()
        .map(move |result| match result {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() {
                    return Vec::new();
                }
                match convert(data) {
                    Ok(items) => items.into_iter().map(Ok).collect(),
                    Err(failure) => vec![Err(failure)],
                }
            }
            Err(e) => vec![Err(ProviderFailure::new(FailureOrigin::Transport, e.to_string()))],
        })
        .flat_map(futures_util::stream::iter);

    Box::pin(items)
}

/// Base URL or a failure naming the provider
pub(crate) fn require_base_url<'a>(base_url: Option<&'a Url>, provider: &str) -> Result<&'a Url, ProviderFailure> {
    base_url.ok_or_else(|| ProviderFailure::new(FailureOrigin::Transport, format!("{provider}: no base URL configured")))
}

/// Failure for a request built for a different family
pub(crate) fn wrong_family(provider: &str, expected: &str) -> ProviderFailure {
    ProviderFailure::new(
        FailureOrigin::Transport,
        format!("{provider}: request was not built for the {expected} protocol"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let base = Url::parse("http://localhost:11434/v1/").unwrap();
        assert_eq!(endpoint(&base, "/chat/completions"), "http://localhost:11434/v1/chat/completions");

        let base = Url::parse("https://api.anthropic.com/v1").unwrap();
        assert_eq!(endpoint(&base, "messages"), "https://api.anthropic.com/v1/messages");
    }
}
