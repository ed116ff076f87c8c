//! Raw, unclassified provider failures
//!
//! Every transport, HTTP, and in-stream failure is captured as a
//! [`ProviderFailure`] and only turned into an [`crate::LlmError`] by the
//! classifier.

use std::fmt;

use serde::Deserialize;

use crate::protocol::anthropic::AnthropicErrorResponse;
use crate::protocol::google::GoogleErrorResponse;
use crate::protocol::openai::OpenAiErrorResponse;

/// Longest response body kept verbatim on a failure
const MAX_BODY_LEN: usize = 4096;

/// Where a failure was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureOrigin {
    /// Connection, TLS, DNS, or body read failure
    #[default]
    Transport,
    /// Non-success HTTP status
    Http,
    /// Error event or undecodable data inside a stream
    Stream,
    /// Caller cancelled the request
    Cancelled,
    /// Transport reported an abort before the finish signal
    Aborted,
}

impl FailureOrigin {
    /// Label used in diagnostics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Http => "http",
            Self::Stream => "stream",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

/// Unclassified failure raised by a provider call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Where the failure was observed
    pub origin: FailureOrigin,
    /// HTTP status, when the vendor supplied one
    pub status: Option<u16>,
    /// Vendor message, possibly carrying diagnostic suffixes
    pub message: String,
    /// Vendor error type (`rate_limit_error`, `RESOURCE_EXHAUSTED`, ...)
    pub vendor_type: Option<String>,
    /// Raw response body, size-bounded
    pub body: Option<String>,
    /// Chain of underlying error sources, outermost first
    pub source_chain: Vec<String>,
    /// Outbound request echo for debug logs
    pub request: Option<serde_json::Value>,
}

impl ProviderFailure {
    /// Create a failure with only a message
    pub fn new(origin: FailureOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
            ..Self::default()
        }
    }

    /// The caller's cancellation handle fired
    pub fn cancelled() -> Self {
        Self::new(FailureOrigin::Cancelled, "request was cancelled")
    }

    /// The provider stream aborted before finishing
    pub fn aborted() -> Self {
        Self::new(FailureOrigin::Aborted, "stream was aborted before completion")
    }

    /// Attach an HTTP status
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the vendor error type
    #[must_use]
    pub fn with_vendor_type(mut self, vendor_type: impl Into<String>) -> Self {
        self.vendor_type = Some(vendor_type.into());
        self
    }

    /// Attach the outbound request for diagnostics
    #[must_use]
    pub fn with_request(mut self, request: serde_json::Value) -> Self {
        self.request = Some(request);
        self
    }

    /// Whether the caller asked for this failure
    pub fn is_cancellation(&self) -> bool {
        self.origin == FailureOrigin::Cancelled
    }

    /// Capture a `reqwest` error, including its source chain
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let mut source_chain = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(inner) = source {
            source_chain.push(inner.to_string());
            source = inner.source();
        }

        let origin = if error.is_decode() {
            FailureOrigin::Stream
        } else {
            FailureOrigin::Transport
        };

        Self {
            origin,
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
            source_chain,
            ..Self::default()
        }
    }

    /// Build a failure from a non-success HTTP response body
    ///
    /// Recognizes the `OpenAI`, Anthropic, and Google error envelopes and
    /// falls back to the (bounded) raw body text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let (message, vendor_type) = match serde_json::from_str::<VendorErrorBody>(body) {
            Ok(VendorErrorBody::Anthropic(e)) => (e.error.message, Some(e.error.error_type)),
            Ok(VendorErrorBody::Google(e)) => (e.error.message, Some(e.error.status).filter(|s| !s.is_empty())),
            Ok(VendorErrorBody::OpenAi(e)) => {
                let code = e.error.code.map(|c| c.as_str().map_or_else(|| c.to_string(), str::to_owned));
                (e.error.message, e.error.error_type.or(code))
            }
            Err(_) if body.trim().is_empty() => (format!("provider returned HTTP {status}"), None),
            Err(_) => (truncate(body.trim(), 512), None),
        };

        Self {
            origin: FailureOrigin::Http,
            status: Some(status),
            message,
            vendor_type,
            body: (!body.is_empty()).then(|| truncate(body, MAX_BODY_LEN)),
            ..Self::default()
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderFailure {}

/// Error envelopes returned by the supported vendor families
#[derive(Deserialize)]
#[serde(untagged)]
enum VendorErrorBody {
    Anthropic(AnthropicErrorResponse),
    Google(GoogleErrorResponse),
    OpenAi(OpenAiErrorResponse),
}

/// Truncate on a character boundary
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
