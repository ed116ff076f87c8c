use serde::Serialize;
use thiserror::Error;

/// Typed failure surfaced to callers of the orchestrator
///
/// Built once by [`crate::classify`] at the failure boundary and handed to
/// the caller as-is. `Display` yields the user-facing message only; verbose
/// diagnostics are logged separately at debug level.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmError {
    /// Missing or rejected credential
    #[error("{message}")]
    Authentication { provider: String, message: String },

    /// Vendor throttling
    #[error("{message}")]
    RateLimit { provider: String, message: String },

    /// Malformed request, unsupported model, or vendor-side failure
    #[error("{message}")]
    Request { provider: String, message: String },

    /// Unknown provider or no usable provider configured
    #[error("{message}")]
    Configuration { provider: String, message: String },
}

impl LlmError {
    /// Shorthand for a configuration failure
    pub fn configuration(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a request failure
    pub fn request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Provider the failure is attributed to
    pub fn provider(&self) -> &str {
        match self {
            Self::Authentication { provider, .. }
            | Self::RateLimit { provider, .. }
            | Self::Request { provider, .. }
            | Self::Configuration { provider, .. } => provider,
        }
    }

    /// User-facing message
    pub fn message(&self) -> &str {
        match self {
            Self::Authentication { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Request { message, .. }
            | Self::Configuration { message, .. } => message,
        }
    }

    /// Short name of the error category
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::RateLimit { .. } => "rate_limit",
            Self::Request { .. } => "request",
            Self::Configuration { .. } => "configuration",
        }
    }

    /// Whether a caller may reasonably retry after backing off
    ///
    /// This layer never retries on its own.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_message_only() {
        let err = LlmError::RateLimit {
            provider: "openai".to_owned(),
            message: "Too many requests".to_owned(),
        };
        assert_eq!(err.to_string(), "Too many requests");
        assert_eq!(err.provider(), "openai");
        assert!(err.is_retryable());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let err = LlmError::configuration("nope", "unknown provider 'nope'");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "configuration");
        assert_eq!(json["provider"], "nope");
        assert!(!err.is_retryable());
    }
}
