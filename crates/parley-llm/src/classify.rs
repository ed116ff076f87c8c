//! Raw provider failure to typed [`LlmError`]
//!
//! The classifier is the only place an [`LlmError`] is built from a vendor
//! failure. It also produces a user-facing message with diagnostic suffixes
//! stripped and a size-bounded diagnostics object for debug logs.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::LlmError;
use crate::failure::{ProviderFailure, truncate};
use crate::registry;

/// Messages kept at the tail of a request echo
pub const DEFAULT_KEEP_LAST: usize = 5;

/// Source chain entries kept in diagnostics
const MAX_CHAIN_ENTRIES: usize = 10;

/// Body bytes kept in diagnostics
const MAX_DIAGNOSTIC_BODY: usize = 2048;

/// Turn a raw failure into a typed error attributed to `provider`
pub fn classify(failure: &ProviderFailure, provider: &str) -> LlmError {
    let message = clean_message(&failure.message);

    if failure.is_cancellation() {
        return LlmError::Request {
            provider: provider.to_owned(),
            message,
        };
    }

    let status = failure.status.or_else(|| status_from_text(&failure.message));
    if let Some(status) = status {
        return from_status(status, provider, message);
    }

    let lowered = failure.message.to_lowercase();
    if lowered.contains("authentication") || lowered.contains("api key") {
        return LlmError::Authentication {
            provider: provider.to_owned(),
            message: auth_help(provider, &message),
        };
    }

    LlmError::Request {
        provider: provider.to_owned(),
        message,
    }
}

fn from_status(status: u16, provider: &str, message: String) -> LlmError {
    let provider = provider.to_owned();
    match status {
        401 | 403 => {
            let message = auth_help(&provider, &message);
            LlmError::Authentication { provider, message }
        }
        429 => LlmError::RateLimit { provider, message },
        500..=599 => LlmError::Request {
            provider,
            message: format!("Server error ({status}): {message}"),
        },
        _ => LlmError::Request { provider, message },
    }
}

fn status_from_text(message: &str) -> Option<u16> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([45][0-9]{2})\b").expect("must be valid regex"))
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Friendly authentication message naming the fix
fn auth_help(provider: &str, vendor_message: &str) -> String {
    let Some(spec) = registry::spec(provider) else {
        return format!("Authentication failed for {provider}: {vendor_message}");
    };

    let mut message = format!("Authentication failed for {}. {}.", spec.display_name, spec.credential_hint());
    if !vendor_message.is_empty() {
        message.push_str(" Provider said: ");
        message.push_str(vendor_message);
    }
    message
}

/// Error for a provider that has no usable credential
pub fn missing_credential(provider: &str) -> LlmError {
    let message = registry::spec(provider).map_or_else(
        || format!("No credential configured for {provider}"),
        |spec| format!("No API key configured for {}. {}.", spec.display_name, spec.credential_hint()),
    );
    LlmError::Authentication {
        provider: provider.to_owned(),
        message,
    }
}

/// Classify a failure at the call boundary and log it
///
/// Logs a concise line with the clean message, then the full diagnostics at
/// debug level. Cancellations are logged quietly.
pub(crate) fn report(failure: &ProviderFailure, provider: &str, model: &str) -> LlmError {
    let error = classify(failure, provider);

    if failure.is_cancellation() {
        tracing::info!(provider = %provider, model = %model, "request cancelled");
        return error;
    }

    tracing::error!(provider = %provider, model = %model, kind = error.kind(), "{}", error.message());
    tracing::debug!(
        provider = %provider,
        diagnostics = %detailed_diagnostics(failure, provider),
        "provider failure details"
    );
    error
}

/// User-facing message: the text before the first `|`, trimmed
///
/// Falls back to the full message when nothing precedes the pipe.
pub fn clean_message(message: &str) -> String {
    let head = message.split('|').next().unwrap_or_default().trim();
    if head.is_empty() {
        message.trim().to_owned()
    } else {
        head.to_owned()
    }
}

/// Verbose failure description for debug logs only
pub fn detailed_diagnostics(failure: &ProviderFailure, provider: &str) -> Value {
    let mut diagnostics = json!({
        "provider": provider,
        "origin": failure.origin.as_str(),
        "message": failure.message,
    });

    if let Some(status) = failure.status {
        diagnostics["status"] = json!(status);
    }
    if let Some(vendor_type) = &failure.vendor_type {
        diagnostics["vendorType"] = json!(vendor_type);
    }
    if let Some(body) = &failure.body {
        diagnostics["body"] = json!(truncate(body, MAX_DIAGNOSTIC_BODY));
    }
    if !failure.source_chain.is_empty() {
        let chain: Vec<_> = failure.source_chain.iter().take(MAX_CHAIN_ENTRIES).collect();
        diagnostics["stack"] = json!(chain);
    }
    if let Some(request) = &failure.request {
        diagnostics["request"] = truncate_request(request, DEFAULT_KEEP_LAST);
    }

    diagnostics
}

/// Message list shortened for a diagnostics echo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruncatedMessages {
    pub messages: Vec<Value>,
    #[serde(rename = "_truncated")]
    pub truncated: bool,
    #[serde(rename = "_originalMessageCount")]
    pub original_count: usize,
}

/// Keep the first message and the last `keep_last`
pub fn truncate_messages(messages: &[Value], keep_last: usize) -> TruncatedMessages {
    let original_count = messages.len();
    if original_count <= keep_last + 1 {
        return TruncatedMessages {
            messages: messages.to_vec(),
            truncated: false,
            original_count,
        };
    }

    let mut kept = Vec::with_capacity(keep_last + 1);
    kept.push(messages[0].clone());
    kept.extend_from_slice(&messages[original_count - keep_last..]);

    TruncatedMessages {
        messages: kept,
        truncated: true,
        original_count,
    }
}

/// Shorten the message list of an outbound request body
///
/// Handles both `messages` (`OpenAI`, Anthropic) and `contents` (Google).
/// Anthropic and Google carry the system prompt in a sibling field
/// (`system`, `systemInstruction`) that is echoed whole, so for them the
/// kept first entry is the first conversation turn.
pub fn truncate_request(request: &Value, keep_last: usize) -> Value {
    let mut echo = request.clone();
    for key in ["messages", "contents"] {
        let Some(Value::Array(messages)) = echo.get(key) else {
            continue;
        };
        let truncated = truncate_messages(messages, keep_last);
        if truncated.truncated {
            echo[key] = Value::Array(truncated.messages);
            echo["_truncated"] = json!(true);
            echo["_originalMessageCount"] = json!(truncated.original_count);
        }
    }
    echo
}
