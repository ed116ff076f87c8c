use serde::{Deserialize, Serialize};

use super::message::ToolInvocation;

/// Why generation stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Output cap reached
    Length,
    /// The model requested tools
    ToolCalls,
    /// Blocked by the vendor's safety filter
    ContentFilter,
    /// Anything else the vendor reported
    Other(String),
}

impl FinishReason {
    /// Map a vendor finish or stop reason onto the canonical set
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" | "STOP" => Self::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" | "model_context_window_exceeded" => Self::Length,
            "tool_calls" | "tool_use" | "function_call" | "pause_turn" => Self::ToolCalls,
            "content_filter" | "refusal" | "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
                Self::ContentFilter
            }
            other => Self::Other(other.to_owned()),
        }
    }

    /// Whether the reason is one of `stop`, `length`, or `tool-calls`
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::Stop | Self::Length | Self::ToolCalls)
    }
}

/// Token accounting for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    /// Hidden reasoning tokens, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
    /// Input tokens served from a prompt cache, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u32>,
}

impl Usage {
    pub const fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            reasoning_tokens: None,
            cached_input_tokens: None,
        }
    }

    /// Fold a later usage report into this one
    ///
    /// Non-zero counts in `later` win; optional counts are kept when absent.
    pub fn merge(&mut self, later: &Self) {
        if later.input_tokens > 0 {
            self.input_tokens = later.input_tokens;
        }
        if later.output_tokens > 0 {
            self.output_tokens = later.output_tokens;
        }
        self.total_tokens = if later.total_tokens > 0 {
            later.total_tokens
        } else {
            self.input_tokens.saturating_add(self.output_tokens)
        };
        self.reasoning_tokens = later.reasoning_tokens.or(self.reasoning_tokens);
        self.cached_input_tokens = later.cached_input_tokens.or(self.cached_input_tokens);
    }
}

/// Final result of a chat completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Vendor response id, or a generated one
    pub id: String,
    /// Model that served the request
    pub model: String,
    /// Accumulated text
    pub content: String,
    /// Caller-visible tool calls; native tool calls are excluded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_invocations: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Set when tools were requested but the model cannot use them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_disabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_reasons_map_to_canonical_set() {
        assert_eq!(FinishReason::from_vendor("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_vendor("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::from_vendor("tool_use"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_vendor("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(FinishReason::from_vendor("weird"), FinishReason::Other("weird".to_owned()));
        assert!(!FinishReason::ContentFilter.is_expected());
        assert!(FinishReason::ToolCalls.is_expected());
    }

    #[test]
    fn merge_prefers_later_non_zero_counts() {
        let mut usage = Usage::new(10, 0);
        usage.cached_input_tokens = Some(4);

        let mut later = Usage::new(0, 25);
        later.reasoning_tokens = Some(12);
        later.total_tokens = 0;
        usage.merge(&later);

        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 25);
        assert_eq!(usage.total_tokens, 35);
        assert_eq!(usage.reasoning_tokens, Some(12));
        assert_eq!(usage.cached_input_tokens, Some(4));
    }
}
