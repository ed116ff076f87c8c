use serde::Serialize;

use super::message::ToolInvocation;
use super::response::{ChatCompletionResponse, Usage};
use crate::error::LlmError;

/// Canonical streaming event
///
/// A stream always begins with `StreamStart` and ends with exactly one
/// `Complete` or `Error`; nothing follows the terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    StreamStart,
    TextStart,
    TextChunk {
        delta: String,
        /// All text received so far, including `delta`
        accumulated: String,
        sequence: u32,
    },
    ThinkingStart,
    ThinkingChunk {
        content: String,
        sequence: u32,
    },
    ThinkingComplete {
        #[serde(skip_serializing_if = "Option::is_none")]
        total_tokens: Option<u32>,
    },
    ToolCall {
        invocation: ToolInvocation,
        sequence: u32,
    },
    UsageUpdate {
        usage: Usage,
    },
    Complete {
        response: ChatCompletionResponse,
        total_duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics: Option<StreamMetrics>,
    },
    Error {
        cause: LlmError,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Timing and volume counters attached to `Complete`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamMetrics {
    /// Time from request to the first text or reasoning delta
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ms: Option<u64>,
    pub text_chunks: u32,
    pub thinking_chunks: u32,
    pub tool_calls: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = StreamEvent::TextChunk {
            delta: "lo".to_owned(),
            accumulated: "hello".to_owned(),
            sequence: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text_chunk");
        assert_eq!(json["accumulated"], "hello");

        let error = StreamEvent::Error {
            cause: LlmError::configuration("x", "boom"),
        };
        assert!(error.is_terminal());
        assert_eq!(serde_json::to_value(&error).unwrap()["cause"]["kind"], "configuration");
    }
}
