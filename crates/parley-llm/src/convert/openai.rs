//! Conversion between canonical types and `OpenAI` wire format

use std::collections::BTreeMap;

use crate::canonicalize::CallPlan;
use crate::protocol::openai::{
    OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiReasoning, OpenAiRequest, OpenAiResponse,
    OpenAiStreamChunk, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::provider::{ProviderCompletion, ProviderStreamItem};
use crate::registry::ReasoningStyle;
use crate::types::{FinishReason, Message, ToolChoice, ToolInvocation, Usage};

// -- Outbound: canonical request -> OpenAI wire format --

/// Build the chat completions body; streaming flags are set by the client
pub fn build_request(plan: &CallPlan<'_>) -> OpenAiRequest {
    let messages = plan.options.messages.iter().map(to_openai_message).collect();

    let tools: Vec<OpenAiTool> = plan
        .tools
        .iter()
        .map(|tool| OpenAiTool {
            tool_type: "function".to_owned(),
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                parameters: Some(tool.parameters_or_empty()),
            },
        })
        .collect();

    let tool_choice = plan.tool_choice.and_then(|choice| match choice {
        ToolChoice::Auto => Some(serde_json::json!("auto")),
        ToolChoice::Tool { name } => Some(serde_json::json!({"type": "function", "function": {"name": name}})),
        ToolChoice::None => None,
    });

    let mut request = OpenAiRequest {
        model: plan.model.to_owned(),
        messages,
        temperature: plan.options.temperature,
        max_tokens: plan.options.max_tokens,
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice,
        ..OpenAiRequest::default()
    };

    if let Some(effort) = plan.reasoning {
        match plan.spec.reasoning {
            ReasoningStyle::EffortEnum => request.reasoning_effort = Some(effort.to_string()),
            ReasoningStyle::EffortObject => {
                request.reasoning = Some(OpenAiReasoning {
                    effort: effort.to_string(),
                });
            }
            ReasoningStyle::EnableFlag => request.think = Some(true),
            ReasoningStyle::None | ReasoningStyle::BudgetTokens | ReasoningStyle::ThinkingBudget => {}
        }
    }

    request
}

fn to_openai_message(message: &Message) -> OpenAiMessage {
    match message {
        Message::System { content } => text_message("system", content),
        Message::User { content } => text_message("user", content),
        Message::Assistant {
            content,
            tool_invocations,
        } => OpenAiMessage {
            role: "assistant".to_owned(),
            content: content.clone(),
            tool_calls: (!tool_invocations.is_empty()).then(|| {
                tool_invocations
                    .iter()
                    .map(|invocation| OpenAiToolCall {
                        id: invocation.id.clone(),
                        tool_type: "function".to_owned(),
                        function: OpenAiFunctionCall {
                            name: invocation.name.clone(),
                            arguments: invocation.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: None,
        },
        Message::Tool {
            tool_invocation_id,
            result,
            ..
        } => OpenAiMessage {
            role: "tool".to_owned(),
            content: Some(result.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_invocation_id.clone()),
        },
    }
}

fn text_message(role: &str, content: &str) -> OpenAiMessage {
    OpenAiMessage {
        role: role.to_owned(),
        content: Some(content.to_owned()),
        tool_calls: None,
        tool_call_id: None,
    }
}

// -- Inbound: OpenAI wire format -> canonical --

pub fn usage_from_openai(usage: &OpenAiUsage) -> Usage {
    let total_tokens = if usage.total_tokens > 0 {
        usage.total_tokens
    } else {
        usage.prompt_tokens.saturating_add(usage.completion_tokens)
    };
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens,
        reasoning_tokens: usage.completion_tokens_details.as_ref().and_then(|d| d.reasoning_tokens),
        cached_input_tokens: usage.prompt_tokens_details.as_ref().and_then(|d| d.cached_tokens),
    }
}

impl From<OpenAiResponse> for ProviderCompletion {
    fn from(response: OpenAiResponse) -> Self {
        let choice = response.choices.into_iter().next();
        let (content, tool_invocations, finish_reason) = choice.map_or_else(Default::default, |choice| {
            let invocations = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolInvocation::new(call.id, call.function.name, call.function.arguments))
                .collect();
            (
                choice.message.content.unwrap_or_default(),
                invocations,
                choice.finish_reason.as_deref().map(FinishReason::from_vendor),
            )
        });

        Self {
            id: response.id,
            model: response.model,
            content,
            tool_invocations,
            usage: response.usage.as_ref().map(usage_from_openai),
            finish_reason,
        }
    }
}

// -- Stream conversion --

/// Tool call being assembled from argument fragments
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// State tracker for converting `OpenAI` stream chunks
///
/// Tool calls arrive as fragments keyed by index and are only emitted, fully
/// assembled, once the choice reports a finish reason.
#[derive(Debug, Default)]
pub struct OpenAiStreamState {
    started: bool,
    reasoning_open: bool,
    finished: bool,
    tool_calls: BTreeMap<u32, PartialToolCall>,
}

impl OpenAiStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one SSE chunk
    pub fn convert_chunk(&mut self, chunk: &OpenAiStreamChunk) -> Vec<ProviderStreamItem> {
        let mut items = Vec::new();

        if !self.started {
            self.started = true;
            items.push(ProviderStreamItem::ResponseStart {
                id: chunk.id.clone(),
                model: chunk.model.clone(),
            });
        }

        let usage = chunk.usage.as_ref().map(usage_from_openai);
        let mut finished_here = false;

        if let Some(choice) = chunk.choices.first() {
            let delta = &choice.delta;

            let reasoning = delta.reasoning_content.as_deref().or(delta.reasoning.as_deref());
            if let Some(text) = reasoning.filter(|t| !t.is_empty()) {
                self.reasoning_open = true;
                items.push(ProviderStreamItem::ReasoningDelta(text.to_owned()));
            }

            if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
                self.close_reasoning(&mut items);
                items.push(ProviderStreamItem::TextDelta(text.to_owned()));
            }

            for fragment in delta.tool_calls.iter().flatten() {
                self.close_reasoning(&mut items);
                let call = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
                    id.clone_into(&mut call.id);
                }
                if let Some(function) = &fragment.function {
                    if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                        name.clone_into(&mut call.name);
                    }
                    if let Some(arguments) = &function.arguments {
                        call.arguments.push_str(arguments);
                    }
                }
            }

            if let Some(reason) = &choice.finish_reason {
                self.close_reasoning(&mut items);
                self.flush_tool_calls(&mut items);
                self.finished = true;
                finished_here = true;
                items.push(ProviderStreamItem::Finish {
                    reason: FinishReason::from_vendor(reason),
                    usage,
                });
            }
        }

        if !finished_here && let Some(usage) = usage {
            items.push(ProviderStreamItem::Usage(usage));
        }

        items
    }

    /// Handle the `[DONE]` sentinel
    ///
    /// Emits tool calls still pending when the vendor never sent a finish reason.
    pub fn done(&mut self) -> Vec<ProviderStreamItem> {
        let mut items = Vec::new();
        if !self.finished {
            self.close_reasoning(&mut items);
            self.flush_tool_calls(&mut items);
        }
        items
    }

    fn close_reasoning(&mut self, items: &mut Vec<ProviderStreamItem>) {
        if self.reasoning_open {
            self.reasoning_open = false;
            items.push(ProviderStreamItem::ReasoningEnd {
                usage: None,
                total_usage: None,
            });
        }
    }

    fn flush_tool_calls(&mut self, items: &mut Vec<ProviderStreamItem>) {
        for (_, call) in std::mem::take(&mut self.tool_calls) {
            if call.name.is_empty() {
                tracing::debug!(id = %call.id, "dropping tool call fragment without a name");
                continue;
            }
            let id = if call.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                call.id
            };
            items.push(ProviderStreamItem::ToolCall(ToolInvocation::new(id, call.name, call.arguments)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: serde_json::Value) -> OpenAiStreamChunk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_stream_with_trailing_usage_chunk() {
        let mut state = OpenAiStreamState::new();

        let items = state.convert_chunk(&chunk(serde_json::json!({
            "id": "chatcmpl-1", "model": "gpt-4.1",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hel"}}]
        })));
        assert_eq!(
            items,
            vec![
                ProviderStreamItem::ResponseStart {
                    id: "chatcmpl-1".to_owned(),
                    model: "gpt-4.1".to_owned(),
                },
                ProviderStreamItem::TextDelta("Hel".to_owned()),
            ]
        );

        let items = state.convert_chunk(&chunk(serde_json::json!({
            "id": "chatcmpl-1", "model": "gpt-4.1",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        })));
        assert_eq!(
            items,
            vec![ProviderStreamItem::Finish {
                reason: FinishReason::Stop,
                usage: None,
            }]
        );

        let items = state.convert_chunk(&chunk(serde_json::json!({
            "id": "chatcmpl-1", "model": "gpt-4.1", "choices": [],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12,
                      "completion_tokens_details": {"reasoning_tokens": 0}}
        })));
        let ProviderStreamItem::Usage(usage) = &items[0] else {
            panic!("expected usage, got {items:?}");
        };
        assert_eq!(usage.total_tokens, 12);
        assert_eq!(usage.reasoning_tokens, Some(0));
    }

    #[test]
    fn tool_call_fragments_are_assembled_before_finish() {
        let mut state = OpenAiStreamState::new();
        state.convert_chunk(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "type": "function", "function": {"name": "read_file", "arguments": ""}}
            ]}}]
        })));
        state.convert_chunk(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"path\":"}}]}}]
        })));
        state.convert_chunk(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"a.rs\"}"}},
                {"index": 1, "id": "call_b", "function": {"name": "list_dir", "arguments": "{}"}}
            ]}}]
        })));
        let items = state.convert_chunk(&chunk(serde_json::json!({
            "choices": [{"delta": {}, "finish_reason": "tool_calls"}]
        })));

        assert_eq!(
            items,
            vec![
                ProviderStreamItem::ToolCall(ToolInvocation::new("call_a", "read_file", r#"{"path":"a.rs"}"#)),
                ProviderStreamItem::ToolCall(ToolInvocation::new("call_b", "list_dir", "{}")),
                ProviderStreamItem::Finish {
                    reason: FinishReason::ToolCalls,
                    usage: None,
                },
            ]
        );
        assert!(state.done().is_empty());
    }

    #[test]
    fn reasoning_closes_when_content_starts() {
        let mut state = OpenAiStreamState::new();
        let items = state.convert_chunk(&chunk(serde_json::json!({
            "choices": [{"delta": {"reasoning_content": "thinking..."}}]
        })));
        assert_eq!(items[1], ProviderStreamItem::ReasoningDelta("thinking...".to_owned()));

        let items = state.convert_chunk(&chunk(serde_json::json!({
            "choices": [{"delta": {"content": "Answer"}}]
        })));
        assert_eq!(
            items,
            vec![
                ProviderStreamItem::ReasoningEnd {
                    usage: None,
                    total_usage: None,
                },
                ProviderStreamItem::TextDelta("Answer".to_owned()),
            ]
        );
    }

    #[test]
    fn done_flushes_calls_without_finish() {
        let mut state = OpenAiStreamState::new();
        state.convert_chunk(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"name": "ls", "arguments": "{}"}}]}}]
        })));
        let items = state.done();
        assert_eq!(items.len(), 1);
        let ProviderStreamItem::ToolCall(call) = &items[0] else {
            panic!("expected tool call");
        };
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.name, "ls");
    }

    #[test]
    fn response_maps_first_choice() {
        let response: OpenAiResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-9", "object": "chat.completion", "created": 1, "model": "gpt-4.1",
            "choices": [{"index": 0, "finish_reason": "tool_calls", "message": {
                "role": "assistant", "content": null,
                "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "ls", "arguments": "{}"}}]
            }}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12,
                      "prompt_tokens_details": {"cached_tokens": 2}}
        }))
        .unwrap();

        let completion = ProviderCompletion::from(response);
        assert_eq!(completion.content, "");
        assert_eq!(completion.tool_invocations, vec![ToolInvocation::new("call_1", "ls", "{}")]);
        assert_eq!(completion.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(completion.usage.unwrap().cached_input_tokens, Some(2));
    }
}
