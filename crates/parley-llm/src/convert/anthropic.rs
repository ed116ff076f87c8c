//! Conversion between canonical types and Anthropic wire format

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::canonicalize::{CallPlan, DEFAULT_MAX_TOKENS, thinking_budget};
use crate::failure::{FailureOrigin, ProviderFailure};
use crate::protocol::anthropic::{
    AnthropicCacheControl, AnthropicContent, AnthropicContentBlock, AnthropicCustomTool, AnthropicErrorDetail,
    AnthropicMessage, AnthropicRequest, AnthropicResponse, AnthropicResponseBlock, AnthropicServerTool,
    AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicSystemBlock, AnthropicThinking,
    AnthropicTool, AnthropicToolChoice, AnthropicUsage, WEB_SEARCH_TOOL_TYPE,
};
use crate::provider::{ProviderCompletion, ProviderStreamItem};
use crate::types::{FinishReason, Message, ToolChoice, ToolInvocation, Usage, WEB_SEARCH_TOOL};

/// Web searches allowed per request
const WEB_SEARCH_MAX_USES: u32 = 5;

/// Reasoning block the API requires back, unchanged, before the tool uses it led to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SignedThinking {
    thinking: String,
    signature: String,
}

/// Opaque continuation for the first client tool invocation of a turn
fn encode_thinking(blocks: &[SignedThinking]) -> Option<String> {
    if blocks.is_empty() {
        return None;
    }
    serde_json::to_string(blocks).ok()
}

/// Signed thinking carried on a turn's tool invocations
///
/// Continuations written by other vendors do not parse and are skipped.
fn decode_thinking(invocations: &[ToolInvocation]) -> Vec<SignedThinking> {
    invocations
        .iter()
        .find_map(|invocation| invocation.opaque_continuation.as_deref())
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

// -- Outbound: canonical request -> Anthropic wire format --

/// Build the messages body; streaming flags are set by the client
pub fn build_request(plan: &CallPlan<'_>) -> AnthropicRequest {
    let mut system: Vec<AnthropicSystemBlock> = plan
        .options
        .messages
        .iter()
        .filter_map(|message| match message {
            Message::System { content } if !content.is_empty() => Some(AnthropicSystemBlock {
                block_type: "text".to_owned(),
                text: content.clone(),
                cache_control: None,
            }),
            _ => None,
        })
        .collect();
    if plan.spec.prompt_caching
        && let Some(last) = system.last_mut()
    {
        last.cache_control = Some(AnthropicCacheControl::ephemeral());
    }

    let mut tools: Vec<AnthropicTool> = plan
        .tools
        .iter()
        .map(|tool| {
            AnthropicTool::Custom(AnthropicCustomTool {
                name: tool.name.clone(),
                description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                input_schema: tool.parameters_or_empty(),
            })
        })
        .collect();
    tools.extend(plan.native_tools.iter().filter(|t| *t == WEB_SEARCH_TOOL).map(|_| {
        AnthropicTool::Server(AnthropicServerTool {
            tool_type: WEB_SEARCH_TOOL_TYPE.to_owned(),
            name: WEB_SEARCH_TOOL.to_owned(),
            max_uses: Some(WEB_SEARCH_MAX_USES),
        })
    }));

    let tool_choice = plan.tool_choice.and_then(|choice| match choice {
        ToolChoice::Auto => Some(AnthropicToolChoice {
            choice_type: "auto".to_owned(),
            name: None,
        }),
        ToolChoice::Tool { name } => Some(AnthropicToolChoice {
            choice_type: "tool".to_owned(),
            name: Some(name.clone()),
        }),
        ToolChoice::None => None,
    });

    let thinking = plan.reasoning.map(|effort| AnthropicThinking {
        thinking_type: "enabled".to_owned(),
        budget_tokens: thinking_budget(effort),
    });

    let mut max_tokens = plan.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if let Some(thinking) = &thinking
        && max_tokens <= thinking.budget_tokens
    {
        max_tokens = thinking.budget_tokens + DEFAULT_MAX_TOKENS;
    }

    AnthropicRequest {
        model: plan.model.to_owned(),
        max_tokens,
        system: (!system.is_empty()).then_some(system),
        messages: to_anthropic_messages(&plan.options.messages),
        // Sampling parameters are rejected while thinking is enabled
        temperature: if thinking.is_some() { None } else { plan.options.temperature },
        stream: None,
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice,
        thinking,
    }
}

/// Convert the conversation, grouping consecutive tool results into one user turn
fn to_anthropic_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut converted: Vec<AnthropicMessage> = Vec::new();

    for message in messages {
        match message {
            Message::System { .. } => {}
            Message::User { content } => converted.push(AnthropicMessage {
                role: "user".to_owned(),
                content: AnthropicContent::Text(content.clone()),
            }),
            Message::Assistant {
                content,
                tool_invocations,
            } => {
                // Thinking leads the turn, ahead of text and tool uses
                let mut blocks: Vec<AnthropicContentBlock> = decode_thinking(tool_invocations)
                    .into_iter()
                    .map(|block| AnthropicContentBlock::Thinking {
                        thinking: block.thinking,
                        signature: block.signature,
                    })
                    .collect();
                if let Some(text) = content.as_ref().filter(|t| !t.is_empty()) {
                    blocks.push(AnthropicContentBlock::Text { text: text.clone() });
                }
                blocks.extend(tool_invocations.iter().map(|invocation| AnthropicContentBlock::ToolUse {
                    id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    input: invocation.arguments_json(),
                }));
                if blocks.is_empty() {
                    tracing::debug!("skipping empty assistant message");
                    continue;
                }
                converted.push(AnthropicMessage {
                    role: "assistant".to_owned(),
                    content: AnthropicContent::Blocks(blocks),
                });
            }
            Message::Tool {
                tool_invocation_id,
                result,
                ..
            } => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: tool_invocation_id.clone(),
                    content: Some(result.clone()),
                };
                match converted.last_mut() {
                    Some(AnthropicMessage {
                        role,
                        content: AnthropicContent::Blocks(blocks),
                    }) if role == "user"
                        && blocks
                            .iter()
                            .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. })) =>
                    {
                        blocks.push(block);
                    }
                    _ => converted.push(AnthropicMessage {
                        role: "user".to_owned(),
                        content: AnthropicContent::Blocks(vec![block]),
                    }),
                }
            }
        }
    }

    converted
}

// -- Inbound: Anthropic wire format -> canonical --

pub fn usage_from_anthropic(usage: &AnthropicUsage) -> Usage {
    Usage {
        cached_input_tokens: usage.cache_read_input_tokens,
        ..Usage::new(usage.input_tokens, usage.output_tokens)
    }
}

impl From<AnthropicResponse> for ProviderCompletion {
    fn from(response: AnthropicResponse) -> Self {
        let mut content = String::new();
        let mut tool_invocations = Vec::new();
        let mut thinking = Vec::new();

        for block in response.content {
            match block {
                AnthropicResponseBlock::Text { text } => content.push_str(&text),
                AnthropicResponseBlock::Thinking {
                    thinking: text,
                    signature,
                } => {
                    if !signature.is_empty() {
                        thinking.push(SignedThinking {
                            thinking: text,
                            signature,
                        });
                    }
                }
                AnthropicResponseBlock::ToolUse { id, name, input } => tool_invocations.push(ToolInvocation {
                    opaque_continuation: encode_thinking(&std::mem::take(&mut thinking)),
                    ..ToolInvocation::new(id, name, input.to_string())
                }),
                AnthropicResponseBlock::ServerToolUse { id, name, input } => {
                    tool_invocations.push(ToolInvocation::new(id, name, input.to_string()));
                }
                AnthropicResponseBlock::Other => {}
            }
        }

        Self {
            id: response.id,
            model: response.model,
            content,
            tool_invocations,
            usage: Some(usage_from_anthropic(&response.usage)),
            finish_reason: response.stop_reason.as_deref().map(FinishReason::from_vendor),
        }
    }
}

/// HTTP status equivalent of an in-stream error type
fn status_for_error_type(error_type: &str) -> Option<u16> {
    match error_type {
        "invalid_request_error" => Some(400),
        "authentication_error" => Some(401),
        "permission_error" => Some(403),
        "not_found_error" => Some(404),
        "rate_limit_error" => Some(429),
        "api_error" => Some(500),
        "overloaded_error" => Some(529),
        _ => None,
    }
}

pub fn failure_from_stream_error(error: &AnthropicErrorDetail) -> ProviderFailure {
    let mut failure =
        ProviderFailure::new(FailureOrigin::Stream, error.message.clone()).with_vendor_type(error.error_type.clone());
    failure.status = status_for_error_type(&error.error_type);
    failure
}

// -- Stream conversion --

/// Content block currently being streamed
#[derive(Debug)]
enum OpenBlock {
    Text,
    Thinking {
        text: String,
        signature: String,
    },
    Tool {
        id: String,
        name: String,
        input: String,
        /// Executed by the vendor
        server: bool,
    },
    Ignored,
}

/// State tracker for converting Anthropic stream events
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    blocks: HashMap<u32, OpenBlock>,
    /// Signed thinking not yet attached to a client tool call
    thinking: Vec<SignedThinking>,
    usage: Usage,
}

impl AnthropicStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one SSE event
    pub fn convert_event(&mut self, event: AnthropicStreamEvent) -> Vec<ProviderStreamItem> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = &message.usage {
                    self.usage = usage_from_anthropic(usage);
                }
                vec![ProviderStreamItem::ResponseStart {
                    id: message.id,
                    model: message.model,
                }]
            }

            AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                let mut items = Vec::new();
                let block = match content_block {
                    AnthropicStreamContentBlock::Text { text } => {
                        if !text.is_empty() {
                            items.push(ProviderStreamItem::TextDelta(text));
                        }
                        OpenBlock::Text
                    }
                    AnthropicStreamContentBlock::Thinking { thinking } => {
                        if !thinking.is_empty() {
                            items.push(ProviderStreamItem::ReasoningDelta(thinking.clone()));
                        }
                        OpenBlock::Thinking {
                            text: thinking,
                            signature: String::new(),
                        }
                    }
                    AnthropicStreamContentBlock::ToolUse { id, name } => OpenBlock::Tool {
                        id,
                        name,
                        input: String::new(),
                        server: false,
                    },
                    AnthropicStreamContentBlock::ServerToolUse { id, name } => OpenBlock::Tool {
                        id,
                        name,
                        input: String::new(),
                        server: true,
                    },
                    AnthropicStreamContentBlock::Other => OpenBlock::Ignored,
                };
                self.blocks.insert(index, block);
                items
            }

            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![ProviderStreamItem::TextDelta(text)],
                AnthropicStreamDelta::ThinkingDelta { thinking } => {
                    if let Some(OpenBlock::Thinking { text, .. }) = self.blocks.get_mut(&index) {
                        text.push_str(&thinking);
                    }
                    vec![ProviderStreamItem::ReasoningDelta(thinking)]
                }
                AnthropicStreamDelta::SignatureDelta { signature: fragment } => {
                    if let Some(OpenBlock::Thinking { signature, .. }) = self.blocks.get_mut(&index) {
                        signature.push_str(&fragment);
                    }
                    Vec::new()
                }
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    if let Some(OpenBlock::Tool { input, .. }) = self.blocks.get_mut(&index) {
                        input.push_str(&partial_json);
                    }
                    Vec::new()
                }
                AnthropicStreamDelta::Other => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockStop { index } => match self.blocks.remove(&index) {
                Some(OpenBlock::Thinking { text, signature }) => {
                    if !signature.is_empty() {
                        self.thinking.push(SignedThinking {
                            thinking: text,
                            signature,
                        });
                    }
                    vec![ProviderStreamItem::ReasoningEnd {
                        usage: None,
                        total_usage: None,
                    }]
                }
                Some(OpenBlock::Tool {
                    id,
                    name,
                    input,
                    server,
                }) => {
                    let arguments = if input.trim().is_empty() { "{}".to_owned() } else { input };
                    let mut invocation = ToolInvocation::new(id, name, arguments);
                    if !server {
                        invocation.opaque_continuation = encode_thinking(&std::mem::take(&mut self.thinking));
                    }
                    vec![ProviderStreamItem::ToolCall(invocation)]
                }
                Some(OpenBlock::Text | OpenBlock::Ignored) | None => Vec::new(),
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = &usage {
                    // Delta counts are cumulative output only, so the total is recomputed
                    let delta = Usage {
                        total_tokens: 0,
                        ..usage_from_anthropic(usage)
                    };
                    self.usage.merge(&delta);
                }
                match delta.stop_reason {
                    Some(reason) => {
                        vec![ProviderStreamItem::Finish {
                            reason: FinishReason::from_vendor(&reason),
                            usage: Some(self.usage),
                        }]
                    }
                    None => usage.map(|_| vec![ProviderStreamItem::Usage(self.usage)]).unwrap_or_default(),
                }
            }

            // A missing stop reason is synthesized by the stream driver
            AnthropicStreamEvent::MessageStop => Vec::new(),

            AnthropicStreamEvent::Ping => vec![ProviderStreamItem::Other("ping".to_owned())],
            AnthropicStreamEvent::Unknown => vec![ProviderStreamItem::Other("unknown".to_owned())],

            AnthropicStreamEvent::Error { error } => vec![ProviderStreamItem::Error(failure_from_stream_error(&error))],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(value: serde_json::Value) -> AnthropicStreamEvent {
        serde_json::from_value(value).unwrap()
    }

    fn run(events: Vec<serde_json::Value>) -> Vec<ProviderStreamItem> {
        let mut state = AnthropicStreamState::new();
        events.into_iter().flat_map(|e| state.convert_event(event(e))).collect()
    }

    #[test]
    fn thinking_text_and_tool_use_stream() {
        let items = run(vec![
            serde_json::json!({"type": "message_start", "message": {
                "id": "msg_1", "type": "message", "role": "assistant", "model": "claude-sonnet-4-20250514",
                "content": [], "usage": {"input_tokens": 20, "output_tokens": 1, "cache_read_input_tokens": 8}
            }}),
            serde_json::json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
            serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "Let me look."}}),
            serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "sig"}}),
            serde_json::json!({"type": "content_block_stop", "index": 0}),
            serde_json::json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
            serde_json::json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "Reading."}}),
            serde_json::json!({"type": "content_block_stop", "index": 1}),
            serde_json::json!({"type": "content_block_start", "index": 2, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {}}}),
            serde_json::json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "{\"path\": "}}),
            serde_json::json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "\"a.rs\"}"}}),
            serde_json::json!({"type": "content_block_stop", "index": 2}),
            serde_json::json!({"type": "message_delta", "delta": {"stop_reason": "tool_use", "stop_sequence": null}, "usage": {"output_tokens": 42}}),
            serde_json::json!({"type": "message_stop"}),
        ]);

        let mut usage = Usage::new(20, 42);
        usage.cached_input_tokens = Some(8);
        assert_eq!(
            items,
            vec![
                ProviderStreamItem::ResponseStart {
                    id: "msg_1".to_owned(),
                    model: "claude-sonnet-4-20250514".to_owned(),
                },
                ProviderStreamItem::ReasoningDelta("Let me look.".to_owned()),
                ProviderStreamItem::ReasoningEnd {
                    usage: None,
                    total_usage: None,
                },
                ProviderStreamItem::TextDelta("Reading.".to_owned()),
                ProviderStreamItem::ToolCall(ToolInvocation {
                    opaque_continuation: Some(r#"[{"thinking":"Let me look.","signature":"sig"}]"#.to_owned()),
                    ..ToolInvocation::new("toolu_1", "read_file", r#"{"path": "a.rs"}"#)
                }),
                ProviderStreamItem::Finish {
                    reason: FinishReason::ToolCalls,
                    usage: Some(usage),
                },
            ]
        );
    }

    #[test]
    fn server_tool_use_surfaces_as_tool_call() {
        let items = run(vec![
            serde_json::json!({"type": "content_block_start", "index": 0, "content_block": {"type": "server_tool_use", "id": "srvtoolu_1", "name": "web_search", "input": {}}}),
            serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"query\":\"rust\"}"}}),
            serde_json::json!({"type": "content_block_stop", "index": 0}),
            serde_json::json!({"type": "content_block_start", "index": 1, "content_block": {"type": "web_search_tool_result", "tool_use_id": "srvtoolu_1", "content": []}}),
            serde_json::json!({"type": "content_block_stop", "index": 1}),
        ]);
        assert_eq!(
            items,
            vec![ProviderStreamItem::ToolCall(ToolInvocation::new(
                "srvtoolu_1",
                "web_search",
                r#"{"query":"rust"}"#
            ))]
        );
    }

    #[test]
    fn error_event_carries_mapped_status() {
        let items = run(vec![serde_json::json!({
            "type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}
        })]);
        let ProviderStreamItem::Error(failure) = &items[0] else {
            panic!("expected error item");
        };
        assert_eq!(failure.status, Some(529));
        assert_eq!(failure.vendor_type.as_deref(), Some("overloaded_error"));
        assert_eq!(failure.message, "Overloaded");
    }

    #[test]
    fn consecutive_tool_results_share_one_user_turn() {
        let call_a = ToolInvocation::new("toolu_a", "read_file", "{}");
        let call_b = ToolInvocation::new("toolu_b", "list_dir", "{}");
        let messages = vec![
            Message::user("go"),
            Message::Assistant {
                content: None,
                tool_invocations: vec![call_a.clone(), call_b.clone()],
            },
            Message::tool_result(&call_a, "contents"),
            Message::tool_result(&call_b, "a.rs"),
        ];

        let converted = to_anthropic_messages(&messages);
        assert_eq!(converted.len(), 3);
        let AnthropicContent::Blocks(blocks) = &converted[2].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(converted[2].role, "user");
    }

    #[test]
    fn signed_thinking_is_echoed_before_tool_use() {
        let response: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_3", "type": "message", "role": "assistant", "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "thinking", "thinking": "Need the file.", "signature": "sig_abc"},
                {"type": "text", "text": "Reading."},
                {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"path": "a.rs"}},
                {"type": "tool_use", "id": "toolu_2", "name": "list_dir", "input": {}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 3, "output_tokens": 4}
        }))
        .unwrap();
        let completion = ProviderCompletion::from(response);
        assert!(completion.tool_invocations[0].opaque_continuation.is_some());
        assert_eq!(completion.tool_invocations[1].opaque_continuation, None);

        let first = completion.tool_invocations[0].clone();
        let messages = vec![
            Message::user("go"),
            Message::Assistant {
                content: Some(completion.content),
                tool_invocations: completion.tool_invocations,
            },
            Message::tool_result(&first, "fn main() {}"),
        ];
        let converted = serde_json::to_value(to_anthropic_messages(&messages)).unwrap();
        assert_eq!(
            converted[1]["content"],
            serde_json::json!([
                {"type": "thinking", "thinking": "Need the file.", "signature": "sig_abc"},
                {"type": "text", "text": "Reading."},
                {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"path": "a.rs"}},
                {"type": "tool_use", "id": "toolu_2", "name": "list_dir", "input": {}}
            ])
        );
    }

    #[test]
    fn foreign_continuation_adds_no_thinking() {
        let mut call = ToolInvocation::new("call_1", "read_file", "{}");
        call.opaque_continuation = Some("google-thought-signature".to_owned());
        let messages = vec![Message::Assistant {
            content: None,
            tool_invocations: vec![call],
        }];
        let AnthropicContent::Blocks(blocks) = &to_anthropic_messages(&messages)[0].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], AnthropicContentBlock::ToolUse { .. }));
    }

    #[test]
    fn response_includes_server_tool_use() {
        let response: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_2", "type": "message", "role": "assistant", "model": "claude",
            "content": [
                {"type": "server_tool_use", "id": "srv_1", "name": "web_search", "input": {"query": "x"}},
                {"type": "web_search_tool_result", "tool_use_id": "srv_1", "content": []},
                {"type": "text", "text": "Found it."}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 4}
        }))
        .unwrap();

        let completion = ProviderCompletion::from(response);
        assert_eq!(completion.content, "Found it.");
        assert_eq!(completion.tool_invocations.len(), 1);
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage, Some(Usage::new(3, 4)));
    }
}
