//! Conversion between canonical types and Google Generative Language wire format

use serde_json::{Map, Value};

use crate::canonicalize::{CallPlan, thinking_budget};
use crate::failure::{FailureOrigin, ProviderFailure};
use crate::protocol::google::{
    GoogleContent, GoogleErrorResponse, GoogleFunctionCall, GoogleFunctionCallingConfig, GoogleFunctionDeclaration,
    GoogleFunctionResponse, GoogleGenerationConfig, GooglePart, GoogleRequest, GoogleResponse, GoogleThinkingConfig,
    GoogleTool, GoogleToolConfig, GoogleUsageMetadata,
};
use crate::provider::{ProviderCompletion, ProviderStreamItem};
use crate::types::{FinishReason, Message, ToolChoice, ToolInvocation, Usage, WEB_SEARCH_TOOL};

/// Schema keywords the Gemini function declaration subset rejects
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "$id", "additionalProperties", "examples"];

// -- Outbound: canonical request -> Google wire format --

/// Build the `generateContent` body
pub fn build_request(plan: &CallPlan<'_>) -> GoogleRequest {
    let system_parts: Vec<GooglePart> = plan
        .options
        .messages
        .iter()
        .filter_map(|message| match message {
            Message::System { content } if !content.is_empty() => Some(GooglePart::text(content.clone())),
            _ => None,
        })
        .collect();

    let mut tools = Vec::new();
    if !plan.tools.is_empty() {
        tools.push(GoogleTool {
            function_declarations: Some(
                plan.tools
                    .iter()
                    .map(|tool| GoogleFunctionDeclaration {
                        name: tool.name.clone(),
                        description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                        parameters: Some(sanitize_schema(&tool.parameters_or_empty())),
                    })
                    .collect(),
            ),
            google_search: None,
        });
    }
    if plan.native_tools.iter().any(|t| t == WEB_SEARCH_TOOL) {
        tools.push(GoogleTool {
            function_declarations: None,
            google_search: Some(Map::new()),
        });
    }

    let tool_config = plan.tool_choice.and_then(|choice| {
        let (mode, allowed_function_names) = match choice {
            ToolChoice::Auto => ("AUTO", None),
            ToolChoice::Tool { name } => ("ANY", Some(vec![name.clone()])),
            ToolChoice::None => return None,
        };
        Some(GoogleToolConfig {
            function_calling_config: GoogleFunctionCallingConfig {
                mode: mode.to_owned(),
                allowed_function_names,
            },
        })
    });

    let thinking_config = plan.reasoning.map(|effort| GoogleThinkingConfig {
        thinking_budget: thinking_budget(effort),
        include_thoughts: true,
    });
    let generation_config = (plan.options.temperature.is_some()
        || plan.options.max_tokens.is_some()
        || thinking_config.is_some())
    .then(|| GoogleGenerationConfig {
        temperature: plan.options.temperature,
        max_output_tokens: plan.options.max_tokens,
        thinking_config,
    });

    GoogleRequest {
        contents: to_google_contents(&plan.options.messages),
        system_instruction: (!system_parts.is_empty()).then(|| GoogleContent {
            role: None,
            parts: system_parts,
        }),
        generation_config,
        tools: (!tools.is_empty()).then_some(tools),
        tool_config,
    }
}

fn to_google_contents(messages: &[Message]) -> Vec<GoogleContent> {
    let mut contents: Vec<GoogleContent> = Vec::new();

    for message in messages {
        match message {
            Message::System { .. } => {}
            Message::User { content } => contents.push(GoogleContent {
                role: Some("user".to_owned()),
                parts: vec![GooglePart::text(content.clone())],
            }),
            Message::Assistant {
                content,
                tool_invocations,
            } => {
                let mut parts = Vec::new();
                if let Some(text) = content.as_ref().filter(|t| !t.is_empty()) {
                    parts.push(GooglePart::text(text.clone()));
                }
                parts.extend(tool_invocations.iter().map(|invocation| GooglePart {
                    function_call: Some(GoogleFunctionCall {
                        name: invocation.name.clone(),
                        args: invocation.arguments_json(),
                    }),
                    thought_signature: invocation.opaque_continuation.clone(),
                    ..GooglePart::default()
                }));
                if parts.is_empty() {
                    tracing::debug!("skipping empty assistant message");
                    continue;
                }
                contents.push(GoogleContent {
                    role: Some("model".to_owned()),
                    parts,
                });
            }
            Message::Tool { tool_name, result, .. } => {
                let part = GooglePart {
                    function_response: Some(GoogleFunctionResponse {
                        name: tool_name.clone(),
                        response: serde_json::json!({"name": tool_name, "content": result}),
                    }),
                    ..GooglePart::default()
                };
                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(GoogleContent {
                        role: Some("user".to_owned()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    contents
}

/// Strip schema keywords Gemini rejects, leaving property names untouched
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| {
                    let value = match value {
                        Value::Object(properties) if key == "properties" => Value::Object(
                            properties
                                .iter()
                                .map(|(name, property)| (name.clone(), sanitize_schema(property)))
                                .collect(),
                        ),
                        other => sanitize_schema(other),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

// -- Inbound: Google wire format -> canonical --

pub fn usage_from_google(usage: &GoogleUsageMetadata) -> Usage {
    let mut mapped = Usage::new(usage.prompt_token_count, usage.candidates_token_count);
    if usage.total_token_count > 0 {
        mapped.total_tokens = usage.total_token_count;
    }
    mapped.reasoning_tokens = usage.thoughts_token_count;
    mapped.cached_input_tokens = usage.cached_content_token_count;
    mapped
}

fn tool_invocation(part: &GooglePart, call: &GoogleFunctionCall) -> ToolInvocation {
    ToolInvocation {
        opaque_continuation: part.thought_signature.clone(),
        ..ToolInvocation::new(
            format!("call_{}", uuid::Uuid::new_v4().simple()),
            call.name.clone(),
            call.args.to_string(),
        )
    }
}

/// Finish reason, promoted to tool calls when the candidate called functions
fn finish_reason(reason: &str, called_tools: bool) -> FinishReason {
    match FinishReason::from_vendor(reason) {
        FinishReason::Stop if called_tools => FinishReason::ToolCalls,
        other => other,
    }
}

impl From<GoogleResponse> for ProviderCompletion {
    fn from(response: GoogleResponse) -> Self {
        let mut content = String::new();
        let mut tool_invocations = Vec::new();
        let mut reason = None;

        if let Some(candidate) = response.candidates.into_iter().next() {
            for part in &candidate.content.parts {
                if let Some(call) = &part.function_call {
                    tool_invocations.push(tool_invocation(part, call));
                } else if let Some(text) = &part.text
                    && !part.is_thought()
                {
                    content.push_str(text);
                }
            }
            reason = candidate
                .finish_reason
                .as_deref()
                .map(|r| finish_reason(r, !tool_invocations.is_empty()));
        }

        Self {
            id: response.response_id.unwrap_or_default(),
            model: response.model_version.unwrap_or_default(),
            content,
            tool_invocations,
            usage: response.usage_metadata.as_ref().map(usage_from_google),
            finish_reason: reason,
        }
    }
}

pub fn failure_from_stream_error(error: &GoogleErrorResponse) -> ProviderFailure {
    let mut failure = ProviderFailure::new(FailureOrigin::Stream, error.error.message.clone());
    failure.status = u16::try_from(error.error.code).ok().filter(|code| *code >= 400);
    if !error.error.status.is_empty() {
        failure = failure.with_vendor_type(error.error.status.clone());
    }
    failure
}

// -- Stream conversion --

/// State tracker for converting Google streaming chunks
#[derive(Debug, Default)]
pub struct GoogleStreamState {
    started: bool,
    reasoning_open: bool,
    called_tools: bool,
}

impl GoogleStreamState {
    pub fn new() -> Self {
        Self::default()
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

    /// Convert one streamed partial response
    pub fn convert_chunk(&mut self, chunk: &GoogleResponse) -> Vec<ProviderStreamItem> {
        let mut items = Vec::new();

        if !self.started {
            self.started = true;
            items.push(ProviderStreamItem::ResponseStart {
                id: chunk.response_id.clone().unwrap_or_default(),
                model: chunk.model_version.clone().unwrap_or_default(),
            });
        }

        let usage = chunk.usage_metadata.as_ref().map(usage_from_google);
        let mut finished = false;

        if let Some(candidate) = chunk.candidates.first() {
            for part in &candidate.content.parts {
                if let Some(call) = &part.function_call {
                    self.close_reasoning(&mut items);
                    self.called_tools = true;
                    items.push(ProviderStreamItem::ToolCall(tool_invocation(part, call)));
                } else if let Some(text) = part.text.as_ref().filter(|t| !t.is_empty()) {
                    if part.is_thought() {
                        self.reasoning_open = true;
                        items.push(ProviderStreamItem::ReasoningDelta(text.clone()));
                    } else {
                        self.close_reasoning(&mut items);
                        items.push(ProviderStreamItem::TextDelta(text.clone()));
                    }
                }
            }

            if let Some(reason) = candidate.finish_reason.as_deref() {
                self.close_reasoning(&mut items);
                finished = true;
                items.push(ProviderStreamItem::Finish {
                    reason: finish_reason(reason, self.called_tools),
                    usage,
                });
            }
        }

        if !finished && let Some(usage) = usage {
            items.push(ProviderStreamItem::Usage(usage));
        }

        items
    }
}
