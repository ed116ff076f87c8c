//! Provider stream items to canonical stream events
//!
//! The normalizer is a synchronous state machine; the driver in
//! [`crate::streaming`] feeds it items and forwards the events it produces.

use std::time::Duration;

use tokio::time::Instant;

use crate::failure::ProviderFailure;
use crate::provider::ProviderStreamItem;
use crate::types::{ChatCompletionResponse, FinishReason, StreamEvent, StreamMetrics, ToolInvocation, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Streaming,
    Finished,
    Failed,
}

/// What the driver should do after an item
#[derive(Debug)]
pub(crate) enum Step {
    Continue,
    /// Finish signal seen; stop consuming content
    Finished,
    Failed(ProviderFailure),
}

/// Per-call settings the normalizer needs
#[derive(Debug, Clone, Default)]
pub(crate) struct NormalizerSettings {
    pub provider: String,
    pub model: String,
    pub reasoning_requested: bool,
    pub native_tools: Vec<String>,
    pub tools_disabled: bool,
}

#[derive(Debug)]
pub(crate) struct Normalizer {
    settings: NormalizerSettings,
    phase: Phase,
    started_at: Instant,
    first_token: Option<Duration>,
    id: String,
    model: String,
    content: String,
    text_started: bool,
    thinking_started: bool,
    thinking_completed: bool,
    text_sequence: u32,
    thinking_sequence: u32,
    tool_sequence: u32,
    invocations: Vec<ToolInvocation>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    metrics: StreamMetrics,
}

impl Normalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self {
            model: settings.model.clone(),
            settings,
            phase: Phase::Idle,
            started_at: Instant::now(),
            first_token: None,
            id: String::new(),
            content: String::new(),
            text_started: false,
            thinking_started: false,
            thinking_completed: false,
            text_sequence: 0,
            thinking_sequence: 0,
            tool_sequence: 0,
            invocations: Vec::new(),
            usage: None,
            finish_reason: None,
            metrics: StreamMetrics::default(),
        }
    }

    #[cfg(test)]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a usage report has been recorded
    pub const fn has_usage(&self) -> bool {
        self.usage.is_some()
    }

    /// Enter the streaming phase
    pub fn start(&mut self) -> StreamEvent {
        self.phase = Phase::Streaming;
        self.started_at = Instant::now();
        StreamEvent::StreamStart
    }

    fn mark_first_token(&mut self) {
        if self.first_token.is_none() {
            self.first_token = Some(self.started_at.elapsed());
        }
    }

    /// Feed one provider item, pushing any resulting events
    pub fn accept(&mut self, item: ProviderStreamItem, events: &mut Vec<StreamEvent>) -> Step {
        if self.phase == Phase::Finished {
            return self.accept_after_finish(item, events);
        }
        if self.phase != Phase::Streaming {
            return Step::Continue;
        }

        match item {
            ProviderStreamItem::ResponseStart { id, model } => {
                if !id.is_empty() {
                    self.id = id;
                }
                if !model.is_empty() {
                    self.model = model;
                }
            }

            ProviderStreamItem::TextDelta(delta) => {
                if delta.is_empty() {
                    return Step::Continue;
                }
                self.mark_first_token();
                if !self.text_started {
                    self.text_started = true;
                    events.push(StreamEvent::TextStart);
                }
                self.content.push_str(&delta);
                events.push(StreamEvent::TextChunk {
                    delta,
                    accumulated: self.content.clone(),
                    sequence: self.text_sequence,
                });
                self.text_sequence += 1;
                self.metrics.text_chunks += 1;
            }

            ProviderStreamItem::ReasoningDelta(content) => {
                if !self.settings.reasoning_requested || content.is_empty() {
                    return Step::Continue;
                }
                self.mark_first_token();
                if !self.thinking_started {
                    self.thinking_started = true;
                    events.push(StreamEvent::ThinkingStart);
                }
                events.push(StreamEvent::ThinkingChunk {
                    content,
                    sequence: self.thinking_sequence,
                });
                self.thinking_sequence += 1;
                self.metrics.thinking_chunks += 1;
            }

            ProviderStreamItem::ReasoningEnd { usage, total_usage } => {
                let tokens = total_usage
                    .and_then(|u| u.reasoning_tokens)
                    .or_else(|| usage.and_then(|u| u.reasoning_tokens));
                self.complete_thinking(tokens, events);
            }

            ProviderStreamItem::ToolCall(invocation) => {
                if self.settings.native_tools.contains(&invocation.name) {
                    tracing::debug!(
                        provider = %self.settings.provider,
                        tool = %invocation.name,
                        "native tool executed by provider"
                    );
                    return Step::Continue;
                }
                events.push(StreamEvent::ToolCall {
                    invocation: invocation.clone(),
                    sequence: self.tool_sequence,
                });
                self.tool_sequence += 1;
                self.metrics.tool_calls += 1;
                self.invocations.push(invocation);
            }

            ProviderStreamItem::Usage(usage) => self.record_usage(usage, events),

            ProviderStreamItem::Finish { reason, usage } => {
                if !reason.is_expected() {
                    tracing::warn!(provider = %self.settings.provider, reason = ?reason, "unexpected finish reason");
                }
                let reasoning_tokens = usage.and_then(|u| u.reasoning_tokens);
                self.complete_thinking(reasoning_tokens, events);
                if let Some(usage) = usage {
                    self.record_usage(usage, events);
                }
                self.finish_reason = Some(reason);
                self.phase = Phase::Finished;
                return Step::Finished;
            }

            ProviderStreamItem::Error(failure) => {
                self.phase = Phase::Failed;
                return Step::Failed(failure);
            }

            ProviderStreamItem::Abort => {
                self.phase = Phase::Failed;
                return Step::Failed(ProviderFailure::aborted());
            }

            ProviderStreamItem::Other(kind) => {
                tracing::trace!(provider = %self.settings.provider, kind = %kind, "ignoring provider event");
            }
        }

        Step::Continue
    }

    /// Only usage is accepted once the finish signal has been seen
    fn accept_after_finish(&mut self, item: ProviderStreamItem, events: &mut Vec<StreamEvent>) -> Step {
        match item {
            ProviderStreamItem::Usage(usage)
            | ProviderStreamItem::Finish {
                usage: Some(usage), ..
            } => self.record_usage(usage, events),
            ProviderStreamItem::Abort => {
                tracing::debug!(provider = %self.settings.provider, "abort after finish ignored");
            }
            _ => {}
        }
        Step::Finished
    }

    fn complete_thinking(&mut self, total_tokens: Option<u32>, events: &mut Vec<StreamEvent>) {
        if self.thinking_started && !self.thinking_completed {
            self.thinking_completed = true;
            events.push(StreamEvent::ThinkingComplete { total_tokens });
        }
    }

    fn record_usage(&mut self, usage: Usage, events: &mut Vec<StreamEvent>) {
        let merged = match self.usage {
            Some(mut current) => {
                current.merge(&usage);
                current
            }
            None => usage,
        };
        self.usage = Some(merged);
        events.push(StreamEvent::UsageUpdate { usage: merged });
    }

    /// Treat an exhausted stream as finished
    pub fn synthesize_finish(&mut self, events: &mut Vec<StreamEvent>) {
        if self.phase != Phase::Streaming {
            return;
        }
        tracing::warn!(provider = %self.settings.provider, "stream ended without a finish signal");
        self.complete_thinking(None, events);
        self.finish_reason = Some(FinishReason::Stop);
        self.phase = Phase::Finished;
    }

    /// Mark the call failed
    pub fn fail(&mut self) {
        self.phase = Phase::Failed;
    }

    /// Build the final response and its terminal event
    pub fn complete(&mut self) -> (ChatCompletionResponse, StreamEvent) {
        let response = ChatCompletionResponse {
            id: if self.id.is_empty() {
                format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
            } else {
                self.id.clone()
            },
            model: self.model.clone(),
            content: std::mem::take(&mut self.content),
            tool_invocations: (!self.invocations.is_empty()).then(|| std::mem::take(&mut self.invocations)),
            usage: self.usage,
            tools_disabled: self.settings.tools_disabled.then_some(true),
        };

        let mut metrics = std::mem::take(&mut self.metrics);
        metrics.time_to_first_token_ms = self.first_token.map(duration_ms);

        let event = StreamEvent::Complete {
            response: response.clone(),
            total_duration_ms: duration_ms(self.started_at.elapsed()),
            metrics: Some(metrics),
        };
        (response, event)
    }

    pub const fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(reasoning_requested: bool) -> Normalizer {
        let mut normalizer = Normalizer::new(NormalizerSettings {
            provider: "openai".to_owned(),
            model: "gpt-4.1".to_owned(),
            reasoning_requested,
            native_tools: vec!["web_search".to_owned()],
            tools_disabled: false,
        });
        normalizer.start();
        normalizer
    }

    fn feed(normalizer: &mut Normalizer, items: Vec<ProviderStreamItem>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for item in items {
            normalizer.accept(item, &mut events);
        }
        events
    }

    #[test]
    fn text_chunks_accumulate_with_sequences() {
        let mut n = normalizer(false);
        let events = feed(
            &mut n,
            vec![
                ProviderStreamItem::TextDelta(String::new()),
                ProviderStreamItem::TextDelta("Hel".to_owned()),
                ProviderStreamItem::TextDelta("lo".to_owned()),
            ],
        );

        assert_eq!(
            events,
            vec![
                StreamEvent::TextStart,
                StreamEvent::TextChunk {
                    delta: "Hel".to_owned(),
                    accumulated: "Hel".to_owned(),
                    sequence: 0,
                },
                StreamEvent::TextChunk {
                    delta: "lo".to_owned(),
                    accumulated: "Hello".to_owned(),
                    sequence: 1,
                },
            ]
        );
    }

    #[test]
    fn reasoning_ignored_unless_requested() {
        let mut n = normalizer(false);
        let events = feed(
            &mut n,
            vec![
                ProviderStreamItem::ReasoningDelta("hmm".to_owned()),
                ProviderStreamItem::ReasoningEnd {
                    usage: None,
                    total_usage: None,
                },
            ],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn thinking_completes_once_with_total_usage_tokens() {
        let mut n = normalizer(true);
        let mut total = Usage::new(10, 20);
        total.reasoning_tokens = Some(12);
        let mut partial = Usage::new(10, 5);
        partial.reasoning_tokens = Some(3);

        let events = feed(
            &mut n,
            vec![
                ProviderStreamItem::ReasoningDelta("step one".to_owned()),
                ProviderStreamItem::ReasoningEnd {
                    usage: Some(partial),
                    total_usage: Some(total),
                },
                ProviderStreamItem::ReasoningEnd {
                    usage: None,
                    total_usage: None,
                },
            ],
        );

        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkingStart,
                StreamEvent::ThinkingChunk {
                    content: "step one".to_owned(),
                    sequence: 0,
                },
                StreamEvent::ThinkingComplete { total_tokens: Some(12) },
            ]
        );
    }

    #[test]
    fn native_tool_calls_are_hidden() {
        let mut n = normalizer(false);
        let events = feed(
            &mut n,
            vec![
                ProviderStreamItem::ToolCall(ToolInvocation::new("srv_1", "web_search", "{}")),
                ProviderStreamItem::ToolCall(ToolInvocation::new("call_1", "read_file", "{}")),
            ],
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::ToolCall { invocation, sequence: 0 } if invocation.id == "call_1"));

        let (response, _) = n.complete();
        assert_eq!(response.tool_invocations.unwrap().len(), 1);
    }

    #[test]
    fn finish_is_authoritative() {
        let mut n = normalizer(false);
        let mut events = Vec::new();
        assert!(matches!(
            n.accept(
                ProviderStreamItem::Finish {
                    reason: FinishReason::Stop,
                    usage: None,
                },
                &mut events
            ),
            Step::Finished
        ));
        assert_eq!(n.phase(), Phase::Finished);

        // Content after finish is dropped; usage and abort are tolerated
        n.accept(ProviderStreamItem::TextDelta("late".to_owned()), &mut events);
        assert!(matches!(n.accept(ProviderStreamItem::Abort, &mut events), Step::Finished));
        n.accept(ProviderStreamItem::Usage(Usage::new(4, 2)), &mut events);

        assert_eq!(events, vec![StreamEvent::UsageUpdate { usage: Usage::new(4, 2) }]);
        let (response, event) = n.complete();
        assert_eq!(response.content, "");
        assert_eq!(response.usage, Some(Usage::new(4, 2)));
        assert!(event.is_terminal());
    }

    #[test]
    fn abort_before_finish_fails() {
        let mut n = normalizer(false);
        let mut events = Vec::new();
        let step = n.accept(ProviderStreamItem::Abort, &mut events);
        assert!(matches!(step, Step::Failed(ref failure) if failure.origin == crate::failure::FailureOrigin::Aborted));
        assert_eq!(n.phase(), Phase::Failed);
    }

    #[test]
    fn response_start_sets_id_and_model() {
        let mut n = normalizer(false);
        feed(
            &mut n,
            vec![
                ProviderStreamItem::ResponseStart {
                    id: "chatcmpl-1".to_owned(),
                    model: "gpt-4.1-2025-04-14".to_owned(),
                },
                ProviderStreamItem::TextDelta("ok".to_owned()),
            ],
        );
        let mut events = Vec::new();
        n.synthesize_finish(&mut events);
        assert_eq!(n.finish_reason(), Some(&FinishReason::Stop));

        let (response, event) = n.complete();
        assert_eq!(response.id, "chatcmpl-1");
        assert_eq!(response.model, "gpt-4.1-2025-04-14");
        assert_eq!(response.tools_disabled, None);
        let StreamEvent::Complete { metrics, .. } = event else {
            panic!("expected complete");
        };
        let metrics = metrics.unwrap();
        assert_eq!(metrics.text_chunks, 1);
        assert!(metrics.time_to_first_token_ms.is_some());
    }
}
