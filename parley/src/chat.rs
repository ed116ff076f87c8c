//! `parley chat`: one prompt, one reply

use std::io::Write;

use futures_util::StreamExt;
use parley_llm::{ChatCompletionOptions, ChatCompletionResponse, Message, Orchestrator, ReasoningEffort, StreamEvent};
use tokio_util::sync::CancellationToken;

pub struct ChatRequest {
    pub provider: String,
    pub model: Option<String>,
    pub system: Option<String>,
    pub reasoning: Option<ReasoningEffort>,
    pub prompt: String,
}

impl ChatRequest {
    fn options(self) -> ChatCompletionOptions {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(self.prompt));

        let mut options = ChatCompletionOptions::new(messages);
        options.model = self.model;
        options.reasoning_effort = self.reasoning;
        options
    }
}

/// Wait for the whole reply, then print it
pub async fn complete(orchestrator: &Orchestrator, request: ChatRequest, cancel: &CancellationToken) -> anyhow::Result<()> {
    let provider = request.provider.clone();
    let response = orchestrator
        .create_chat_completion_with(&provider, &request.options(), cancel)
        .await?;

    println!("{}", response.content);
    log_summary(&response);
    Ok(())
}

/// Print text as it arrives; reasoning and tool calls go to stderr
pub async fn stream(orchestrator: &Orchestrator, request: ChatRequest, cancel: &CancellationToken) -> anyhow::Result<()> {
    let provider = request.provider.clone();
    let completion = orchestrator
        .create_streaming_chat_completion_with(&provider, &request.options(), cancel)
        .await?;
    let (mut events, _final_response, _cancel) = completion.into_parts();

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::TextChunk { delta, .. } => {
                write!(stdout, "{delta}")?;
                stdout.flush()?;
            }
            StreamEvent::ThinkingChunk { content, .. } => {
                write!(stderr, "{content}")?;
            }
            StreamEvent::ThinkingComplete { .. } => writeln!(stderr)?,
            StreamEvent::ToolCall { invocation, .. } => {
                writeln!(stderr, "[tool call] {}({})", invocation.name, invocation.arguments)?;
            }
            StreamEvent::Complete {
                response,
                total_duration_ms,
                metrics,
            } => {
                writeln!(stdout)?;
                log_summary(&response);
                if let Some(metrics) = metrics {
                    tracing::debug!(
                        total_duration_ms,
                        time_to_first_token_ms = ?metrics.time_to_first_token_ms,
                        text_chunks = metrics.text_chunks,
                        "stream metrics"
                    );
                }
            }
            StreamEvent::Error { cause } => {
                writeln!(stdout)?;
                return Err(cause.into());
            }
            StreamEvent::StreamStart | StreamEvent::TextStart | StreamEvent::ThinkingStart | StreamEvent::UsageUpdate { .. } => {}
        }
    }

    Ok(())
}

fn log_summary(response: &ChatCompletionResponse) {
    if response.tools_disabled == Some(true) {
        tracing::warn!(model = %response.model, "model does not support tools; tools were not sent");
    }
    if let Some(usage) = &response.usage {
        tracing::info!(
            model = %response.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            total_tokens = usage.total_tokens,
            "completion finished"
        );
    }
}
