//! Streaming completion driver
//!
//! A spawned task pulls provider items, runs them through the normalizer,
//! and forwards canonical events over an unbounded channel. The final
//! response resolves to the same value carried by the terminal event.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::canonicalize::ProviderCallParams;
use crate::classify::report;
use crate::error::LlmError;
use crate::failure::ProviderFailure;
use crate::normalizer::{Normalizer, NormalizerSettings, Step};
use crate::provider::{Provider, ProviderStream};
use crate::types::{ChatCompletionResponse, StreamEvent};

/// Default bound on waiting for a usage report after the finish signal
pub const DEFAULT_USAGE_WAIT: Duration = Duration::from_millis(50);

/// Cancels an in-flight streaming call
///
/// Idempotent; cancelling after the terminal event has no effect.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Canonical events of one streaming call
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Resolves once the call completes or fails
#[derive(Debug)]
pub struct FinalResponse {
    provider: String,
    rx: oneshot::Receiver<Result<ChatCompletionResponse, LlmError>>,
}

impl Future for FinalResponse {
    type Output = Result<ChatCompletionResponse, LlmError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(LlmError::request(
                self.provider.clone(),
                "stream driver stopped unexpectedly",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to a running streaming completion
#[derive(Debug)]
pub struct StreamingCompletion {
    events: EventStream,
    final_response: FinalResponse,
    cancel: CancelHandle,
}

impl StreamingCompletion {
    /// Next canonical event, or `None` after the terminal event
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.next().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the final response, ignoring any unread events
    pub async fn final_response(self) -> Result<ChatCompletionResponse, LlmError> {
        self.final_response.await
    }

    pub fn into_parts(self) -> (EventStream, FinalResponse, CancelHandle) {
        (self.events, self.final_response, self.cancel)
    }
}

/// Everything the driver task owns
pub(crate) struct StreamRequest {
    pub provider: Arc<dyn Provider>,
    pub params: ProviderCallParams,
    pub usage_wait: Duration,
    /// Caller-supplied token; cancelling it aborts the call
    pub cancellation: Option<CancellationToken>,
}

/// Spawn the driver and hand back the caller's handle
pub(crate) fn spawn(request: StreamRequest) -> StreamingCompletion {
    let token = request
        .cancellation
        .as_ref()
        .map_or_else(CancellationToken::new, CancellationToken::child_token);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (final_tx, final_rx) = oneshot::channel();

    let mut normalizer = Normalizer::new(NormalizerSettings {
        provider: request.params.provider.clone(),
        model: request.params.model.clone(),
        reasoning_requested: request.params.reasoning_requested,
        native_tools: request.params.native_tools.clone(),
        tools_disabled: request.params.tools_disabled,
    });
    // Receiver is alive here, so the send cannot fail
    let _ = events_tx.send(normalizer.start());

    let provider_name = request.params.provider.clone();
    let driver = Driver {
        provider: request.provider,
        params: request.params,
        usage_wait: request.usage_wait,
        token: token.clone(),
        events: events_tx,
        normalizer,
    };
    tokio::spawn(async move {
        let result = driver.run().await;
        // The caller may have dropped the final future
        let _ = final_tx.send(result);
    });

    StreamingCompletion {
        events: EventStream { rx: events_rx },
        final_response: FinalResponse {
            provider: provider_name,
            rx: final_rx,
        },
        cancel: CancelHandle { token },
    }
}

struct Driver {
    provider: Arc<dyn Provider>,
    params: ProviderCallParams,
    usage_wait: Duration,
    token: CancellationToken,
    events: mpsc::UnboundedSender<StreamEvent>,
    normalizer: Normalizer,
}

impl Driver {
    async fn run(mut self) -> Result<ChatCompletionResponse, LlmError> {
        match self.consume().await {
            Ok(()) => {
                tracing::debug!(
                    provider = %self.params.provider,
                    model = %self.params.model,
                    finish_reason = ?self.normalizer.finish_reason(),
                    "stream finished"
                );
                let (response, event) = self.normalizer.complete();
                self.emit(vec![event]);
                Ok(response)
            }
            Err(failure) => Err(self.fail(&failure)),
        }
    }

    fn emit(&self, events: Vec<StreamEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                // Caller stopped listening; keep driving so the final future resolves
                break;
            }
        }
    }

    /// Pull items until the finish signal, then wait briefly for usage
    async fn consume(&mut self) -> Result<(), ProviderFailure> {
        let mut stream = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(ProviderFailure::cancelled()),
            stream = self.provider.stream(&self.params) => stream?,
        };

        loop {
            let item = tokio::select! {
                biased;
                () = self.token.cancelled() => return Err(ProviderFailure::cancelled()),
                item = stream.next() => item,
            };

            let mut events = Vec::new();
            let step = match item {
                Some(Ok(item)) => self.normalizer.accept(item, &mut events),
                Some(Err(failure)) => Step::Failed(failure),
                None => {
                    self.normalizer.synthesize_finish(&mut events);
                    self.emit(events);
                    return Ok(());
                }
            };
            self.emit(events);

            match step {
                Step::Continue => {}
                Step::Finished => break,
                Step::Failed(failure) => return Err(failure),
            }
        }

        self.await_usage(&mut stream).await;
        Ok(())
    }

    /// Give a trailing usage report a bounded chance to arrive
    async fn await_usage(&mut self, stream: &mut ProviderStream) {
        if self.normalizer.has_usage() {
            return;
        }

        let deadline = tokio::time::sleep(self.usage_wait);
        tokio::pin!(deadline);
        loop {
            let item = tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                () = &mut deadline => {
                    tracing::debug!(provider = %self.params.provider, "no usage reported before deadline");
                    break;
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(item)) => {
                    let mut events = Vec::new();
                    self.normalizer.accept(item, &mut events);
                    self.emit(events);
                    if self.normalizer.has_usage() {
                        break;
                    }
                }
                Some(Err(failure)) => {
                    tracing::debug!(provider = %self.params.provider, error = %failure, "stream error after finish ignored");
                    break;
                }
                None => break,
            }
        }
    }

    /// Classify, log, and emit the single error event
    fn fail(&mut self, failure: &ProviderFailure) -> LlmError {
        self.normalizer.fail();
        let failure = failure.clone().with_request(self.params.request.to_json());
        let error = report(&failure, &self.params.provider, &self.params.model);
        self.emit(vec![StreamEvent::Error { cause: error.clone() }]);
        error
    }
}
