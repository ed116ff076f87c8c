mod harness;

use std::time::Duration;

use axum::http::StatusCode;
use futures_util::StreamExt;
use harness::config::ConfigBuilder;
use harness::mock_llm::{Behavior, MockLlm};
use parley_llm::{ChatCompletionOptions, LlmError, Message, Orchestrator, StreamEvent, ToolSchema};
use tokio_util::sync::CancellationToken;

fn hello() -> ChatCompletionOptions {
    ChatCompletionOptions::new(vec![Message::user("Hello")]).with_model("mock-model-1")
}

async fn collect(mut stream: parley_llm::StreamingCompletion) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn streams_text_then_complete() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new().with_provider("openai", &mock.base_url()).build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let stream = orchestrator
        .create_streaming_chat_completion("openai", &hello())
        .await
        .unwrap();
    let events = collect(stream).await;

    assert_eq!(events.first(), Some(&StreamEvent::StreamStart));
    assert!(events.contains(&StreamEvent::TextStart));

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::TextChunk {
                delta,
                accumulated,
                sequence,
            } => Some((delta.as_str(), accumulated.as_str(), *sequence)),
            _ => None,
        })
        .collect();
    assert_eq!(
        chunks,
        [
            ("Hello", "Hello", 0),
            (" from", "Hello from", 1),
            (" mock", "Hello from mock", 2)
        ]
    );

    assert!(
        events
            .iter()
            .any(|e| matches!(e, StreamEvent::UsageUpdate { usage } if usage.total_tokens == 15))
    );

    let Some(StreamEvent::Complete { response, metrics, .. }) = events.last() else {
        panic!("stream did not complete: {events:?}");
    };
    assert_eq!(response.content, "Hello from mock");
    assert_eq!(response.id, "chatcmpl-test-stream");
    assert_eq!(response.usage.as_ref().map(|u| u.input_tokens), Some(10));
    assert_eq!(metrics.as_ref().map(|m| m.text_chunks), Some(3));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn final_response_matches_complete_event() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new().with_provider("openai", &mock.base_url()).build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let stream = orchestrator
        .create_streaming_chat_completion("openai", &hello())
        .await
        .unwrap();
    let (events, final_response, _cancel) = stream.into_parts();
    let events: Vec<_> = events.collect().await;
    let response = final_response.await.unwrap();

    let Some(StreamEvent::Complete { response: completed, .. }) = events.last() else {
        panic!("stream did not complete: {events:?}");
    };
    assert_eq!(completed, &response);
}

#[tokio::test]
async fn usage_option_follows_provider_support() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("openai", &mock.base_url())
        .with_provider("openai-compatible", &mock.base_url())
        .build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let stream = orchestrator
        .create_streaming_chat_completion("openai", &hello())
        .await
        .unwrap();
    stream.final_response().await.unwrap();
    let sent = mock.last_request().unwrap();
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["stream_options"]["include_usage"], true);

    let stream = orchestrator
        .create_streaming_chat_completion("openai-compatible", &hello())
        .await
        .unwrap();
    stream.final_response().await.unwrap();
    let sent = mock.last_request().unwrap();
    assert_eq!(sent["stream"], true);
    assert!(sent.get("stream_options").is_none());
}

#[tokio::test]
async fn tool_call_fragments_are_assembled() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new().with_provider("openai", &mock.base_url()).build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let options = hello().with_tools(vec![ToolSchema::new(
        "get_weather",
        "Get current weather",
        serde_json::json!({"type": "object", "properties": {"location": {"type": "string"}}}),
    )]);
    let stream = orchestrator
        .create_streaming_chat_completion("openai", &options)
        .await
        .unwrap();
    let events = collect(stream).await;

    let calls: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ToolCall { invocation, .. } => Some(invocation),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_test_123");
    assert_eq!(calls[0].name, "get_weather");
    assert_eq!(calls[0].arguments_json(), serde_json::json!({"location": "San Francisco"}));

    let Some(StreamEvent::Complete { response, .. }) = events.last() else {
        panic!("stream did not complete: {events:?}");
    };
    assert_eq!(response.tool_invocations.as_ref().map(Vec::len), Some(1));
}

#[tokio::test]
async fn http_error_becomes_single_error_event() {
    let mock = MockLlm::start_with(Behavior::Fail {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: serde_json::json!({"error": {"message": "upstream exploded", "type": "server_error"}}),
    })
    .await
    .unwrap();
    let config = ConfigBuilder::new().with_provider("openai", &mock.base_url()).build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let stream = orchestrator
        .create_streaming_chat_completion("openai", &hello())
        .await
        .unwrap();
    let events = collect(stream).await;

    assert_eq!(events.len(), 2, "got {events:?}");
    assert_eq!(events[0], StreamEvent::StreamStart);
    let StreamEvent::Error { cause } = &events[1] else {
        panic!("expected error event: {events:?}");
    };
    assert!(matches!(cause, LlmError::Request { .. }));
    assert!(cause.message().starts_with("Server error (500)"), "got {}", cause.message());
}

#[tokio::test]
async fn cancel_stops_a_hanging_stream() {
    let mock = MockLlm::start_with(Behavior::Hang).await.unwrap();
    let config = ConfigBuilder::new().with_provider("openai", &mock.base_url()).build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let mut stream = orchestrator
        .create_streaming_chat_completion("openai", &hello())
        .await
        .unwrap();

    // wait for the first delta so the request is in flight
    loop {
        match stream.next_event().await {
            Some(StreamEvent::TextChunk { .. }) => break,
            Some(_) => {}
            None => panic!("stream ended before any text"),
        }
    }

    stream.cancel();
    stream.cancel();

    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        let mut rest = Vec::new();
        while let Some(event) = stream.next_event().await {
            rest.push(event);
        }
        rest
    })
    .await
    .expect("cancellation should end the stream");

    assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1, "got {rest:?}");
    assert!(matches!(rest.last(), Some(StreamEvent::Error { cause: LlmError::Request { .. } })));
}

#[tokio::test]
async fn external_token_cancels_the_stream() {
    let mock = MockLlm::start_with(Behavior::Hang).await.unwrap();
    let config = ConfigBuilder::new().with_provider("openai", &mock.base_url()).build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let token = CancellationToken::new();

    let stream = orchestrator
        .create_streaming_chat_completion_with("openai", &hello(), &token)
        .await
        .unwrap();
    let cancel = stream.cancel_handle();

    tokio::spawn({
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        }
    });

    let result = tokio::time::timeout(Duration::from_secs(5), stream.final_response())
        .await
        .expect("cancellation should resolve the final response");
    assert!(matches!(result, Err(LlmError::Request { .. })));
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn missing_model_fails_before_streaming() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_keyless_provider("openai-compatible", &mock.base_url())
        .build();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let options = ChatCompletionOptions::new(vec![Message::user("Hello")]);
    let err = orchestrator
        .create_streaming_chat_completion("openai-compatible", &options)
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Configuration { .. }), "got {err:?}");
    assert_eq!(mock.completion_count(), 0);
}
