//! Mock OpenAI-compatible backend for integration tests
//!
//! Serves canned chat completions (plain and SSE) and a model list, counts
//! requests, and records the last chat request body for assertions.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// How the mock answers chat requests
#[derive(Debug, Clone, Default)]
pub enum Behavior {
    /// Answer normally
    #[default]
    Reply,
    /// Fail every chat request with this status and JSON body
    Fail { status: StatusCode, body: serde_json::Value },
    /// Stream the first text chunk, then never finish
    Hang,
}

/// Mock LLM backend that returns predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    models_count: AtomicU32,
    behavior: Behavior,
    /// Words streamed back as separate chunks
    words: Vec<String>,
    last_request: Mutex<Option<serde_json::Value>>,
}

impl MockLlm {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(Behavior::Reply).await
    }

    pub async fn start_with(behavior: Behavior) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            models_count: AtomicU32::new(0),
            behavior,
            words: ["Hello", "from", "mock"].map(str::to_owned).to_vec(),
            last_request: Mutex::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/models", routing::get(handle_models))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a provider
    ///
    /// Includes `/v1` since the client appends paths like `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of chat completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Number of model list requests received
    pub fn models_count(&self) -> u32 {
        self.state.models_count.load(Ordering::Relaxed)
    }

    /// Body of the most recent chat request
    pub fn last_request(&self) -> Option<serde_json::Value> {
        self.state.last_request.lock().unwrap().clone()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Wire types matching OpenAI format --

#[derive(Debug, Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

const USAGE: Usage = Usage {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

#[derive(Debug, Serialize)]
struct ModelListResponse {
    object: String,
    data: Vec<ModelObject>,
}

#[derive(Debug, Serialize)]
struct ModelObject {
    id: String,
    object: String,
    owned_by: String,
}

// -- Handlers --

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    Json(req): Json<serde_json::Value>,
) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    *state.last_request.lock().unwrap() = Some(req.clone());

    if let Behavior::Fail { status, body } = &state.behavior {
        return (*status, Json(body.clone())).into_response();
    }

    let model = req["model"].as_str().unwrap_or_default().to_owned();
    let has_tools = req.get("tools").is_some();

    if req["stream"].as_bool().unwrap_or(false) {
        let chunks = stream_chunks(&state.words, &model, has_tools);
        if matches!(state.behavior, Behavior::Hang) {
            let first = Bytes::from(chunks[0].clone());
            let body = futures_util::stream::once(async move { Ok::<_, Infallible>(first) })
                .chain(futures_util::stream::pending());
            return sse(Body::from_stream(body));
        }
        return sse(Body::from(chunks.concat()));
    }

    let message = if has_tools {
        serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_test_123",
                "type": "function",
                "function": {"name": "get_weather", "arguments": r#"{"location":"San Francisco"}"#}
            }]
        })
    } else {
        serde_json::json!({"role": "assistant", "content": state.words.join(" ")})
    };

    Json(serde_json::json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": if has_tools { "tool_calls" } else { "stop" }
        }],
        "usage": USAGE
    }))
    .into_response()
}

fn sse(body: Body) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

/// SSE frames for a streamed answer: content, finish, usage, done
fn stream_chunks(words: &[String], model: &str, has_tools: bool) -> Vec<String> {
    let chunk = |choices: serde_json::Value, usage: Option<&Usage>| {
        let mut value = serde_json::json!({
            "id": "chatcmpl-test-stream",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": model,
            "choices": choices,
        });
        if let Some(usage) = usage {
            value["usage"] = serde_json::to_value(usage).unwrap();
        }
        format!("data: {value}\n\n")
    };

    let mut frames = Vec::new();
    if has_tools {
        // Arguments arrive in fragments after the id and name
        frames.push(chunk(
            serde_json::json!([{"index": 0, "delta": {"role": "assistant", "tool_calls": [{
                "index": 0, "id": "call_test_123", "type": "function",
                "function": {"name": "get_weather", "arguments": ""}
            }]}}]),
            None,
        ));
        for fragment in [r#"{"loca"#, r#"tion":"San "#, r#"Francisco"}"#] {
            frames.push(chunk(
                serde_json::json!([{"index": 0, "delta": {"tool_calls": [{
                    "index": 0, "function": {"arguments": fragment}
                }]}}]),
                None,
            ));
        }
        frames.push(chunk(serde_json::json!([{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]), None));
    } else {
        for (i, word) in words.iter().enumerate() {
            let text = if i == 0 { word.clone() } else { format!(" {word}") };
            frames.push(chunk(serde_json::json!([{"index": 0, "delta": {"content": text}}]), None));
        }
        frames.push(chunk(serde_json::json!([{"index": 0, "delta": {}, "finish_reason": "stop"}]), None));
    }

    frames.push(chunk(serde_json::json!([]), Some(&USAGE)));
    frames.push("data: [DONE]\n\n".to_owned());
    frames
}

async fn handle_models(State(state): State<Arc<MockLlmState>>) -> impl IntoResponse {
    state.models_count.fetch_add(1, Ordering::Relaxed);

    Json(ModelListResponse {
        object: "list".to_owned(),
        data: ["mock-model-1", "mock-model-2"]
            .into_iter()
            .map(|id| ModelObject {
                id: id.to_owned(),
                object: "model".to_owned(),
                owned_by: "mock".to_owned(),
            })
            .collect(),
    })
}
