//! Multi-provider chat completion orchestrator
//!
//! Turns one logical "continue this conversation, possibly calling tools"
//! request into a call against one of many vendor APIs (`OpenAI` and its
//! compatible hosts, Anthropic, Google) and normalizes their synchronous and
//! streaming responses into a single canonical event model with typed errors.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod canonicalize;
pub mod classify;
pub mod client;
pub mod convert;
pub mod error;
pub mod failure;
pub mod models;
mod normalizer;
pub mod orchestrator;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod streaming;
pub mod types;

pub use canonicalize::{ProviderCallParams, WireRequest, build_request};
pub use error::LlmError;
pub use failure::ProviderFailure;
pub use models::{ModelCache, ModelDescriptor};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, ProviderHandle};
pub use provider::{Provider, ProviderCompletion, ProviderStream, ProviderStreamItem};
pub use registry::{ProviderDescriptor, ProviderRegistry, ResolvedProvider};
pub use streaming::{CancelHandle, FinalResponse, StreamingCompletion};
pub use types::{
    ChatCompletionOptions, ChatCompletionResponse, FinishReason, Message, ReasoningEffort, StreamEvent, ToolChoice,
    ToolInvocation, ToolSchema, Usage,
};
