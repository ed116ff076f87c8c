//! Canonical, provider-agnostic request and response types
//!
//! Every vendor wire format converts to and from these.

pub mod event;
pub mod message;
pub mod options;
pub mod response;
pub mod tool;

pub use event::{StreamEvent, StreamMetrics};
pub use message::{Message, ToolInvocation};
pub use options::{ChatCompletionOptions, ReasoningEffort};
pub use response::{ChatCompletionResponse, FinishReason, Usage};
pub use tool::{ToolChoice, ToolSchema, WEB_SEARCH_TOOL};
