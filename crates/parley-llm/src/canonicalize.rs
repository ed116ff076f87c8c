//! Canonical options to vendor wire request
//!
//! [`build_request`] is pure and total. It decides which tools are sent,
//! whether the caller's web search is swapped for a vendor's native one,
//! which tool-choice directive applies, and whether reasoning fields are
//! added, then hands the plan to the vendor converter.

use serde_json::Value;

use crate::convert;
use crate::models::ModelDescriptor;
use crate::protocol::anthropic::AnthropicRequest;
use crate::protocol::google::GoogleRequest;
use crate::protocol::openai::OpenAiRequest;
use crate::registry::{ProviderFamily, ProviderSpec, ResolvedProvider};
use crate::types::{ChatCompletionOptions, ReasoningEffort, ToolChoice, ToolSchema, WEB_SEARCH_TOOL};

/// Output cap sent when the caller gives none and the vendor requires one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Model ids that route to another model and so cannot be capability-checked
pub const GATEWAY_MODELS: &[&str] = &["openrouter/auto", "auto"];

pub fn is_gateway_model(model_id: &str) -> bool {
    GATEWAY_MODELS.contains(&model_id)
}

/// Hidden reasoning token budget for an effort level
pub const fn thinking_budget(effort: ReasoningEffort) -> u32 {
    match effort {
        ReasoningEffort::Low => 1024,
        ReasoningEffort::Medium => 4096,
        ReasoningEffort::High => 16384,
        ReasoningEffort::Disabled => 0,
    }
}

/// Request body in the provider's wire format
#[derive(Debug, Clone)]
pub enum WireRequest {
    OpenAi(OpenAiRequest),
    Anthropic(AnthropicRequest),
    Google(GoogleRequest),
}

impl WireRequest {
    /// JSON echo for diagnostics
    pub fn to_json(&self) -> Value {
        let encoded = match self {
            Self::OpenAi(request) => serde_json::to_value(request),
            Self::Anthropic(request) => serde_json::to_value(request),
            Self::Google(request) => serde_json::to_value(request),
        };
        encoded.unwrap_or(Value::Null)
    }
}

/// Everything a provider client needs for one call
#[derive(Debug, Clone)]
pub struct ProviderCallParams {
    pub provider: String,
    pub model: String,
    pub request: WireRequest,
    /// Vendor-executed tools added in place of caller tools
    pub native_tools: Vec<String>,
    /// Tools were requested but the model cannot call them
    pub tools_disabled: bool,
    /// Caller asked a reasoning model to reason; reasoning output is surfaced
    ///
    /// Set even for providers without a request-side reasoning control,
    /// whose reasoning models think unconditionally.
    pub reasoning_requested: bool,
}

impl ProviderCallParams {
    /// Whether a tool name refers to a vendor-executed tool
    pub fn is_native_tool(&self, name: &str) -> bool {
        self.native_tools.iter().any(|t| t == name)
    }
}

/// Decisions shared by every vendor converter
#[derive(Debug)]
pub struct CallPlan<'a> {
    pub spec: &'static ProviderSpec,
    pub model: &'a str,
    pub options: &'a ChatCompletionOptions,
    /// Caller tools that will be sent
    pub tools: Vec<&'a ToolSchema>,
    /// Native tools that will be sent
    pub native_tools: Vec<String>,
    /// Directive to send, if any
    pub tool_choice: Option<&'a ToolChoice>,
    /// Effort to apply, already gated on model capability
    pub reasoning: Option<ReasoningEffort>,
}

impl CallPlan<'_> {
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty() || !self.native_tools.is_empty()
    }
}

/// Build the provider call for one request
///
/// `external_search` tells whether an external search provider key is
/// configured; when it is, the caller's own web search tool is always kept.
pub fn build_request(
    provider: &ResolvedProvider,
    model: &ModelDescriptor,
    options: &ChatCompletionOptions,
    external_search: bool,
) -> ProviderCallParams {
    let spec = provider.spec;
    let tools_allowed = model.supports_tools || is_gateway_model(&model.id);
    let tools_disabled = !options.tools.is_empty() && !tools_allowed;
    if tools_disabled {
        tracing::debug!(provider = %spec.name, model = %model.id, "model does not support tools; dropping them");
    }

    let mut tools: Vec<&ToolSchema> = if tools_allowed { options.tools.iter().collect() } else { Vec::new() };
    let mut native_tools = Vec::new();

    if tools.iter().any(|t| t.name == WEB_SEARCH_TOOL) {
        if external_search {
            tracing::debug!(provider = %spec.name, "external search configured; keeping caller web search");
        } else if spec.native_search {
            tools.retain(|t| t.name != WEB_SEARCH_TOOL);
            native_tools.push(WEB_SEARCH_TOOL.to_owned());
        } else {
            tracing::warn!(
                provider = %spec.name,
                "web search requested without a search key or native search support"
            );
        }
    }

    let has_tools = !tools.is_empty() || !native_tools.is_empty();
    let tool_choice = options
        .tool_choice
        .as_ref()
        .filter(|choice| has_tools && **choice != ToolChoice::None);

    let reasoning = if model.is_reasoning_model {
        options.effective_reasoning()
    } else {
        None
    };

    let plan = CallPlan {
        spec,
        model: &model.id,
        options,
        tools,
        native_tools,
        tool_choice,
        reasoning,
    };

    let request = match spec.family {
        ProviderFamily::OpenAi => WireRequest::OpenAi(convert::openai::build_request(&plan)),
        ProviderFamily::Anthropic => WireRequest::Anthropic(convert::anthropic::build_request(&plan)),
        ProviderFamily::Google => WireRequest::Google(convert::google::build_request(&plan)),
    };
    let reasoning_requested = plan.reasoning.is_some();

    ProviderCallParams {
        provider: spec.name.to_owned(),
        model: model.id.clone(),
        request,
        native_tools: plan.native_tools,
        tools_disabled,
        reasoning_requested,
    }
}
