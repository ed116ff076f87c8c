//! Built-in model tables
//!
//! Static providers are described entirely from here. Hybrid providers take
//! their id list from here and their capabilities from the metadata catalog.

use super::descriptor::ModelDescriptor;

/// Row of a static model table
struct StaticModel {
    id: &'static str,
    display_name: &'static str,
    context_window: u32,
    tools: bool,
    reasoning: bool,
    vision: bool,
    pdf: bool,
}

impl StaticModel {
    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            id: self.id.to_owned(),
            display_name: self.display_name.to_owned(),
            context_window: self.context_window,
            supports_tools: self.tools,
            is_reasoning_model: self.reasoning,
            supports_vision: self.vision,
            supports_pdf: self.pdf,
        }
    }
}

const ANTHROPIC_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "claude-opus-4-1-20250805",
        display_name: "Claude Opus 4.1",
        context_window: 200_000,
        tools: true,
        reasoning: true,
        vision: true,
        pdf: true,
    },
    StaticModel {
        id: "claude-opus-4-20250514",
        display_name: "Claude Opus 4",
        context_window: 200_000,
        tools: true,
        reasoning: true,
        vision: true,
        pdf: true,
    },
    StaticModel {
        id: "claude-sonnet-4-20250514",
        display_name: "Claude Sonnet 4",
        context_window: 200_000,
        tools: true,
        reasoning: true,
        vision: true,
        pdf: true,
    },
    StaticModel {
        id: "claude-3-7-sonnet-20250219",
        display_name: "Claude Sonnet 3.7",
        context_window: 200_000,
        tools: true,
        reasoning: true,
        vision: true,
        pdf: true,
    },
    StaticModel {
        id: "claude-3-5-haiku-20241022",
        display_name: "Claude Haiku 3.5",
        context_window: 200_000,
        tools: true,
        reasoning: false,
        vision: true,
        pdf: true,
    },
    StaticModel {
        id: "claude-3-haiku-20240307",
        display_name: "Claude Haiku 3",
        context_window: 200_000,
        tools: true,
        reasoning: false,
        vision: true,
        pdf: false,
    },
];

const DEEPSEEK_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "deepseek-chat",
        display_name: "DeepSeek Chat",
        context_window: 128_000,
        tools: true,
        reasoning: false,
        vision: false,
        pdf: false,
    },
    StaticModel {
        id: "deepseek-reasoner",
        display_name: "DeepSeek Reasoner",
        context_window: 128_000,
        tools: false,
        reasoning: true,
        vision: false,
        pdf: false,
    },
];

const OPENAI_IDS: &[&str] = &[
    "gpt-5",
    "gpt-5-mini",
    "gpt-5-nano",
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4o",
    "gpt-4o-mini",
    "o3",
    "o4-mini",
];

const GOOGLE_IDS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
];

const GROQ_IDS: &[&str] = &[
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
    "openai/gpt-oss-120b",
    "qwen/qwen3-32b",
    "moonshotai/kimi-k2-instruct",
];

const XAI_IDS: &[&str] = &["grok-4", "grok-3", "grok-3-mini", "grok-code-fast-1"];

const MISTRAL_IDS: &[&str] = &[
    "mistral-large-latest",
    "mistral-medium-latest",
    "mistral-small-latest",
    "codestral-latest",
    "magistral-medium-latest",
];

const CEREBRAS_IDS: &[&str] = &["llama-3.3-70b", "llama3.1-8b", "qwen-3-32b", "gpt-oss-120b"];

/// Full descriptors for a static provider
pub fn static_models(provider: &str) -> Option<Vec<ModelDescriptor>> {
    let table = match provider {
        "anthropic" => ANTHROPIC_MODELS,
        "deepseek" => DEEPSEEK_MODELS,
        _ => return None,
    };
    Some(table.iter().map(StaticModel::descriptor).collect())
}

/// Built-in id list for a hybrid provider
pub fn hybrid_ids(provider: &str) -> &'static [&'static str] {
    match provider {
        "openai" => OPENAI_IDS,
        "google" => GOOGLE_IDS,
        "groq" => GROQ_IDS,
        "xai" => XAI_IDS,
        "mistral" => MISTRAL_IDS,
        "cerebras" => CEREBRAS_IDS,
        _ => &[],
    }
}
