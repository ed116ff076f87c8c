use serde::{Deserialize, Serialize};

/// Caller tool name that may be swapped for a vendor's native search
pub const WEB_SEARCH_TOOL: &str = "web_search";

/// Definition of a tool the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the arguments
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Parameters, with a missing schema replaced by an empty object schema
    pub fn parameters_or_empty(&self) -> serde_json::Value {
        if self.parameters.is_null() {
            serde_json::json!({"type": "object", "properties": {}})
        } else {
            self.parameters.clone()
        }
    }
}

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    #[default]
    Auto,
    /// No directive is sent; tools stay visible
    None,
    /// Force a specific tool
    Tool {
        /// Tool to call
        name: String,
    },
}
