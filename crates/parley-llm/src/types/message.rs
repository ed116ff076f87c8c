use serde::{Deserialize, Serialize};

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// System instruction
    System {
        /// Instruction text
        content: String,
    },
    /// User turn
    User {
        /// User text
        content: String,
    },
    /// Assistant turn, possibly requesting tools
    Assistant {
        /// Text reply
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Tools the assistant asked to run
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_invocations: Vec<ToolInvocation>,
    },
    /// Result of running a tool
    Tool {
        /// Invocation this result answers
        tool_invocation_id: String,
        /// Name of the tool that ran
        tool_name: String,
        /// Tool output
        result: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_invocations: Vec::new(),
        }
    }

    pub fn tool_result(invocation: &ToolInvocation, result: impl Into<String>) -> Self {
        Self::Tool {
            tool_invocation_id: invocation.id.clone(),
            tool_name: invocation.name.clone(),
            result: result.into(),
        }
    }
}

/// A tool call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Vendor-assigned identifier
    pub id: String,
    /// Tool name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
    /// Vendor state that must be echoed back verbatim on the next turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque_continuation: Option<String>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            opaque_continuation: None,
        }
    }

    /// Arguments parsed as JSON, or an empty object when they are blank or invalid
    pub fn arguments_json(&self) -> serde_json::Value {
        if self.arguments.trim().is_empty() {
            return serde_json::Value::Object(serde_json::Map::new());
        }
        serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
            tracing::debug!(tool = %self.name, error = %e, "tool arguments are not valid JSON");
            serde_json::Value::Object(serde_json::Map::new())
        })
    }
}
