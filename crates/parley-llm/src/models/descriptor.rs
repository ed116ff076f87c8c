use serde::Serialize;

/// Context window assumed for models nobody describes
pub const FALLBACK_CONTEXT_WINDOW: u32 = 128_000;

/// Capabilities of one model on one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub context_window: u32,
    pub supports_tools: bool,
    pub is_reasoning_model: bool,
    pub supports_vision: bool,
    pub supports_pdf: bool,
}

impl ModelDescriptor {
    /// Conservative descriptor for an id no source knows about
    ///
    /// Tool calling is assumed since nearly every current chat model has it.
    pub fn fallback(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            display_name: id.to_owned(),
            context_window: FALLBACK_CONTEXT_WINDOW,
            supports_tools: true,
            is_reasoning_model: false,
            supports_vision: false,
            supports_pdf: false,
        }
    }
}
