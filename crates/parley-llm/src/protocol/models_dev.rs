//! Model metadata catalog format (`models.dev/api.json`)
//!
//! Top level is a map from provider key to provider entry, each holding a map
//! from model id to model entry.

use std::collections::HashMap;

use serde::Deserialize;

/// Entire catalog keyed by provider
pub type MetadataCatalog = HashMap<String, MetadataProvider>;

/// One provider in the catalog
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataProvider {
    /// Models keyed by id
    #[serde(default)]
    pub models: HashMap<String, MetadataModel>,
}

/// One model in the catalog
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataModel {
    /// Model identifier
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Produces hidden reasoning
    #[serde(default)]
    pub reasoning: bool,
    /// Supports function calling
    #[serde(default)]
    pub tool_call: bool,
    /// Accepts file attachments
    #[serde(default)]
    pub attachment: bool,
    /// Input/output modalities
    #[serde(default)]
    pub modalities: MetadataModalities,
    /// Token limits
    #[serde(default)]
    pub limit: MetadataLimit,
}

/// Modalities of a catalog model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataModalities {
    /// Accepted inputs (`text`, `image`, `pdf`, ...)
    #[serde(default)]
    pub input: Vec<String>,
}

/// Token limits of a catalog model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataLimit {
    /// Context window
    #[serde(default)]
    pub context: Option<u64>,
    /// Output cap
    #[serde(default)]
    pub output: Option<u64>,
}
