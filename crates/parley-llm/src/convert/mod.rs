//! Conversion between canonical types and vendor wire formats
//!
//! Each submodule builds the outbound request for its family, maps the
//! synchronous response, and tracks the state needed to turn stream chunks
//! into [`crate::ProviderStreamItem`]s.

pub mod anthropic;
pub mod google;
pub mod openai;
