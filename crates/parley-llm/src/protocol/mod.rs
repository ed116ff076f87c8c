//! Vendor wire formats
//!
//! Pure serde structs matching each vendor's JSON API. They only live at the
//! HTTP boundary; everything past it uses the canonical types.

pub mod anthropic;
pub mod google;
pub mod models_dev;
pub mod openai;
