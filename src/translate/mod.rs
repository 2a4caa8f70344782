//! Format translators.
//!
//! # Data Flow
//! ```text
//! Upstream payload (JSON asset index / PNG skin)
//!     → assets.rs  (index objects → "name,size,0" lines)
//!     → skin.rs    (PNG check → legacy image bytes)
//!     → Handler wraps the result in a ResponseDescriptor
//! ```
//!
//! # Design Decisions
//! - Pure functions: no I/O, no logging, no shared state
//! - Malformed input is an explicit `TranslateError`, never a truncated body
//! - Callers decide the fallback

pub mod assets;
pub mod skin;

use thiserror::Error;

pub use assets::{asset_index_to_legacy, AssetEntry};
pub use skin::skin_to_legacy;

/// Body the legacy client reads as "authentication succeeded".
pub const AUTH_SUCCESS_TOKEN: &[u8] = b"0";

/// Errors raised when an upstream payload cannot be translated.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid field: {0}")]
    Field(String),
    #[error("invalid image: {0}")]
    Image(String),
}
