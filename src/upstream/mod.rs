//! Substitute upstream services.
//!
//! # Data Flow
//! ```text
//! Handler
//!     → assets.rs / profiles.rs (service-specific call chains)
//!     → client.rs (reqwest GET, per-call timeout)
//!     → raw bytes or UpstreamError
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Base URLs come from configuration so tests can point at local mocks
//! - Only handlers call upstream; pass-through traffic never does

pub mod assets;
pub mod client;
pub mod profiles;

pub use assets::AssetIndexSource;
pub use client::{UpstreamClient, UpstreamError, UpstreamResult};
pub use profiles::SkinSource;
