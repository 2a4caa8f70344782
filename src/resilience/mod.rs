//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Origin connect / handler call:
//!     → timeouts.rs (enforce deadline)
//!     → Elapsed → 504, connect failure → 502
//! Upstream service call:
//!     → upstream::client (own per-call timeout)
//!     → handler fallback (empty list / 404)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: the legacy client retries on its own schedule

pub mod timeouts;
