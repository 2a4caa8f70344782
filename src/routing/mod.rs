//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed RequestDescriptor (host, port, path)
//!     → router.rs (rule lookup, table order)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Rule (handler) or None (transparent relay)
//!
//! Rule Compilation (at startup):
//!     RuleConfig[] (or the built-in table)
//!     → Compile matchers (host set AND path prefix/exact)
//!     → Freeze as immutable RuleTable
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same rule
//! - First match wins (configuration order)

pub mod matcher;
pub mod router;

pub use router::{Rule, RuleTable};
