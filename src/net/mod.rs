//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, state machine)
//!     → Hand off to the proxy core (http::server)
//!     → relay.rs (byte relay for pass-through and tunnels)
//!     → tls.rs (interception certificate, origin re-encryption)
//!
//! Session States:
//!     Reading → Intercepted | Tunneling → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Relays never look at the bytes they carry

pub mod connection;
pub mod listener;
pub mod relay;
pub mod tls;
