//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (session loop, CONNECT, pass-through)
//!     → request.rs (parse head into a RequestDescriptor)
//!     → [routing layer picks a rule]
//!     → [handler produces a ResponseDescriptor]
//!     → response.rs (serialize)
//!     → Send to client
//!
//! CONNECT to an intercept host:
//!     → intercept.rs (TLS accept, hyper HTTP/1.1 over the decrypted stream)
//! ```

pub mod intercept;
pub mod request;
pub mod response;
pub mod server;

pub use request::RequestDescriptor;
pub use response::ResponseDescriptor;
pub use server::{ProxyError, ProxyServer};
