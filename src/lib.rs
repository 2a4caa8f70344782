//! Legacy client interception proxy library.

pub mod config;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod translate;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use http::{ProxyError, ProxyServer};
pub use lifecycle::Shutdown;
