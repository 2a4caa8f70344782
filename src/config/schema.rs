//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the legacy proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Ordered rule definitions. Empty means "use the built-in table".
    pub rules: Vec<RuleConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Substitute upstream services used by handlers.
    pub upstream: UpstreamConfig,

    /// HTTPS interception for selected CONNECT hosts.
    pub intercept: InterceptConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Override the port of the listener bind address, keeping the host part.
    pub fn set_listen_port(&mut self, port: u16) {
        let host = match self.listener.bind_address.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.listener.bind_address.clone(),
        };
        self.listener.bind_address = format!("{}:{}", host, port);
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8084").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8084".to_string(),
            max_connections: 1024,
        }
    }
}

/// Handler a rule dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Fixed "authentication succeeded" token.
    AuthStub,
    /// Legacy resource list built from the live asset index.
    AssetManifest,
    /// Player skin resolved through the profile service.
    Skin,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::AuthStub => "auth_stub",
            HandlerKind::AssetManifest => "asset_manifest",
            HandlerKind::Skin => "skin",
        }
    }
}

/// Rule configuration mapping a destination to a handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Rule identifier for logging/metrics.
    pub name: String,

    /// Destination hosts this rule applies to (case-insensitive).
    pub hosts: Vec<String>,

    /// Path prefix to match.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Exact path to match (a trailing slash is optional).
    #[serde(default)]
    pub path_exact: Option<String>,

    /// Handler invoked when the rule matches.
    pub handler: HandlerKind,
}

impl RuleConfig {
    fn prefix(name: &str, hosts: &[&str], prefix: &str, handler: HandlerKind) -> Self {
        Self {
            name: name.to_string(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            path_prefix: Some(prefix.to_string()),
            path_exact: None,
            handler,
        }
    }

    fn exact(name: &str, hosts: &[&str], path: &str, handler: HandlerKind) -> Self {
        Self {
            name: name.to_string(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            path_prefix: None,
            path_exact: Some(path.to_string()),
            handler,
        }
    }
}

/// The built-in rule table for the legacy client's dead endpoints.
///
/// Order matters: the first matching rule wins.
pub fn default_rules() -> Vec<RuleConfig> {
    const SITE: &[&str] = &["www.minecraft.net", "minecraft.net"];
    vec![
        RuleConfig::prefix("auth", SITE, "/game/", HandlerKind::AuthStub),
        RuleConfig::prefix("skin-www", SITE, "/skin/", HandlerKind::Skin),
        RuleConfig::prefix("skin-s3", &["s3.amazonaws.com"], "/MinecraftSkins/", HandlerKind::Skin),
        RuleConfig::prefix("skin-skins", &["skins.minecraft.net"], "/MinecraftSkins/", HandlerKind::Skin),
        RuleConfig::exact(
            "resources",
            &["www.minecraft.net", "s3.amazonaws.com"],
            "/resources/",
            HandlerKind::AssetManifest,
        ),
    ]
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a client to send a complete request head.
    pub header_secs: u64,

    /// Deadline for a handler to produce its response.
    pub handler_secs: u64,

    /// Idle timeout for relayed connections in seconds.
    pub idle_secs: u64,

    /// How long shutdown waits for active sessions to drain.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            header_secs: 10,
            handler_secs: 15,
            idle_secs: 120,
            shutdown_grace_secs: 10,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a request line plus headers.
    pub max_header_bytes: usize,

    /// Maximum body accepted (and discarded) on intercepted requests.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Substitute upstream services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Lifetime of the translated asset manifest; 0 disables caching.
    pub manifest_cache_secs: u64,

    /// Version manifest listing game releases and their package URLs.
    pub version_manifest_url: String,

    /// Username to profile id lookup, the username is appended as a path segment.
    pub profiles_url: String,

    /// Profile id to textures lookup, the id is appended as a path segment.
    pub sessions_url: String,

    /// User-Agent sent on upstream calls.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            manifest_cache_secs: 3600,
            version_manifest_url: "https://launchermeta.mojang.com/mc/game/version_manifest.json"
                .to_string(),
            profiles_url: "https://api.mojang.com/users/profiles/minecraft".to_string(),
            sessions_url: "https://sessionserver.mojang.com/session/minecraft/profile".to_string(),
            user_agent: concat!("legacy-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTPS interception using a pre-provisioned certificate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InterceptConfig {
    /// Path to certificate chain (PEM) presented to the client.
    pub cert_path: Option<String>,

    /// Path to private key (PEM).
    pub key_path: Option<String>,

    /// CONNECT hosts whose traffic is decrypted and re-evaluated.
    pub hosts: Vec<String>,
}

impl InterceptConfig {
    /// Whether interception is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some() && !self.hosts.is_empty()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
