//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, address parses)
//! - Check each rule is well-formed and uniquely named
//! - Check upstream URLs and interception settings are coherent
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, RuleConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("rule '{0}' has no hosts")]
    RuleWithoutHosts(String),
    #[error("rule '{0}' must set exactly one of path_prefix or path_exact")]
    RulePathMatcher(String),
    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),
    #[error("upstream {field} is not an absolute http(s) URL: '{url}'")]
    UpstreamUrl { field: &'static str, url: String },
    #[error("intercept cert_path and key_path must be set together")]
    InterceptKeyPair,
    #[error("intercept hosts are listed but no certificate is configured")]
    InterceptHostsWithoutCert,
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let positive = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.header_secs", config.timeouts.header_secs),
        ("timeouts.handler_secs", config.timeouts.handler_secs),
        ("timeouts.idle_secs", config.timeouts.idle_secs),
        ("limits.max_header_bytes", config.limits.max_header_bytes as u64),
        ("upstream.timeout_secs", config.upstream.timeout_secs),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    let mut names = HashSet::new();
    for rule in &config.rules {
        validate_rule(rule, &mut errors);
        if !names.insert(rule.name.as_str()) {
            errors.push(ValidationError::DuplicateRule(rule.name.clone()));
        }
    }

    let urls = [
        ("version_manifest_url", &config.upstream.version_manifest_url),
        ("profiles_url", &config.upstream.profiles_url),
        ("sessions_url", &config.upstream.sessions_url),
    ];
    for (field, url) in urls {
        let ok = url::Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !ok {
            errors.push(ValidationError::UpstreamUrl { field, url: url.clone() });
        }
    }

    let intercept = &config.intercept;
    if intercept.cert_path.is_some() != intercept.key_path.is_some() {
        errors.push(ValidationError::InterceptKeyPair);
    }
    if !intercept.hosts.is_empty() && intercept.cert_path.is_none() {
        errors.push(ValidationError::InterceptHostsWithoutCert);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_rule(rule: &RuleConfig, errors: &mut Vec<ValidationError>) {
    if rule.hosts.iter().all(|h| h.trim().is_empty()) {
        errors.push(ValidationError::RuleWithoutHosts(rule.name.clone()));
    }
    if rule.path_prefix.is_some() == rule.path_exact.is_some() {
        errors.push(ValidationError::RulePathMatcher(rule.name.clone()));
    }
}
