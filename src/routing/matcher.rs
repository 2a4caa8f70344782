//! Rule matching logic.
//!
//! # Responsibilities
//! - Match destination host (any of a set, case-insensitive)
//! - Match path prefix (case-sensitive) or exact path
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching ignores case, a trailing dot/slash and the port
//! - Exact path matching tolerates one optional trailing slash
//! - Matchers only read the descriptor; they never have side effects
//! - No regex to guarantee O(n) matching

use crate::http::request::{normalize_host, RequestDescriptor};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RequestDescriptor) -> bool;
}

/// Matches the destination host against a set of names.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    hosts: Vec<String>,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// Hosts are normalized so that comparison is case-insensitive.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| normalize_host(strip_port(h.as_ref())))
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// True when `host` (with or without a port) is one of the configured names.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = normalize_host(strip_port(host));
        self.hosts.iter().any(|h| *h == host)
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &RequestDescriptor) -> bool {
        self.matches_host(&req.host)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &RequestDescriptor) -> bool {
        req.path.starts_with(&self.prefix)
    }
}

/// Matches one exact path, with or without a trailing slash.
#[derive(Debug, Clone)]
pub struct PathExactMatcher {
    path: String,
}

impl PathExactMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: trim_slash(&path).to_string(),
        }
    }
}

fn trim_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some("") | None => path,
        Some(trimmed) => trimmed,
    }
}

impl Matcher for PathExactMatcher {
    fn matches(&self, req: &RequestDescriptor) -> bool {
        trim_slash(&req.path) == self.path
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &RequestDescriptor) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}
