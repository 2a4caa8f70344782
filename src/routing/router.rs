//! Rule table lookup.
//!
//! # Responsibilities
//! - Store compiled rules in configuration order
//! - Look up the first rule matching a request
//! - Return matched rule or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan; rule tables are a handful of entries
//! - No match is a normal outcome meaning "relay transparently"

use crate::config::{default_rules, HandlerKind, RuleConfig};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathExactMatcher, PathPrefixMatcher};
use crate::http::request::RequestDescriptor;

/// A compiled rule: matcher plus the handler it selects.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub handler: HandlerKind,
    matcher: AndMatcher,
}

impl Rule {
    pub fn new(name: impl Into<String>, handler: HandlerKind, matcher: AndMatcher) -> Self {
        Self {
            name: name.into(),
            handler,
            matcher,
        }
    }

    fn from_config(config: &RuleConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(HostMatcher::new(&config.hosts))];
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }
        if let Some(exact) = &config.path_exact {
            matchers.push(Box::new(PathExactMatcher::new(exact.clone())));
        }
        Self::new(config.name.clone(), config.handler, AndMatcher::new(matchers))
    }

    pub fn matches(&self, req: &RequestDescriptor) -> bool {
        self.matcher.matches(req)
    }
}

/// Ordered collection of rules; first match wins.
#[derive(Debug)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Compile configured rules, falling back to the built-in table when none are given.
    pub fn from_config(configs: &[RuleConfig]) -> Self {
        let rules = if configs.is_empty() {
            default_rules().iter().map(Rule::from_config).collect()
        } else {
            configs.iter().map(Rule::from_config).collect()
        };
        Self::new(rules)
    }

    /// Find the first rule matching the request.
    pub fn match_request(&self, req: &RequestDescriptor) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(req))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
