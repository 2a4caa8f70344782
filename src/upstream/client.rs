//! Timeout-bounded HTTP client for substitute services.
//!
//! # Responsibilities
//! - Perform outbound GETs on behalf of handlers
//! - Bound every call with the configured timeout
//! - Classify failures (timeout, status, transport, decode)
//!
//! # Design Decisions
//! - Never used by the pass-through path, which relays raw bytes instead
//! - Ignores proxy environment variables so calls never loop back through us
//! - A timeout is an ordinary failure; handlers apply their own fallback

use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::UpstreamConfig;
use crate::observability::metrics;

/// Errors returned by upstream fetches.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {url} could not be decoded: {reason}")]
    Decode { url: String, reason: String },
    #[error("invalid upstream URL: {0}")]
    Url(String),
}

impl UpstreamError {
    /// Label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Timeout { .. } => "timeout",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Transport { .. } => "transport",
            UpstreamError::Decode { .. } => "decode",
            UpstreamError::Url(_) => "url",
        }
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Thin wrapper around `reqwest::Client` with a fixed per-call deadline.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    timeout_duration: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let timeout_duration = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .no_proxy()
            .user_agent(config.user_agent.clone())
            .connect_timeout(timeout_duration)
            .build()
            .map_err(|e| UpstreamError::Transport {
                url: String::new(),
                source: e,
            })?;

        Ok(Self {
            client,
            timeout_duration,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_duration
    }

    /// GET `url` and return the body of a 2xx response.
    pub async fn fetch(&self, url: &str) -> UpstreamResult<Bytes> {
        let result = match timeout(self.timeout_duration, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout {
                url: url.to_string(),
                secs: self.timeout_duration.as_secs(),
            }),
        };

        match &result {
            Ok(body) => {
                tracing::debug!(url = %url, bytes = body.len(), "Upstream fetch succeeded");
                metrics::record_upstream("ok");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Upstream fetch failed");
                metrics::record_upstream(e.kind());
            }
        }
        result
    }

    /// GET `url` and deserialize the JSON body.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> UpstreamResult<T> {
        let body = self.fetch(url).await?;
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_inner(&self, url: &str) -> UpstreamResult<Bytes> {
        let transport = |source| UpstreamError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(transport)
    }
}

/// Append `segment` to `base` as a single, percent-encoded path segment.
pub fn join_segment(base: &str, segment: &str) -> UpstreamResult<String> {
    let mut url = url::Url::parse(base).map_err(|e| UpstreamError::Url(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::Url(format!("{} cannot be a base", base)))?
        .pop_if_empty()
        .push(segment);
    Ok(url.to_string())
}
