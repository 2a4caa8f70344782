//! Request head parsing.
//!
//! # Responsibilities
//! - Parse a raw HTTP/1.x request head into a `RequestDescriptor`
//! - Resolve the destination (absolute-form target, CONNECT authority or Host header)
//! - Keep the exact received bytes for verbatim pass-through
//!
//! # Design Decisions
//! - Parsing never allocates the body; intercepted bodies are read separately
//! - Header order and case are preserved, lookups are case-insensitive
//! - Descriptors are immutable once built

use std::str::FromStr;

use bytes::Bytes;
use hyper::http::uri::{Authority, Scheme};
use hyper::{Method, Uri};
use thiserror::Error;

/// Upper bound on the number of header lines in one request.
pub const MAX_HEADERS: usize = 100;

/// Errors produced while turning bytes into a `RequestDescriptor`.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("invalid method '{0}'")]
    Method(String),
    #[error("invalid request target '{0}'")]
    Target(String),
    #[error("request has no destination host")]
    MissingHost,
    #[error("invalid content-length")]
    ContentLength,
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self(entries)
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a comma-separated header contains `token` (case-insensitive).
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A parsed client request, valid for one proxy transaction.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Normalized destination host (lowercase, no trailing dot or slash).
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
    /// Minor HTTP version (0 or 1).
    pub version: u8,
    pub headers: Headers,
    pub body: Option<Bytes>,
    /// The request line and headers exactly as received.
    pub raw_head: Bytes,
}

impl RequestDescriptor {
    /// Parse a request head from the start of `buf`.
    ///
    /// Returns `Ok(None)` while the head is incomplete, otherwise the
    /// descriptor and the number of bytes the head occupied.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Ok(None),
        };

        let method_str = req.method.unwrap_or_default();
        let method = Method::from_str(method_str)
            .map_err(|_| RequestError::Method(method_str.to_string()))?;
        let target = req.path.unwrap_or_default();
        let version = req.version.unwrap_or(1);

        let headers = Headers::new(
            req.headers
                .iter()
                .map(|h| {
                    (
                        h.name.to_string(),
                        String::from_utf8_lossy(h.value).trim().to_string(),
                    )
                })
                .collect(),
        );

        let (host, port, path, query) = if method == Method::CONNECT {
            let (host, port) = parse_authority(target, 443)?;
            (host, port, String::new(), None)
        } else {
            resolve_target(target, &headers)?
        };

        let descriptor = Self {
            method,
            host,
            port,
            path,
            query,
            version,
            headers,
            body: None,
            raw_head: Bytes::copy_from_slice(&buf[..head_len]),
        };

        Ok(Some((descriptor, head_len)))
    }

    /// Build a descriptor for a request decoded inside an intercepted TLS tunnel.
    pub fn from_intercepted(parts: &hyper::http::request::Parts, host: &str, port: u16) -> Self {
        let headers = Headers::new(
            parts
                .headers
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        );
        let version = if parts.version == hyper::Version::HTTP_10 { 0 } else { 1 };

        Self {
            method: parts.method.clone(),
            host: normalize_host(host),
            port,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            version,
            headers,
            body: None,
            raw_head: Bytes::new(),
        }
    }

    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }

    /// Whether the client expects the connection to stay open after the response.
    pub fn keep_alive(&self) -> bool {
        if self.headers.has_token("connection", "close")
            || self.headers.has_token("proxy-connection", "close")
        {
            return false;
        }
        if self.version == 0 {
            return self.headers.has_token("connection", "keep-alive")
                || self.headers.has_token("proxy-connection", "keep-alive");
        }
        true
    }

    /// Declared body length, `None` when no `Content-Length` was sent.
    pub fn content_length(&self) -> Result<Option<usize>, RequestError> {
        match self.headers.get("content-length") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| RequestError::ContentLength),
            None => Ok(None),
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.has_token("transfer-encoding", "chunked")
    }

    /// `host:port` suitable for `TcpStream::connect`.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Lowercase a host and strip decorations the legacy client may add.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/').trim_end_matches('.');
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.to_ascii_lowercase()
}

fn parse_authority(value: &str, default_port: u16) -> Result<(String, u16), RequestError> {
    let authority = Authority::from_str(value.trim().trim_end_matches('/'))
        .map_err(|_| RequestError::Target(value.to_string()))?;
    let host = normalize_host(authority.host());
    if host.is_empty() {
        return Err(RequestError::MissingHost);
    }
    Ok((host, authority.port_u16().unwrap_or(default_port)))
}

fn split_path_query(path_and_query: &str) -> (String, Option<String>) {
    match path_and_query.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (path_and_query.to_string(), None),
    }
}

type Target = (String, u16, String, Option<String>);

fn resolve_target(target: &str, headers: &Headers) -> Result<Target, RequestError> {
    if target.starts_with('/') || target == "*" {
        let host_header = headers.get("host").ok_or(RequestError::MissingHost)?;
        let (host, port) = parse_authority(host_header, 80)?;
        let (path, query) = split_path_query(target);
        return Ok((host, port, path, query));
    }

    let uri = Uri::from_str(target).map_err(|_| RequestError::Target(target.to_string()))?;
    let host = uri
        .host()
        .map(normalize_host)
        .filter(|h| !h.is_empty())
        .ok_or(RequestError::MissingHost)?;
    let default_port = if uri.scheme() == Some(&Scheme::HTTPS) { 443 } else { 80 };
    let port = uri.port_u16().unwrap_or(default_port);
    let path = match uri.path() {
        "" => "/".to_string(),
        p => p.to_string(),
    };
    Ok((host, port, path, uri.query().map(str::to_string)))
}
