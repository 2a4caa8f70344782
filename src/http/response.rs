//! Synthetic response construction and serialization.
//!
//! # Responsibilities
//! - Represent handler output as a `ResponseDescriptor`
//! - Serialize it as an HTTP/1.1 response with an explicit length
//! - Convert it into a hyper response for intercepted TLS sessions
//!
//! # Design Decisions
//! - Bodies are fully buffered; every synthetic body is small
//! - Pass-through responses never go through this module

use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::Full;
use hyper::StatusCode;

/// A response produced by the proxy itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResponseDescriptor {
    pub fn new(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: body.into(),
        }
    }

    pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, content_type, body)
    }

    /// Plain-text response whose body is the status reason phrase.
    pub fn status(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error");
        Self::new(status, "text/plain", Bytes::from(format!("{}\n", reason)))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Encode as HTTP/1.1 bytes, announcing `keep_alive` in a `Connection` header.
    pub fn to_bytes(&self, keep_alive: bool) -> Bytes {
        let mut out = BytesMut::with_capacity(128 + self.body.len());
        let reason = self.status.canonical_reason().unwrap_or("");
        out.put_slice(format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), reason).as_bytes());
        for (name, value) in &self.headers {
            out.put_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.put_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        let connection = if keep_alive { "keep-alive" } else { "close" };
        out.put_slice(format!("Connection: {}\r\n\r\n", connection).as_bytes());
        out.put_slice(&self.body);
        out.freeze()
    }

    /// Convert into a hyper response for the decrypted-tunnel path.
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                hyper::header::HeaderName::from_bytes(name.as_bytes()),
                hyper::header::HeaderValue::from_str(&value),
            ) {
                response.headers_mut().append(name, value);
            }
        }
        response
    }
}

/// Reply sent once a CONNECT tunnel to the origin is ready.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
