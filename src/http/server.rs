//! Interception proxy core.
//!
//! # Responsibilities
//! - Accept client connections and spawn one task per session
//! - Read request heads and consult the rule table
//! - Answer matched requests from handlers (keep-alive aware)
//! - Forward unmatched requests verbatim, one request boundary at a time
//! - Relay CONNECT tunnels byte-for-byte
//! - Drain sessions on shutdown
//!
//! # Session Flow
//! ```text
//! read head ──▶ CONNECT ──▶ intercept host? ──▶ TLS accept ──▶ intercept.rs
//!     │                          └──────────▶ origin connect ──▶ 200 ──▶ relay
//!     ├──▶ rule match ──▶ handler (deadline) ──▶ response ──▶ next request
//!     └──▶ no match   ──▶ origin connect ──▶ raw head + body ──▶ next head
//!                              (same origin, no rule: reuse; otherwise back to the top)
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use hyper::{Method, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{LimitsConfig, ProxyConfig, TimeoutConfig};
use crate::handlers::Handlers;
use crate::http::intercept::{self, Interceptor};
use crate::http::request::{RequestDescriptor, RequestError};
use crate::http::response::{ResponseDescriptor, CONNECTION_ESTABLISHED};
use crate::net::connection::{ConnectionGuard, ConnectionTracker, SessionState};
use crate::net::listener::{Listener, ListenerError};
use crate::net::relay::{pipe, relay, IdleClock, RelayStats};
use crate::observability::metrics;
use crate::resilience::timeouts::{connect_with_timeout, with_deadline, ConnectError};
use crate::routing::{Rule, RuleTable};
use crate::upstream::UpstreamError;

/// Session- and startup-level failures.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("intercepted session failed: {0}")]
    Http(#[from] hyper::Error),
    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("failed to load interception certificate: {0}")]
    Tls(std::io::Error),
}

/// Why a request head could not be read.
#[derive(Debug, Error)]
enum HeadError {
    #[error(transparent)]
    Parse(#[from] RequestError),
    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),
    #[error("request head not received in time")]
    Timeout,
    #[error("client closed mid-request")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read-only state shared by every session.
#[derive(Debug)]
pub struct ProxyState {
    pub(crate) rules: RuleTable,
    pub(crate) handlers: Handlers,
    pub(crate) timeouts: TimeoutConfig,
    pub(crate) limits: LimitsConfig,
    pub(crate) interceptor: Option<Interceptor>,
}

impl ProxyState {
    /// Run the handler for a matched rule under the handler deadline.
    pub(crate) async fn respond(&self, rule: &Rule, req: &RequestDescriptor, kind: &'static str) -> ResponseDescriptor {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        let deadline = Duration::from_secs(self.timeouts.handler_secs);

        let response = match with_deadline("handler", deadline, self.handlers.dispatch(rule.handler, req)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(rule = %rule.name, error = %e, "Handler deadline exceeded");
                ResponseDescriptor::status(StatusCode::GATEWAY_TIMEOUT)
            }
        };

        metrics::record_handler_duration(&rule.name, rule.handler.as_str(), start);
        metrics::record_request(kind, &rule.name, response.status.as_u16());
        tracing::info!(
            request_id = %request_id,
            rule = %rule.name,
            handler = rule.handler.as_str(),
            method = %req.method,
            host = %req.host,
            path = %req.path,
            status = response.status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request intercepted"
        );

        response.with_header("X-Request-ID", request_id.to_string())
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.connect_secs)
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.idle_secs)
    }
}

/// The interception proxy.
pub struct ProxyServer {
    state: Arc<ProxyState>,
    shutdown_grace: Duration,
}

impl ProxyServer {
    /// Build the proxy from a validated configuration.
    pub async fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let rules = RuleTable::from_config(&config.rules);
        let handlers = Handlers::new(&config.upstream)?;

        let interceptor = match (&config.intercept.cert_path, &config.intercept.key_path) {
            (Some(cert), Some(key)) if config.intercept.is_enabled() => Some(
                Interceptor::load(Path::new(cert), Path::new(key), &config.intercept.hosts)
                    .await
                    .map_err(ProxyError::Tls)?,
            ),
            _ => None,
        };

        tracing::info!(
            rules = rules.len(),
            intercept_hosts = config.intercept.hosts.len(),
            upstream_timeout_secs = config.upstream.timeout_secs,
            "Proxy configured"
        );

        Ok(Self {
            state: Arc::new(ProxyState {
                rules,
                handlers,
                timeouts: config.timeouts.clone(),
                limits: config.limits.clone(),
                interceptor,
            }),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        })
    }

    /// Accept connections until the shutdown signal fires, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ProxyError> {
        let tracker = ConnectionTracker::new();

        tracing::info!(
            address = %listener.local_addr()?,
            max_connections = listener.max_connections(),
            "Proxy accepting connections"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, slot)) => {
                        let state = Arc::clone(&self.state);
                        let guard = tracker.track();
                        let span = tracing::info_span!(
                            "session",
                            connection_id = %guard.id(),
                            peer_addr = %peer_addr
                        );
                        tokio::spawn(
                            async move {
                                let _slot = slot;
                                if let Err(e) = serve_session(state, stream, peer_addr, guard).await {
                                    tracing::debug!(error = %e, "Session ended with error");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        drop(listener);
        if tracker.wait_for_drain(self.shutdown_grace).await {
            tracing::info!("All sessions drained");
        } else {
            tracing::warn!(active = tracker.active_count(), "Drain timeout reached, abandoning sessions");
        }
        Ok(())
    }
}

/// Serve one client connection from first byte to close.
async fn serve_session(
    state: Arc<ProxyState>,
    mut client: TcpStream,
    peer_addr: SocketAddr,
    mut guard: ConnectionGuard,
) -> Result<(), ProxyError> {
    let _ = client.set_nodelay(true);
    let mut buf = BytesMut::with_capacity(4096);
    let mut pending: Option<RequestDescriptor> = None;

    loop {
        guard.transition(SessionState::Reading);

        let head = match pending.take() {
            Some(req) => Ok(Some(req)),
            None => read_head(&mut client, &mut buf, &state).await,
        };
        let mut req = match head {
            Ok(Some(req)) => req,
            Ok(None) => return Ok(()),
            Err(HeadError::Timeout) => {
                tracing::debug!("Client idle, closing");
                return Ok(());
            }
            Err(HeadError::Io(e)) => return Err(e.into()),
            Err(e) => {
                let status = head_error_status(&e);
                tracing::info!(peer_addr = %peer_addr, error = %e, "Rejecting request");
                metrics::record_request("rejected", "none", status.as_u16());
                reject(&mut client, status).await;
                return Ok(());
            }
        };

        if req.is_connect() {
            return tunnel(state, client, req, buf, guard).await;
        }

        let Some(rule) = state.rules.match_request(&req) else {
            match passthrough(&state, client, req, buf, &mut guard).await? {
                Passthrough::Closed => return Ok(()),
                Passthrough::Handoff { client: reused, next, buffered } => {
                    client = reused;
                    buf = buffered;
                    pending = Some(next);
                    continue;
                }
            }
        };

        guard.transition(SessionState::Intercepted);

        let chunked = req.is_chunked();
        let declared = match req.content_length() {
            Ok(len) => len.unwrap_or(0),
            Err(e) => {
                tracing::info!(error = %e, "Rejecting request");
                reject(&mut client, StatusCode::BAD_REQUEST).await;
                return Ok(());
            }
        };
        if declared > state.limits.max_body_bytes {
            reject(&mut client, StatusCode::PAYLOAD_TOO_LARGE).await;
            return Ok(());
        }
        if declared > 0 {
            req.body = Some(read_body(&mut client, &mut buf, declared, &state).await?);
        }

        // A chunked body is never read, so the connection cannot be reused.
        let keep_alive = req.keep_alive() && !chunked;
        let response = state.respond(rule, &req, "intercepted").await;

        let mut bytes = response.to_bytes(keep_alive);
        if req.method == Method::HEAD {
            bytes.truncate(bytes.len() - response.body.len());
        }
        client.write_all(&bytes).await?;
        client.flush().await?;

        if !keep_alive {
            let _ = client.shutdown().await;
            return Ok(());
        }
    }
}

/// Read until a full request head is buffered, or the client goes away.
async fn read_head(
    client: &mut TcpStream,
    buf: &mut BytesMut,
    state: &ProxyState,
) -> Result<Option<RequestDescriptor>, HeadError> {
    let deadline = Duration::from_secs(state.timeouts.header_secs);
    with_deadline("request head", deadline, fill_head(client, buf, state.limits.max_header_bytes))
        .await
        .map_err(|_| HeadError::Timeout)?
}

async fn fill_head<R>(client: &mut R, buf: &mut BytesMut, limit: usize) -> Result<Option<RequestDescriptor>, HeadError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            if let Some((req, head_len)) = RequestDescriptor::parse(&buf[..])? {
                buf.advance(head_len);
                return Ok(Some(req));
            }
        }
        if buf.len() >= limit {
            return Err(HeadError::TooLarge(limit));
        }
        if client.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(HeadError::Truncated)
            };
        }
    }
}

fn head_error_status(error: &HeadError) -> StatusCode {
    match error {
        HeadError::TooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Read exactly `len` body bytes, starting with whatever is already buffered.
async fn read_body(
    client: &mut TcpStream,
    buf: &mut BytesMut,
    len: usize,
    state: &ProxyState,
) -> Result<Bytes, ProxyError> {
    let deadline = Duration::from_secs(state.timeouts.header_secs);
    let fill = async {
        while buf.len() < len {
            if client.read_buf(buf).await? == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
            }
        }
        Ok::<(), std::io::Error>(())
    };
    with_deadline("request body", deadline, fill)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::TimedOut, e))??;
    Ok(buf.split_to(len).freeze())
}

/// How a pass-through exchange left the client connection.
enum Passthrough {
    Closed,
    /// The client sent a request this origin connection must not carry.
    Handoff {
        client: TcpStream,
        next: RequestDescriptor,
        buffered: BytesMut,
    },
}

/// Where the request loop of one origin connection stopped.
enum OriginExit {
    Finished(std::io::Result<()>),
    Handoff(RequestDescriptor),
    Rejected(StatusCode),
    Failed(HeadError),
}

/// Body length of a request whose end can be found without decoding it.
///
/// Chunked uploads, protocol upgrades and bad lengths return `None`.
fn framed_body_len(req: &RequestDescriptor) -> Option<usize> {
    if req.is_chunked() || req.headers.has_token("connection", "upgrade") {
        return None;
    }
    req.content_length().ok().map(|len| len.unwrap_or(0))
}

/// Forward unmatched requests verbatim to their origin.
///
/// Every following request head on the connection is checked again: one for
/// the same origin that no rule claims goes out on the same origin
/// connection, anything else is handed back to the session loop.
async fn passthrough(
    state: &ProxyState,
    mut client: TcpStream,
    req: RequestDescriptor,
    mut buf: BytesMut,
    guard: &mut ConnectionGuard,
) -> Result<Passthrough, ProxyError> {
    let authority = req.authority();
    let mut origin = match connect_with_timeout(&authority, state.connect_timeout()).await {
        Ok(origin) => origin,
        Err(e) => {
            tracing::warn!(origin = %authority, error = %e, "Origin unreachable");
            let status = gateway_status(&e);
            metrics::record_request("passthrough", "none", status.as_u16());
            reject(&mut client, status).await;
            return Err(e.into());
        }
    };

    guard.transition(SessionState::Tunneling);
    tracing::debug!(origin = %authority, method = %req.method, path = %req.path, "Passing through");
    metrics::record_relay("passthrough");

    let Some(body_len) = framed_body_len(&req) else {
        // The next request boundary cannot be found; the rest of the session is opaque.
        origin.write_all(&req.raw_head).await?;
        if !buf.is_empty() {
            origin.write_all(&buf).await?;
        }
        let stats = relay(client, origin, state.idle_timeout()).await?;
        metrics::record_relayed_bytes(stats);
        tracing::debug!(
            origin = %authority,
            sent = stats.client_to_origin,
            received = stats.origin_to_client,
            "Pass-through closed"
        );
        return Ok(Passthrough::Closed);
    };

    let clock = IdleClock::new(state.idle_timeout());
    let mut stats = RelayStats::default();

    let exit = {
        let (mut client_read, mut client_write) = client.split();
        let (mut origin_read, mut origin_write) = origin.split();
        let downstream = pipe(&mut origin_read, &mut client_write, &clock, &mut stats.origin_to_client);
        tokio::pin!(downstream);

        let mut current = req;
        let mut body_len = body_len;
        let mut sent = 0u64;

        let exit = loop {
            let exchange = async {
                sent += forward_request(&mut client_read, &mut origin_write, &mut buf, &current.raw_head, body_len, &clock)
                    .await?;
                fill_head(&mut client_read, &mut buf, state.limits.max_header_bytes).await
            };

            let next = tokio::select! {
                next = exchange => next,
                finished = &mut downstream => break OriginExit::Finished(finished),
            };

            match next {
                Ok(Some(next)) => {
                    let stays = !next.is_connect()
                        && next.authority() == authority
                        && state.rules.match_request(&next).is_none();
                    match framed_body_len(&next) {
                        Some(len) if stays => {
                            current = next;
                            body_len = len;
                        }
                        _ => break OriginExit::Handoff(next),
                    }
                }
                Ok(None) => {
                    // Client is done sending; let the origin finish answering.
                    let _ = origin_write.shutdown().await;
                    break OriginExit::Finished((&mut downstream).await);
                }
                Err(e @ (HeadError::Parse(_) | HeadError::TooLarge(_))) => {
                    tracing::info!(error = %e, "Rejecting request");
                    break OriginExit::Rejected(head_error_status(&e));
                }
                Err(e) => break OriginExit::Failed(e),
            }
        };
        stats.client_to_origin = sent;
        exit
    };

    metrics::record_relayed_bytes(stats);
    tracing::debug!(
        origin = %authority,
        sent = stats.client_to_origin,
        received = stats.origin_to_client,
        "Pass-through closed"
    );

    match exit {
        OriginExit::Handoff(next) => Ok(Passthrough::Handoff {
            client,
            next,
            buffered: buf,
        }),
        OriginExit::Finished(result) => {
            let _ = client.shutdown().await;
            result?;
            Ok(Passthrough::Closed)
        }
        OriginExit::Rejected(status) => {
            metrics::record_request("rejected", "none", status.as_u16());
            reject(&mut client, status).await;
            Ok(Passthrough::Closed)
        }
        OriginExit::Failed(HeadError::Io(e)) => Err(e.into()),
        OriginExit::Failed(e) => {
            tracing::debug!(origin = %authority, error = %e, "Pass-through ended mid-request");
            Ok(Passthrough::Closed)
        }
    }
}

/// Write one request head and its `body_len` body bytes to the origin.
async fn forward_request<R, W>(
    client: &mut R,
    origin: &mut W,
    buf: &mut BytesMut,
    head: &[u8],
    body_len: usize,
    clock: &IdleClock,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    origin.write_all(head).await?;
    clock.touch();

    let mut remaining = body_len;
    while remaining > 0 {
        if buf.is_empty() && client.read_buf(buf).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        let take = remaining.min(buf.len());
        origin.write_all(&buf[..take]).await?;
        buf.advance(take);
        remaining -= take;
        clock.touch();
    }
    Ok((head.len() + body_len) as u64)
}

/// Handle CONNECT: intercept configured hosts, relay everything else.
async fn tunnel(
    state: Arc<ProxyState>,
    mut client: TcpStream,
    req: RequestDescriptor,
    buffered: BytesMut,
    mut guard: ConnectionGuard,
) -> Result<(), ProxyError> {
    if state.interceptor.as_ref().is_some_and(|i| i.covers(&req.host)) {
        if !buffered.is_empty() {
            // The tunnel is not acknowledged yet, so these bytes cannot be a TLS hello.
            tracing::info!(host = %req.host, "Client sent data before tunnel was established");
            metrics::record_request("rejected", "none", StatusCode::BAD_REQUEST.as_u16());
            reject(&mut client, StatusCode::BAD_REQUEST).await;
            return Ok(());
        }
        client.write_all(CONNECTION_ESTABLISHED).await?;
        guard.transition(SessionState::Intercepted);
        return intercept::serve(state, client, req.host, req.port).await;
    }

    let authority = req.authority();
    let mut origin = match connect_with_timeout(&authority, state.connect_timeout()).await {
        Ok(origin) => origin,
        Err(e) => {
            tracing::warn!(origin = %authority, error = %e, "Tunnel target unreachable");
            let status = gateway_status(&e);
            metrics::record_request("tunnel", "none", status.as_u16());
            reject(&mut client, status).await;
            return Err(e.into());
        }
    };

    client.write_all(CONNECTION_ESTABLISHED).await?;
    if !buffered.is_empty() {
        origin.write_all(&buffered).await?;
    }

    guard.transition(SessionState::Tunneling);
    tracing::debug!(origin = %authority, "Tunnel established");
    metrics::record_relay("tunnel");

    let stats = relay(client, origin, state.idle_timeout()).await?;
    metrics::record_relayed_bytes(stats);
    tracing::debug!(
        origin = %authority,
        sent = stats.client_to_origin,
        received = stats.origin_to_client,
        "Tunnel closed"
    );
    Ok(())
}

fn gateway_status(error: &ConnectError) -> StatusCode {
    match error {
        ConnectError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ConnectError::Io { .. } => StatusCode::BAD_GATEWAY,
    }
}

/// Best-effort error response followed by close.
async fn reject(client: &mut TcpStream, status: StatusCode) {
    let bytes = ResponseDescriptor::status(status).to_bytes(false);
    let _ = client.write_all(&bytes).await;
    let _ = client.shutdown().await;
}
