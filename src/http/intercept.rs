//! Decrypted HTTPS sessions for configured hosts.
//!
//! After a CONNECT to an intercept host has been acknowledged, the client's
//! TLS handshake is terminated here with the pre-provisioned certificate and
//! the decrypted stream is served as HTTP/1.1. Matched requests go to the
//! handlers; everything else is re-encrypted and forwarded to the origin.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::http::request::RequestDescriptor;
use crate::http::response::ResponseDescriptor;
use crate::http::server::{ProxyError, ProxyState};
use crate::net::tls;
use crate::observability::metrics;
use crate::resilience::timeouts::{connect_with_timeout, with_deadline, ConnectError};
use crate::routing::matcher::HostMatcher;

type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// TLS material and host set for interception.
pub struct Interceptor {
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    hosts: HostMatcher,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor").field("hosts", &self.hosts).finish_non_exhaustive()
    }
}

impl Interceptor {
    pub async fn load(cert_path: &Path, key_path: &Path, hosts: &[String]) -> std::io::Result<Self> {
        Ok(Self {
            acceptor: tls::load_intercept_acceptor(cert_path, key_path).await?,
            connector: tls::origin_connector(),
            hosts: HostMatcher::new(hosts),
        })
    }

    /// Whether CONNECT requests to `host` are decrypted.
    pub fn covers(&self, host: &str) -> bool {
        self.hosts.matches_host(host)
    }
}

#[derive(Debug, Error)]
enum ForwardError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("origin TLS handshake failed: {0}")]
    Tls(#[from] std::io::Error),
    #[error("origin exchange failed: {0}")]
    Http(#[from] hyper::Error),
}

/// Terminate TLS on an acknowledged tunnel and serve the decrypted requests.
pub(crate) async fn serve(state: Arc<ProxyState>, client: TcpStream, host: String, port: u16) -> Result<(), ProxyError> {
    let Some(interceptor) = state.interceptor.as_ref() else {
        return Ok(());
    };

    let handshake = with_deadline("client TLS handshake", state.connect_timeout(), interceptor.acceptor.accept(client));
    let tls = match handshake.await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            tracing::debug!(host = %host, error = %e, "Client rejected interception handshake");
            return Ok(());
        }
        Err(e) => {
            tracing::debug!(host = %host, error = %e, "Client TLS handshake stalled");
            return Ok(());
        }
    };
    tracing::debug!(host = %host, "Tunnel decrypted");

    let host: Arc<str> = host.into();
    let service_state = Arc::clone(&state);
    let service = service_fn(move |req| handle(Arc::clone(&service_state), Arc::clone(&host), port, req));

    hyper::server::conn::http1::Builder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(tls), service)
        .await?;
    Ok(())
}

async fn handle(
    state: Arc<ProxyState>,
    host: Arc<str>,
    port: u16,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let mut descriptor = RequestDescriptor::from_intercepted(&parts, &host, port);

    if let Some(rule) = state.rules.match_request(&descriptor) {
        match Limited::new(body, state.limits.max_body_bytes).collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if !bytes.is_empty() {
                    descriptor.body = Some(bytes);
                }
            }
            Err(e) => {
                tracing::info!(rule = %rule.name, error = %e, "Rejecting request body");
                return Ok(full(ResponseDescriptor::status(StatusCode::PAYLOAD_TOO_LARGE)));
            }
        }
        let response = state.respond(rule, &descriptor, "intercepted").await;
        return Ok(full(response));
    }

    let authority = descriptor.authority();
    let req = Request::from_parts(parts, body);
    match forward(&state, &host, &authority, req).await {
        Ok(response) => {
            metrics::record_request("passthrough", "none", response.status().as_u16());
            tracing::debug!(
                origin = %authority,
                path = %descriptor.path,
                status = response.status().as_u16(),
                "Forwarded decrypted request"
            );
            Ok(response.map(BodyExt::boxed))
        }
        Err(e) => {
            tracing::warn!(origin = %authority, error = %e, "Decrypted forward failed");
            let status = match e {
                ForwardError::Connect(ConnectError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            metrics::record_request("passthrough", "none", status.as_u16());
            Ok(full(ResponseDescriptor::status(status)))
        }
    }
}

/// Re-encrypt one request towards the real origin.
async fn forward(
    state: &ProxyState,
    host: &str,
    authority: &str,
    req: Request<Incoming>,
) -> Result<Response<Incoming>, ForwardError> {
    let Some(interceptor) = state.interceptor.as_ref() else {
        return Err(ForwardError::Tls(std::io::Error::other("interception disabled")));
    };

    let tcp = connect_with_timeout(authority, state.connect_timeout()).await?;
    let server_name = tls::server_name(host)?;
    let tls = with_deadline(
        "origin TLS handshake",
        state.connect_timeout(),
        interceptor.connector.connect(server_name, tcp),
    )
    .await
    .map_err(ConnectError::from)??;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "Origin connection closed with error");
        }
    });

    Ok(sender.send_request(req).await?)
}

fn full(response: ResponseDescriptor) -> Response<ProxyBody> {
    response
        .into_hyper()
        .map(|body: Full<Bytes>| body.map_err(|never| match never {}).boxed())
}
