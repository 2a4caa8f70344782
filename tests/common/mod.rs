//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use legacy_proxy::config::ProxyConfig;
use legacy_proxy::net::listener::Listener;
use legacy_proxy::{ProxyServer, Shutdown};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const KNOWN_PLAYER: &str = "Notch";
pub const KNOWN_PLAYER_ID: &str = "069a79f444e94726a5befca90e38aaf5";

/// Minimal PNG: signature plus an IHDR chunk with the given dimensions.
pub fn fake_png(width: u32, height: u32) -> Vec<u8> {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&width.to_be_bytes());
    png.extend_from_slice(&height.to_be_bytes());
    png.extend_from_slice(&[8, 6, 0, 0, 0]);
    png.extend_from_slice(&[0, 0, 0, 0]);
    png
}

/// Start a mock of the substitute services (version manifest, profiles,
/// sessions, textures). `/slow/...` never answers within a test's patience.
pub async fn start_upstream_services() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let manifest_base = base.clone();
    let package_base = base.clone();
    let session_base = base.clone();

    let app = Router::new()
        .route(
            "/mc/game/version_manifest.json",
            get(move || {
                let base = manifest_base.clone();
                async move {
                    Json(json!({
                        "latest": { "release": "1.20.1" },
                        "versions": [
                            { "id": "1.20.1", "type": "release", "url": format!("{}/packages/1.20.1.json", base) },
                            { "id": "a1.0.4", "type": "old_alpha", "url": format!("{}/packages/a1.0.4.json", base) },
                            { "id": "a1.0.1", "type": "old_alpha", "url": format!("{}/packages/a1.0.1.json", base) }
                        ]
                    }))
                }
            }),
        )
        .route(
            "/packages/a1.0.4.json",
            get(move || {
                let base = package_base.clone();
                async move {
                    Json(json!({
                        "id": "a1.0.4",
                        "assetIndex": { "id": "pre-1.6", "url": format!("{}/indexes/pre-1.6.json", base) }
                    }))
                }
            }),
        )
        .route(
            "/indexes/pre-1.6.json",
            get(|| async {
                Json(json!({
                    "virtual": true,
                    "objects": {
                        "sound/step/grass1.ogg": { "hash": "aaa111", "size": 6221 },
                        "music/calm1.ogg": { "hash": "bbb222", "size": 1480251 },
                        "newsound/random/click.ogg": { "hash": "ccc333", "size": 4386 }
                    }
                }))
            }),
        )
        .route(
            "/profiles/{name}",
            get(|Path(name): Path<String>| async move {
                if name == KNOWN_PLAYER {
                    Ok(Json(json!({ "id": KNOWN_PLAYER_ID, "name": KNOWN_PLAYER })))
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }),
        )
        .route(
            "/sessions/{id}",
            get(move |Path(id): Path<String>| {
                let base = session_base.clone();
                async move {
                    if id != KNOWN_PLAYER_ID {
                        return Err(StatusCode::NOT_FOUND);
                    }
                    let textures = json!({
                        "profileName": KNOWN_PLAYER,
                        "textures": { "SKIN": { "url": format!("{}/textures/notch.png", base) } }
                    });
                    let value = base64::engine::general_purpose::STANDARD.encode(textures.to_string());
                    Ok(Json(json!({
                        "id": id,
                        "name": KNOWN_PLAYER,
                        "properties": [{ "name": "textures", "value": value }]
                    })))
                }
            }),
        )
        .route("/textures/notch.png", get(|| async { fake_png(64, 32) }))
        .route(
            "/slow/{*rest}",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK
            }),
        );

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Proxy configuration wired to the mock services.
pub fn proxy_config(services: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.version_manifest_url = format!("http://{}/mc/game/version_manifest.json", services);
    config.upstream.profiles_url = format!("http://{}/profiles", services);
    config.upstream.sessions_url = format!("http://{}/sessions", services);
    config.upstream.timeout_secs = 2;
    config.timeouts.connect_secs = 2;
    config.timeouts.shutdown_grace_secs = 2;
    config
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), legacy_proxy::ProxyError>>,
}

/// Start the proxy on an ephemeral port.
pub async fn spawn_proxy(mut config: ProxyConfig) -> RunningProxy {
    config.listener.bind_address = "127.0.0.1:0".into();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(config).await.unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, rx).await });
    RunningProxy { addr, shutdown, handle }
}

/// Send raw bytes and read until the proxy closes the connection.
pub async fn send_raw(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    response
}

/// A parsed HTTP/1.1 response.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

pub fn parse_response(bytes: &[u8]) -> RawResponse {
    let split = bytes
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head not terminated");
    let head = String::from_utf8_lossy(&bytes[..split]).into_owned();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    RawResponse {
        status,
        head,
        body: bytes[split + 4..].to_vec(),
    }
}

/// Read exactly one Content-Length delimited response from a kept-alive stream.
pub async fn read_response<S>(stream: &mut S) -> RawResponse
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(split) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let parsed = parse_response(&buf[..split + 4]);
            let len: usize = parsed.header("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
            while buf.len() < split + 4 + len {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed mid-body");
                buf.extend_from_slice(&chunk[..n]);
            }
            return parse_response(&buf[..split + 4 + len]);
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before response head");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Raw TCP origin that reports every received byte and answers with `response`
/// once a full request head has arrived.
pub async fn start_recording_origin(response: &'static [u8]) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut chunk = [0u8; 4096];
                while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => received.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = tx.send(received);
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, rx)
}

/// Raw TCP origin that keeps connections open and answers every request head
/// with `body`. Each received head is reported with the number of the origin
/// connection it arrived on.
pub async fn start_keep_alive_origin(body: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<(usize, Vec<u8>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let connections = std::sync::Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let connection = connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    while let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head: Vec<u8> = received.drain(..end + 4).collect();
                        let _ = tx.send((connection, head));
                        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => received.extend_from_slice(&chunk[..n]),
                    }
                }
            });
        }
    });
    (addr, rx)
}

/// Raw TCP origin that echoes everything back.
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
