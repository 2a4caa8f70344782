//! Requests answered by the proxy itself.

use std::time::Duration;

use legacy_proxy::config::{HandlerKind, RuleConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

mod common;

use common::{fake_png, parse_response, proxy_config, read_response, send_raw, spawn_proxy, start_upstream_services};

#[tokio::test]
async fn test_auth_check_succeeds_without_network() {
    // Upstream points nowhere; the auth stub never needs it.
    let services = common::closed_port().await;
    let proxy = spawn_proxy(proxy_config(services)).await;

    let response = parse_response(
        &send_raw(
            proxy.addr,
            b"GET /game/joinserver.jsp?user=Notch&sessionId=123&serverId=abc HTTP/1.1\r\n\
              Host: www.minecraft.net\r\nConnection: close\r\n\r\n",
        )
        .await,
    );

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"0");
    assert_eq!(response.header("connection"), Some("close"));
    assert!(response.header("x-request-id").is_some());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_auth_check_accepts_absolute_form_and_bare_host() {
    let proxy = spawn_proxy(proxy_config(common::closed_port().await)).await;

    let response = parse_response(
        &send_raw(
            proxy.addr,
            b"GET http://minecraft.net/game/checkserver.jsp?user=Notch HTTP/1.0\r\n\r\n",
        )
        .await,
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"0");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_keep_alive_serves_several_intercepted_requests() {
    let proxy = spawn_proxy(proxy_config(common::closed_port().await)).await;
    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();

    for _ in 0..3 {
        stream
            .write_all(b"GET /game/joinserver.jsp?user=a HTTP/1.1\r\nHost: www.minecraft.net\r\n\r\n")
            .await
            .unwrap();
        let response = read_response(&mut stream).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"0");
        assert_eq!(response.header("connection"), Some("keep-alive"));
    }

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_request_body_is_consumed_before_next_request() {
    let proxy = spawn_proxy(proxy_config(common::closed_port().await)).await;
    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();

    stream
        .write_all(
            b"POST /game/joinserver.jsp HTTP/1.1\r\nHost: www.minecraft.net\r\nContent-Length: 5\r\n\r\nhello\
              GET /game/joinserver.jsp HTTP/1.1\r\nHost: www.minecraft.net\r\n\r\n",
        )
        .await
        .unwrap();

    let first = read_response(&mut stream).await;
    let second = read_response(&mut stream).await;
    assert_eq!(first.status, 200);
    assert_eq!(second.status, 200);
    assert_eq!(second.body, b"0");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_head_request_omits_body() {
    let proxy = spawn_proxy(proxy_config(common::closed_port().await)).await;

    let raw = send_raw(
        proxy.addr,
        b"HEAD /game/joinserver.jsp HTTP/1.1\r\nHost: www.minecraft.net\r\nConnection: close\r\n\r\n",
    )
    .await;
    let response = parse_response(&raw);
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-length"), Some("1"));
    assert!(response.body.is_empty());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_resource_list_is_translated_to_legacy_format() {
    let services = start_upstream_services().await;
    let proxy = spawn_proxy(proxy_config(services)).await;

    for host in ["s3.amazonaws.com", "www.minecraft.net"] {
        let request = format!("GET /resources/ HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", host);
        let response = parse_response(&send_raw(proxy.addr, request.as_bytes()).await);

        assert_eq!(response.status, 200);
        let body = String::from_utf8(response.body).unwrap();
        assert_eq!(
            body,
            "sound/step/grass1.ogg,6221,0\nmusic/calm1.ogg,1480251,0\nnewsound/random/click.ogg,4386,0"
        );
    }

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_configured_rule_matches_exact_path_only() {
    let services = start_upstream_services().await;
    let origin = common::closed_port().await;

    let mut config = proxy_config(services);
    config.rules = vec![RuleConfig {
        name: "local-resources".into(),
        hosts: vec!["127.0.0.1".into()],
        path_prefix: None,
        path_exact: Some("/resources/".into()),
        handler: HandlerKind::AssetManifest,
    }];
    let proxy = spawn_proxy(config).await;

    let listed = parse_response(
        &send_raw(
            proxy.addr,
            format!("GET /resources HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", origin).as_bytes(),
        )
        .await,
    );
    assert_eq!(listed.status, 200);
    assert_eq!(String::from_utf8(listed.body).unwrap().lines().count(), 3);

    // A sub-path is not the list endpoint, so it is relayed to the (closed) origin.
    let relayed = parse_response(
        &send_raw(
            proxy.addr,
            format!("GET /resources/sound/x.ogg HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", origin)
                .as_bytes(),
        )
        .await,
    );
    assert_eq!(relayed.status, 502);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_skin_conventions_return_identical_bytes() {
    let services = start_upstream_services().await;
    let proxy = spawn_proxy(proxy_config(services)).await;
    let expected = fake_png(64, 32);

    for (host, path) in [
        ("www.minecraft.net", "/skin/Notch.png"),
        ("s3.amazonaws.com", "/MinecraftSkins/Notch.png"),
        ("skins.minecraft.net", "/MinecraftSkins/Notch.png"),
    ] {
        let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", path, host);
        let response = parse_response(&send_raw(proxy.addr, request.as_bytes()).await);

        assert_eq!(response.status, 200, "{}{}", host, path);
        assert_eq!(response.header("content-type"), Some("image/png"));
        assert_eq!(response.body, expected, "{}{}", host, path);
    }

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_player_gets_404() {
    let services = start_upstream_services().await;
    let proxy = spawn_proxy(proxy_config(services)).await;

    let response = parse_response(
        &send_raw(
            proxy.addr,
            b"GET /skin/NobodyHere.png HTTP/1.1\r\nHost: www.minecraft.net\r\nConnection: close\r\n\r\n",
        )
        .await,
    );
    assert_eq!(response.status, 404);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_host_matching_ignores_case_and_port() {
    let services = start_upstream_services().await;
    let proxy = spawn_proxy(proxy_config(services)).await;

    let response = parse_response(
        &send_raw(
            proxy.addr,
            b"GET /MinecraftSkins/Notch.png HTTP/1.1\r\nHost: S3.AmazonAWS.com:80\r\nConnection: close\r\n\r\n",
        )
        .await,
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body, fake_png(64, 32));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_drains_and_returns() {
    let proxy = spawn_proxy(proxy_config(common::closed_port().await)).await;

    proxy.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(TcpStream::connect(proxy.addr).await.is_err());
}
