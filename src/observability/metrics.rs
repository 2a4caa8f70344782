//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by kind (intercepted/passthrough/tunnel/rejected), rule, status
//! - `proxy_active_connections` (gauge): current client sessions
//! - `proxy_upstream_requests_total` (counter): substitute-service calls by outcome
//! - `proxy_handler_duration_seconds` (histogram): handler latency per rule and handler kind
//! - `proxy_relays_total` (counter): origin connections opened for pass-through and tunnels
//! - `proxy_relayed_bytes_total` (counter): bytes relayed per direction
//!
//! # Design Decisions
//! - Recording is always cheap; without an installed recorder it is a no-op
//! - Prometheus exporter only runs when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::net::relay::RelayStats;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed proxy transaction.
pub fn record_request(kind: &'static str, rule: &str, status: u16) {
    ::metrics::counter!(
        "proxy_requests_total",
        "kind" => kind,
        "rule" => rule.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a substitute-service call outcome ("ok", "timeout", "status", ...).
pub fn record_upstream(outcome: &'static str) {
    ::metrics::counter!("proxy_upstream_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_handler_duration(rule: &str, handler: &'static str, start: Instant) {
    ::metrics::histogram!(
        "proxy_handler_duration_seconds",
        "rule" => rule.to_string(),
        "handler" => handler
    )
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    ::metrics::gauge!("proxy_active_connections").set(count as f64);
}

/// Record a session switching to byte relay ("passthrough" or "tunnel").
pub fn record_relay(kind: &'static str) {
    ::metrics::counter!("proxy_relays_total", "kind" => kind).increment(1);
}

pub fn record_relayed_bytes(stats: RelayStats) {
    ::metrics::counter!("proxy_relayed_bytes_total", "direction" => "client_to_origin")
        .increment(stats.client_to_origin);
    ::metrics::counter!("proxy_relayed_bytes_total", "direction" => "origin_to_client")
        .increment(stats.origin_to_client);
}
