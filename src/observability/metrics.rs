//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by kind, status
//! - `proxy_request_duration_seconds` (histogram): latency by kind
//! - `proxy_tunnel_sessions_active` (gauge): open websocket tunnels
//! - `proxy_tunnel_sessions_total` (counter): tunnels opened
//! - `proxy_backend_health` (gauge): 1=OK, 0=NOT OK, by alias
//! - `proxy_backends_registered` (gauge): registry size

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_request(kind: &'static str, status: u16, start: Instant) {
    metrics::counter!("proxy_requests_total", "kind" => kind, "status" => status.to_string())
        .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_backend_health(alias: &str, healthy: bool) {
    metrics::gauge!("proxy_backend_health", "alias" => alias.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_backends(count: usize) {
    metrics::gauge!("proxy_backends_registered").set(count as f64);
}

pub fn tunnel_opened() {
    metrics::counter!("proxy_tunnel_sessions_total").increment(1);
    metrics::gauge!("proxy_tunnel_sessions_active").increment(1.0);
}

pub fn tunnel_closed() {
    metrics::gauge!("proxy_tunnel_sessions_active").decrement(1.0);
}
