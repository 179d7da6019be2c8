//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, vault
//! - `proxy_request_duration_seconds` (histogram): latency by method, vault
//! - `proxy_transformations_total` (counter): body rewrites by stage, outcome
//! - `proxy_route_lookups_total` (counter): `matched` / `passthrough` / `vault_not_found` / `error`
//!
//! Without an installed recorder every call is a no-op, so tests and
//! metrics-disabled deployments pay nothing.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, vault: &str, elapsed: Duration) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "vault" => vault.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "vault" => vault.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// `outcome` is `ok` or the failing error kind.
pub fn record_transformation(stage: &'static str, outcome: &'static str) {
    metrics::counter!("proxy_transformations_total", "stage" => stage, "outcome" => outcome).increment(1);
}

pub fn record_route_lookup(result: &'static str) {
    metrics::counter!("proxy_route_lookups_total", "result" => result).increment(1);
}
