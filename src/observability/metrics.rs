//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_proxy_http_response_codes_total` (counter): terminal outcomes by status code
//! - `rpc_proxy_rpc_requests_total` (counter): calls received by method
//! - `rpc_proxy_rpc_errors_total` (counter): JSON-RPC errors returned by code
//! - `rpc_proxy_backend_requests_total` (counter): upstream attempts by backend, outcome
//! - `rpc_proxy_backend_request_duration_seconds` (histogram): upstream latency
//! - `rpc_proxy_backend_too_many_requests_total` (counter): admission gate rejections
//! - `rpc_proxy_rate_limited_total` (counter): rejections by limiter kind
//! - `rpc_proxy_cache_lookups_total` (counter): cache hits and misses by method
//! - `rpc_proxy_batch_size` (histogram): inbound batch sizes
//!
//! # Design Decisions
//! - `Metrics` is an instance handed to every component that records, so tests
//!   can observe their own counts without a process-wide registry
//! - Every record also goes through the `metrics` facade for Prometheus
//! - `Metrics::global()` exists only for the binary's composition root

use dashmap::DashMap;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static GLOBAL: OnceLock<Arc<Metrics>> = OnceLock::new();

/// Injectable metrics sink.
#[derive(Debug, Default)]
pub struct Metrics {
    response_codes: DashMap<String, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance.
    pub fn global() -> Arc<Metrics> {
        GLOBAL.get_or_init(|| Arc::new(Metrics::new())).clone()
    }

    /// Record one terminal outcome of an inbound HTTP request.
    pub fn record_http_response_code(&self, status_code: &str) {
        *self.response_codes.entry(status_code.to_string()).or_insert(0) += 1;
        counter!("rpc_proxy_http_response_codes_total", "status_code" => status_code.to_string())
            .increment(1);
    }

    /// Number of outcomes recorded for a status code by this instance.
    pub fn http_response_code_count(&self, status_code: &str) -> u64 {
        self.response_codes
            .get(status_code)
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn record_rpc_request(&self, method: &str) {
        counter!("rpc_proxy_rpc_requests_total", "method" => method.to_string()).increment(1);
    }

    pub fn record_rpc_error(&self, code: i64) {
        counter!("rpc_proxy_rpc_errors_total", "code" => code.to_string()).increment(1);
    }

    pub fn record_backend_request(&self, backend: &str, outcome: &'static str, duration: Duration) {
        counter!(
            "rpc_proxy_backend_requests_total",
            "backend" => backend.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("rpc_proxy_backend_request_duration_seconds", "backend" => backend.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_too_many_requests(&self, backend: &str) {
        counter!("rpc_proxy_backend_too_many_requests_total", "backend" => backend.to_string())
            .increment(1);
    }

    pub fn record_rate_limited(&self, kind: &'static str) {
        counter!("rpc_proxy_rate_limited_total", "kind" => kind).increment(1);
    }

    pub fn record_cache_lookup(&self, method: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!(
            "rpc_proxy_cache_lookups_total",
            "method" => method.to_string(),
            "result" => result
        )
        .increment(1);
    }

    pub fn record_batch_size(&self, size: usize) {
        histogram!("rpc_proxy_batch_size").record(size as f64);
    }
}

/// Install the Prometheus exporter and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}
