//! Prometheus metrics for monitoring wallet throughput and health.
//!
//! Metrics are exposed in Prometheus text format for scraping by monitoring
//! systems once [`init_metrics`] has installed the exporter. Until then the
//! recording functions are no-ops.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use cw_server::metrics;
//! use std::net::SocketAddr;
//!
//! // Initialize metrics exporter
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! // Record HTTP request
//! metrics::http_requests_total("POST", "/event", 200);
//!
//! // Record a processed event
//! metrics::ledger_events_total("bet", "accepted");
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Arguments
///
/// - `addr`: Address to bind the metrics server to (e.g., `0.0.0.0:9090`)
///
/// # Returns
///
/// Result indicating success or error message
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
///
/// Increments the total HTTP request counter with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Ledger Metrics
// ============================================================================

/// Count a processed event.
///
/// `outcome` is `accepted` or the rejection code (`duplicate_request`,
/// `insufficient_balance`, ...).
pub fn ledger_events_total(kind: &str, outcome: &str) {
    metrics::counter!("ledger_events_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record event processing duration in milliseconds.
pub fn ledger_event_duration_ms(kind: &str, duration_ms: f64) {
    metrics::histogram!("ledger_event_duration_ms",
        "kind" => kind.to_string()
    )
    .record(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        http_requests_total("GET", "/health", 200);
        ledger_events_total("bet", "accepted");
        ledger_event_duration_ms("result", 1.5);
    }
}
