//! Structured logging configuration.
//!
//! This module installs the tracing subscriber and provides helpers for the
//! few log lines that carry the same field set everywhere.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Event processing above this many milliseconds is logged at `warn`
pub const SLOW_EVENT_MS: u64 = 1000;

/// Build the filter: `RUST_LOG` wins, otherwise `level` for our crates
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},sqlx=warn,hyper=warn")))
}

/// Initialize structured logging
///
/// Features:
/// - Request ID correlation (see [`crate::api::request_id`])
/// - Configurable log levels via `LOG_LEVEL`, overridden by `RUST_LOG`
/// - Target, thread id, file and line on every record
///
/// # Example
///
/// ```no_run
/// use cw_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init("info");
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init(level: &str) {
    let env_filter = build_filter(level);

    // Console layer
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // A second init (tests, embedding) keeps the first subscriber
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(level, "Structured logging initialized");
    }
}

/// Log how long an event took to process
///
/// # Arguments
///
/// * `kind` - Event kind (`bet` or `result`)
/// * `request_id` - Idempotency key of the event
/// * `duration_ms` - Duration in milliseconds
///
/// # Example
///
/// ```
/// use cw_server::logging::log_event_timing;
/// use std::time::Instant;
///
/// let start = Instant::now();
/// // ... process the event ...
/// let duration = start.elapsed().as_millis() as u64;
/// log_event_timing("bet", "req-1", duration);
/// ```
pub fn log_event_timing(kind: &str, request_id: &str, duration_ms: u64) {
    if duration_ms > SLOW_EVENT_MS {
        tracing::warn!(
            kind = kind,
            request_id = request_id,
            duration_ms = duration_ms,
            "PERFORMANCE: Slow event processing"
        );
    } else {
        tracing::debug!(
            kind = kind,
            request_id = request_id,
            duration_ms = duration_ms,
            "Event processing time"
        );
    }
}

/// Log API request/response
///
/// # Arguments
///
/// * `method` - HTTP method
/// * `path` - Request path
/// * `status_code` - Response status code
/// * `duration_ms` - Request duration in milliseconds
/// * `request_id` - Correlation id of the request
pub fn log_api_request(
    method: &str,
    path: &str,
    status_code: u16,
    duration_ms: u64,
    request_id: &str,
) {
    tracing::info!(
        http_method = method,
        http_path = path,
        http_status = status_code,
        duration_ms = duration_ms,
        request_id = request_id,
        "API request completed"
    );
}
