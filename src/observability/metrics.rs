//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_errors_total` (counter): dispatched failures by category, status
//! - `admission_rejected_total` (counter): requests refused with 429
//! - `log_store_dropped_total` (counter): records the external store queue
//!   could not accept
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is opt-in via `METRICS_ADDRESS`

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Count one dispatched failure.
pub fn record_error(category: &'static str, status: u16) {
    ::metrics::counter!(
        "http_errors_total",
        "category" => category,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count one 429.
pub fn record_rate_limited() {
    ::metrics::counter!("admission_rejected_total").increment(1);
}

/// Count one record the store queue refused.
pub fn record_log_dropped() {
    ::metrics::counter!("log_store_dropped_total").increment(1);
}
