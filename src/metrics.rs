//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default port 9090).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `inflight_guard_decisions_total` - Dedup decisions (label: outcome)
//! - `inflight_guard_panics_total` - Panics recovered by the error page filter
//!
//! ## Histograms
//! - `inflight_guard_admitted_duration_seconds` - Processing time of admitted
//!   requests (labels: method, status)
//!
//! ## Gauges
//! - `inflight_guard_reservations` - Reservations currently held
//!
//! # Usage
//!
//! ```rust,ignore
//! use inflight_guard::metrics::{init_metrics, record_dedup_outcome};
//!
//! init_metrics(addr)?;
//! record_dedup_outcome("admitted");
//! ```
//!
//! Recording before (or without) `init_metrics` is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const DECISIONS_TOTAL: &str = "inflight_guard_decisions_total";
    pub const PANICS_TOTAL: &str = "inflight_guard_panics_total";
    pub const ADMITTED_DURATION_SECONDS: &str = "inflight_guard_admitted_duration_seconds";
    pub const RESERVATIONS: &str = "inflight_guard_reservations";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. the port is
/// taken or a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::DECISIONS_TOTAL,
        "Deduplication decisions by outcome"
    );
    describe_counter!(
        names::PANICS_TOTAL,
        "Panics recovered by the error page filter"
    );
    describe_histogram!(
        names::ADMITTED_DURATION_SECONDS,
        "Processing time of admitted requests in seconds"
    );
    describe_gauge!(
        names::RESERVATIONS,
        "Request id reservations currently held"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Record a deduplication decision.
pub fn record_dedup_outcome(outcome: &'static str) {
    counter!(names::DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a recovered panic.
pub fn record_panic() {
    counter!(names::PANICS_TOTAL).increment(1);
}

// =============================================================================
// Histograms
// =============================================================================

/// Record how long an admitted request held its reservation.
pub fn record_admitted_duration(method: &str, status: &str, duration_secs: f64) {
    histogram!(names::ADMITTED_DURATION_SECONDS, "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}

// =============================================================================
// Gauges
// =============================================================================

/// One reservation taken.
pub fn inc_reservations() {
    gauge!(names::RESERVATIONS).increment(1.0);
}

/// One reservation released.
pub fn dec_reservations() {
    gauge!(names::RESERVATIONS).decrement(1.0);
}

/// Many reservations discarded at once.
pub fn sub_reservations(count: usize) {
    gauge!(names::RESERVATIONS).decrement(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only verify the recorders don't panic without an exporter.

    #[test]
    fn test_record_dedup_outcome() {
        record_dedup_outcome("admitted");
        record_dedup_outcome("rejected_duplicate");
    }

    #[test]
    fn test_record_admitted_duration() {
        record_admitted_duration("POST", "201", 0.25);
    }

    #[test]
    fn test_reservation_gauge() {
        inc_reservations();
        dec_reservations();
        sub_reservations(0);
    }

    #[test]
    fn test_record_panic() {
        record_panic();
    }
}
