use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total reservation attempts. Labels: op, outcome.
pub const RESERVATIONS_TOTAL: &str = "innkeep_reservations_total";

/// Histogram: reservation latency in seconds. Labels: op.
pub const RESERVATION_DURATION_SECONDS: &str = "innkeep_reservation_duration_seconds";

/// Counter: booking-code draws that collided and were retried.
pub const CODE_RETRIES_TOTAL: &str = "innkeep_code_retries_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently tracked by the engine.
pub const ROOMS_ACTIVE: &str = "innkeep_rooms_active";

/// Gauge: bookings in an active status (pending or confirmed).
pub const BOOKINGS_ACTIVE: &str = "innkeep_bookings_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map an engine outcome to a short label for metrics.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EngineError::DateRangeUnavailable { .. }) => "conflict",
        Err(EngineError::Storage(_)) => "storage",
        Err(_) => "rejected",
    }
}
