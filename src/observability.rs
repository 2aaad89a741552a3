use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings committed.
pub const BOOKINGS_TOTAL: &str = "bookd_bookings_total";

/// Counter: booking attempts rejected. Label: reason.
pub const BOOKING_REJECTED_TOTAL: &str = "bookd_booking_rejected_total";

/// Histogram: booking transaction latency in seconds (lock wait included).
pub const BOOKING_DURATION_SECONDS: &str = "bookd_booking_duration_seconds";

/// Counter: slots created.
pub const SLOTS_CREATED_TOTAL: &str = "bookd_slots_created_total";

/// Counter: slot creations rejected by the conflict checker.
pub const SLOT_CONFLICTS_TOTAL: &str = "bookd_slot_conflicts_total";

/// Counter: fire-and-forget calendar sync failures (never surfaced).
pub const CALENDAR_SYNC_FAILURES_TOTAL: &str = "bookd_calendar_sync_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: registered owners.
pub const OWNERS_ACTIVE: &str = "bookd_owners_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookd_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if `None`.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the default fmt tracing subscriber. For embedders and tests.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
