//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use confab_core::DispatchOutcome;
use confab_protocol::{ErrorKind, EventKind};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "confab_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "confab_connections_active";
    pub const MESSAGES_TOTAL: &str = "confab_messages_total";
    pub const ROOMS_ACTIVE: &str = "confab_rooms_active";
    pub const PERSISTENCE_FAILURES_TOTAL: &str = "confab_persistence_failures_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "confab_delivery_failures_total";
    pub const DISPATCH_SECONDS: &str = "confab_dispatch_seconds";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of sessions since server start"
    );
    metrics::describe_gauge!(names::CONNECTIONS_ACTIVE, "Current number of live sessions");
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Inbound events dispatched, by type");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Rooms with at least one live member");
    metrics::describe_counter!(
        names::PERSISTENCE_FAILURES_TOTAL,
        "Durable writes that failed, by kind"
    );
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Notifications that could not be delivered to a recipient"
    );
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Time to persist and fan out one event"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record one dispatched event.
pub fn record_dispatch(kind: EventKind, outcome: &DispatchOutcome, elapsed: Duration) {
    counter!(names::MESSAGES_TOTAL, "type" => kind.as_str()).increment(1);
    histogram!(names::DISPATCH_SECONDS, "type" => kind.as_str()).record(elapsed.as_secs_f64());

    match outcome {
        DispatchOutcome::Delivered(delivery) if delivery.failed > 0 => {
            record_delivery_failures(delivery.failed);
        }
        DispatchOutcome::PersistFailed(kind) => record_persistence_failure(*kind),
        _ => {}
    }
}

/// Record a failed durable write.
pub fn record_persistence_failure(kind: ErrorKind) {
    let label = match kind {
        ErrorKind::HistoryInsertFailed => "message",
        ErrorKind::ReadStatusInsertFailed => "read_receipt",
        ErrorKind::DeliveryFailed | ErrorKind::DepartureDeliveryFailed => "other",
    };
    counter!(names::PERSISTENCE_FAILURES_TOTAL, "kind" => label).increment(1);
}

/// Record failed deliveries.
pub fn record_delivery_failures(count: usize) {
    counter!(names::DELIVERY_FAILURES_TOTAL).increment(count as u64);
}

/// Update the live room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_core::Delivery;

    #[test]
    fn test_recording_without_exporter() {
        let _guard = ConnectionMetricsGuard::new();
        record_dispatch(
            EventKind::SendMessage,
            &DispatchOutcome::Delivered(Delivery {
                delivered: 1,
                failed: 1,
            }),
            Duration::from_millis(2),
        );
        record_dispatch(
            EventKind::MarkMessageAsRead,
            &DispatchOutcome::PersistFailed(ErrorKind::ReadStatusInsertFailed),
            Duration::from_millis(1),
        );
        set_active_rooms(3);
    }
}
