//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use parley_core::PublishReport;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parley_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parley_connections_active";
    pub const FRAMES_TOTAL: &str = "parley_frames_total";
    pub const MESSAGES_APPENDED: &str = "parley_messages_appended_total";
    pub const FANOUT_RECIPIENTS: &str = "parley_fanout_recipients_total";
    pub const FANOUT_SKIPPED: &str = "parley_fanout_skipped_total";
    pub const FANOUT_PRUNED: &str = "parley_fanout_pruned_total";
    pub const STORE_TRANSACTION_SECONDS: &str = "parley_store_transaction_seconds";
    pub const ONLINE_IDENTITIES: &str = "parley_online_identities";
    pub const OPERATION_SECONDS: &str = "parley_operation_seconds";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of WebSocket connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of live WebSocket connections"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Frames sent and received");
    metrics::describe_counter!(
        names::MESSAGES_APPENDED,
        "Messages committed to conversation logs"
    );
    metrics::describe_counter!(
        names::FANOUT_RECIPIENTS,
        "Connections a committed message was queued for"
    );
    metrics::describe_counter!(
        names::FANOUT_SKIPPED,
        "Deliveries skipped because the connection was not writable"
    );
    metrics::describe_counter!(
        names::FANOUT_PRUNED,
        "Dead connections removed during fan-out"
    );
    metrics::describe_histogram!(
        names::STORE_TRANSACTION_SECONDS,
        "Time a store transaction holds its collection lock, in seconds"
    );
    metrics::describe_gauge!(names::ONLINE_IDENTITIES, "Identities currently online");
    metrics::describe_histogram!(
        names::OPERATION_SECONDS,
        "Latency of core operations in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

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

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame.
pub fn record_frame(frame_type: &'static str, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "type" => frame_type, "direction" => direction).increment(1);
}

/// Record a committed message.
pub fn record_append() {
    counter!(names::MESSAGES_APPENDED).increment(1);
}

/// Record the fan-out of one committed message.
pub fn record_fanout(report: &PublishReport) {
    counter!(names::FANOUT_RECIPIENTS).increment(report.delivered as u64);
    counter!(names::FANOUT_SKIPPED).increment(report.skipped as u64);
    counter!(names::FANOUT_PRUNED).increment(report.pruned as u64);
}

/// Record one store transaction. Suits [`parley_core::Store::with_observer`].
pub fn record_transaction(collection: &str, elapsed: Duration, committed: bool) {
    let outcome = if committed { "committed" } else { "aborted" };
    histogram!(
        names::STORE_TRANSACTION_SECONDS,
        "collection" => collection.to_string(),
        "outcome" => outcome
    )
    .record(elapsed.as_secs_f64());
}

/// Update the online identity count.
pub fn set_online(count: usize) {
    gauge!(names::ONLINE_IDENTITIES).set(count as f64);
}

/// Record the latency of a core operation.
pub fn record_latency(operation: &'static str, seconds: f64) {
    histogram!(names::OPERATION_SECONDS, "operation" => operation).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
