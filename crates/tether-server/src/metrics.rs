//! Metrics collection and export for Tether.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tether_core::Outcome;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "tether_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "tether_connections_active";
    pub const REGISTERED_IDENTITIES: &str = "tether_registered_identities";
    pub const MESSAGES_TOTAL: &str = "tether_messages_total";
    pub const MESSAGES_BYTES: &str = "tether_messages_bytes";
    pub const ENVELOPES_TOTAL: &str = "tether_envelopes_total";
    pub const FORWARDED_TOTAL: &str = "tether_forwarded_total";
    pub const DROPPED_TOTAL: &str = "tether_dropped_total";
    pub const DISPATCH_SECONDS: &str = "tether_dispatch_seconds";
    pub const ERRORS_TOTAL: &str = "tether_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open connections"
    );
    metrics::describe_gauge!(
        names::REGISTERED_IDENTITIES,
        "Current number of identities bound to a connection"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of WebSocket messages");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of WebSocket messages");
    metrics::describe_counter!(names::ENVELOPES_TOTAL, "Envelopes received, by kind");
    metrics::describe_counter!(names::FORWARDED_TOTAL, "Envelopes forwarded, by kind");
    metrics::describe_counter!(names::DROPPED_TOTAL, "Envelopes dropped, by reason");
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Envelope dispatch latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of transport errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
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

/// Record a WebSocket message.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record how an envelope was handled.
pub fn record_outcome(outcome: &Outcome) {
    if let Some(kind) = outcome.kind_label() {
        counter!(names::ENVELOPES_TOTAL, "kind" => kind).increment(1);
    }

    match outcome {
        Outcome::Registered { .. } => {}
        Outcome::Forwarded { .. } => {
            if let Some(kind) = outcome.kind_label() {
                counter!(names::FORWARDED_TOTAL, "kind" => kind).increment(1);
            }
        }
        Outcome::Dropped(reason) => record_dropped(reason.label()),
    }
}

/// Record a dropped envelope.
pub fn record_dropped(reason: &'static str) {
    counter!(names::DROPPED_TOTAL, "reason" => reason).increment(1);
}

/// Record dispatch latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Update the registered identity count.
pub fn set_registered(count: usize) {
    gauge!(names::REGISTERED_IDENTITIES).set(count as f64);
}

/// Record a transport error.
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
