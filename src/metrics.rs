//! Prometheus metrics for the scheduling and sync core
//!
//! Provides observability metrics for monitoring reminder dispatch and
//! cross-device sync in production.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};

lazy_static! {
    /// Counter: reminders fired, by dispatched style
    pub static ref REMINDERS_FIRED: CounterVec = register_counter_vec!(
        "petalsync_reminders_fired_total",
        "Due notifications dispatched, by effective style",
        &["style"]
    )
    .expect("Failed to create reminders_fired metric");

    /// Counter: missed-dose notifications dispatched
    pub static ref REMINDERS_MISSED: Counter = register_counter!(
        "petalsync_reminders_missed_total",
        "Missed notifications dispatched after the grace window"
    )
    .expect("Failed to create reminders_missed metric");

    /// Counter: snoozes
    pub static ref SNOOZES: Counter = register_counter!(
        "petalsync_snoozes_total",
        "Reminder deferrals"
    )
    .expect("Failed to create snoozes metric");

    /// Gauge: pending sync records awaiting acknowledgment
    pub static ref PENDING_RECORDS: Gauge = register_gauge!(
        "petalsync_pending_records",
        "Sync records queued for delivery"
    )
    .expect("Failed to create pending_records metric");

    /// Counter: acknowledged sends
    pub static ref RECORDS_ACKED: Counter = register_counter!(
        "petalsync_records_acked_total",
        "Outbound records acknowledged by the remote side"
    )
    .expect("Failed to create records_acked metric");

    /// Counter: inbound records applied, by category
    pub static ref RECORDS_APPLIED: CounterVec = register_counter_vec!(
        "petalsync_records_applied_total",
        "Inbound records applied to local state",
        &["record_type"]
    )
    .expect("Failed to create records_applied metric");

    /// Counter: send failures by cause
    pub static ref SEND_FAILURES: CounterVec = register_counter_vec!(
        "petalsync_send_failures_total",
        "Outbound send failures",
        &["cause"]
    )
    .expect("Failed to create send_failures metric");

    /// Counter: reconnection attempts
    pub static ref RECONNECT_ATTEMPTS: Counter = register_counter!(
        "petalsync_reconnect_attempts_total",
        "Transport reconnection attempts"
    )
    .expect("Failed to create reconnect_attempts metric");

    /// Gauge: engine connection state (1 = connected, 0 = offline)
    pub static ref CONNECTED: Gauge = register_gauge!(
        "petalsync_connected",
        "Whether the transport session is up"
    )
    .expect("Failed to create connected metric");
}

/// Record a fired reminder
pub fn record_fire(style: &str) {
    REMINDERS_FIRED.with_label_values(&[style]).inc();
}

/// Record a missed-dose dispatch
pub fn record_missed() {
    REMINDERS_MISSED.inc();
}

/// Record a snooze
pub fn record_snooze() {
    SNOOZES.inc();
}

/// Update the pending-record gauge
pub fn set_pending_records(count: i64) {
    PENDING_RECORDS.set(count as f64);
}

/// Record an acknowledged send
pub fn record_ack() {
    RECORDS_ACKED.inc();
}

/// Record an applied inbound record
pub fn record_applied(record_type: &str) {
    RECORDS_APPLIED.with_label_values(&[record_type]).inc();
}

/// Record a send failure
pub fn record_send_failure(cause: &str) {
    SEND_FAILURES.with_label_values(&[cause]).inc();
}

/// Record a reconnection attempt
pub fn record_reconnect_attempt() {
    RECONNECT_ATTEMPTS.inc();
}

/// Update the connection-state gauge
pub fn set_connected(connected: bool) {
    CONNECTED.set(if connected { 1.0 } else { 0.0 });
}

/// Gather all metrics in Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
