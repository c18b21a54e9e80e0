//! Prometheus metrics for the relay bridge.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration
//! fails, it indicates a fatal configuration error (e.g., duplicate metric
//! names) that should cause an immediate crash at startup rather than
//! silent failure. These panics only occur during static initialization,
//! never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_int_gauge, Counter,
    CounterVec, GaugeVec, IntGauge,
};

/// Connection state machine current state.
/// Labels: state (disconnected/connecting/connected/degraded/reconnecting/failed)
pub static CONN_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "relay_conn_state",
        "Connection state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static RECONNECT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("relay_reconnect_total", "Total reconnection attempts").unwrap()
});

/// Total frames sent, by message type.
pub static FRAMES_SENT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_frames_sent_total",
        "Total frames sent to the execution engine",
        &["type"]
    )
    .unwrap()
});

/// Total frames received, by message type.
pub static FRAMES_RECEIVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_frames_received_total",
        "Total frames received from the execution engine",
        &["type"]
    )
    .unwrap()
});

/// Total signals enqueued, by priority.
pub static SIGNALS_ENQUEUED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_signals_enqueued_total",
        "Total signals enqueued",
        &["priority"]
    )
    .unwrap()
});

/// Total signals dispatched (clock-due or price-fired).
pub static SIGNALS_DISPATCHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_signals_dispatched_total",
        "Total signals dispatched to the execution engine",
        &["trigger"]
    )
    .unwrap()
});

/// Total risk limit breaches detected.
pub static RISK_BREACHES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "relay_risk_breaches_total",
        "Total risk limit breaches detected"
    )
    .unwrap()
});

/// Emergency shutdown step outcomes.
/// Labels: step, outcome (ok/failed)
pub static SHUTDOWN_STEPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_shutdown_steps_total",
        "Emergency shutdown step outcomes",
        &["step", "outcome"]
    )
    .unwrap()
});

/// Trading disabled flag (1 = marker present).
pub static TRADING_DISABLED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "relay_trading_disabled",
        "Trading disabled marker present (1=disabled)"
    )
    .unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        // Touching each static forces registration; duplicates would panic.
        CONN_STATE.with_label_values(&["connected"]).set(1.0);
        RECONNECT_TOTAL.inc();
        FRAMES_SENT_TOTAL.with_label_values(&["HEARTBEAT"]).inc();
        FRAMES_RECEIVED_TOTAL.with_label_values(&["SIGNAL"]).inc();
        SIGNALS_ENQUEUED_TOTAL.with_label_values(&["urgent"]).inc();
        SIGNALS_DISPATCHED_TOTAL.with_label_values(&["price"]).inc();
        RISK_BREACHES_TOTAL.inc();
        SHUTDOWN_STEPS_TOTAL.with_label_values(&["marker", "ok"]).inc();
        TRADING_DISABLED.set(0);
    }
}
