//! Emergency shutdown sequence.
//!
//! Fixed, ordered, best-effort: every step is attempted even when an
//! earlier one fails, and every failure is logged individually. The
//! caller holds the latch, so the sequence runs once per breach episode.

use crate::alert::{AlertDispatcher, AlertSeverity};
use crate::bridge::TradingBridge;
use crate::latch::BreachReason;
use crate::marker::{DisabledMarker, MarkerRecord};
use crate::workers::WorkerReaper;
use chrono::{DateTime, Utc};
use relay_telemetry::metrics;
use tracing::{error, info};

/// Outcome of one shutdown step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: &'static str,
    pub ok: bool,
    pub detail: Option<String>,
}

impl StepOutcome {
    fn ok(step: &'static str) -> Self {
        metrics::SHUTDOWN_STEPS_TOTAL
            .with_label_values(&[step, "ok"])
            .inc();
        Self {
            step,
            ok: true,
            detail: None,
        }
    }

    fn failed(step: &'static str, detail: String) -> Self {
        metrics::SHUTDOWN_STEPS_TOTAL
            .with_label_values(&[step, "failed"])
            .inc();
        error!(step, error = %detail, "Emergency shutdown step failed");
        Self {
            step,
            ok: false,
            detail: Some(detail),
        }
    }
}

/// Record of one emergency shutdown run.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub reason: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
}

impl ShutdownReport {
    /// Whether every step succeeded.
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

/// Run the emergency shutdown sequence.
///
/// Order: (1) close all open positions, (2) write the durable
/// trading-disabled marker, (3) critical operator alert, (4) terminate
/// auxiliary trading workers.
pub async fn execute(
    reason: &BreachReason,
    bridge: &dyn TradingBridge,
    marker: &DisabledMarker,
    alerts: &dyn AlertDispatcher,
    reaper: &WorkerReaper,
    source: &str,
) -> ShutdownReport {
    let started_at = Utc::now();
    error!(reason = %reason, "EMERGENCY SHUTDOWN SEQUENCE STARTED");

    let mut steps = Vec::with_capacity(4);

    // Step 1: flatten the account.
    steps.push(match bridge.close_all_positions().await {
        Ok(()) => StepOutcome::ok("close_positions"),
        Err(e) => StepOutcome::failed("close_positions", e.to_string()),
    });

    // Step 2: durable marker, checked by dispatch before accepting new
    // signals and surviving restarts.
    let record = MarkerRecord::new(reason.to_string(), source);
    steps.push(match marker.write(&record) {
        Ok(()) => StepOutcome::ok("write_marker"),
        Err(e) => StepOutcome::failed("write_marker", e.to_string()),
    });

    // Step 3: tell the operators.
    let body = format!(
        "Trading halted at {}: {}. Positions were {}closed; marker at {}.",
        started_at,
        reason,
        if steps[0].ok { "" } else { "NOT " },
        marker.path().display(),
    );
    steps.push(
        match alerts
            .dispatch(AlertSeverity::Critical, "EMERGENCY SHUTDOWN", &body)
            .await
        {
            Ok(()) => StepOutcome::ok("alert_operators"),
            Err(e) => StepOutcome::failed("alert_operators", e.to_string()),
        },
    );

    // Step 4: stop any straggler workers.
    let terminated = reaper.terminate_all();
    steps.push(StepOutcome::ok("terminate_workers"));
    info!(terminated, "Auxiliary workers terminated");

    let report = ShutdownReport {
        reason: reason.to_string(),
        started_at,
        steps,
    };
    info!(
        all_ok = report.all_ok(),
        "Emergency shutdown sequence finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MockAlertDispatcher;
    use crate::bridge::MockTradingBridge;
    use rust_decimal_macros::dec;

    fn breach() -> BreachReason {
        BreachReason::DrawdownExceeded {
            drawdown_pct: dec!(12),
            limit_pct: dec!(10),
        }
    }

    fn fixtures() -> (
        tempfile::TempDir,
        MockTradingBridge,
        DisabledMarker,
        MockAlertDispatcher,
        WorkerReaper,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let bridge = MockTradingBridge::new();
        let marker = DisabledMarker::new(dir.path().join("trading_disabled.json"));
        let alerts = MockAlertDispatcher::new();
        let reaper = WorkerReaper::new(dir.path().join("pids"));
        (dir, bridge, marker, alerts, reaper)
    }

    #[tokio::test]
    async fn test_sequence_runs_all_steps() {
        let (_dir, bridge, marker, alerts, reaper) = fixtures();

        let report = execute(&breach(), &bridge, &marker, &alerts, &reaper, "riskd").await;

        assert!(report.all_ok());
        assert_eq!(report.steps.len(), 4);
        assert_eq!(bridge.call_count(), 1);
        assert!(marker.is_set());
        assert_eq!(alerts.count_at(AlertSeverity::Critical), 1);
    }

    #[tokio::test]
    async fn test_failed_step_does_not_abort_the_rest() {
        let (_dir, bridge, marker, alerts, reaper) = fixtures();
        bridge.set_fail(true);

        let report = execute(&breach(), &bridge, &marker, &alerts, &reaper, "riskd").await;

        assert!(!report.all_ok());
        assert!(!report.steps[0].ok);
        // Marker and alert still happened.
        assert!(marker.is_set());
        assert_eq!(alerts.count_at(AlertSeverity::Critical), 1);
        // Alert body reports the failed closure.
        let (_, _, body) = &alerts.sent()[0];
        assert!(body.contains("NOT closed"));
    }

    #[tokio::test]
    async fn test_alert_failure_still_reaps_workers() {
        let (_dir, bridge, marker, alerts, reaper) = fixtures();
        alerts.set_fail(true);

        let report = execute(&breach(), &bridge, &marker, &alerts, &reaper, "riskd").await;

        assert!(!report.all_ok());
        assert_eq!(report.steps.len(), 4, "every step must be attempted");
        assert!(report.steps[3].ok);
        assert!(marker.is_set());
    }
}
