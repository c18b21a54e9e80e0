//! Risk governor poll loop.
//!
//! Compares each account snapshot against hard limits and latches the
//! emergency shutdown sequence on breach. Any error inside an iteration
//! is caught and logged and the loop continues on the next period; a
//! terminated governor would itself be the worse failure.

use crate::alert::{AlertDispatcher, AlertSeverity};
use crate::bridge::TradingBridge;
use crate::latch::{BreachReason, ShutdownLatch};
use crate::marker::DisabledMarker;
use crate::metrics_provider::MetricsProvider;
use crate::resource::ResourceMonitor;
use crate::shutdown;
use crate::workers::WorkerReaper;
use relay_core::RiskSnapshot;
use relay_telemetry::metrics;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Governor configuration.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Poll period in milliseconds.
    pub check_interval_ms: u64,
    /// Maximum tolerated drawdown, percent.
    pub max_drawdown_pct: Decimal,
    /// Daily loss limit (positive number; breach when pnl < -limit).
    pub daily_loss_limit: Decimal,
    /// CPU warning threshold, percent.
    pub cpu_warn_pct: f32,
    /// Memory warning threshold, percent.
    pub memory_warn_pct: f32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            max_drawdown_pct: Decimal::from(10),
            daily_loss_limit: Decimal::from(500),
            cpu_warn_pct: 90.0,
            memory_warn_pct: 90.0,
        }
    }
}

/// Risk governor: the watchdog loop.
pub struct RiskGovernor {
    config: GovernorConfig,
    latch: Arc<ShutdownLatch>,
    marker: DisabledMarker,
    metrics: Arc<dyn MetricsProvider>,
    bridge: Arc<dyn TradingBridge>,
    alerts: Arc<dyn AlertDispatcher>,
    reaper: WorkerReaper,
    resources: ResourceMonitor,
    shutdown: CancellationToken,
    source: String,
}

impl RiskGovernor {
    pub fn new(
        config: GovernorConfig,
        marker: DisabledMarker,
        metrics: Arc<dyn MetricsProvider>,
        bridge: Arc<dyn TradingBridge>,
        alerts: Arc<dyn AlertDispatcher>,
        reaper: WorkerReaper,
    ) -> Self {
        Self {
            config,
            latch: Arc::new(ShutdownLatch::new()),
            marker,
            metrics,
            bridge,
            alerts,
            reaper,
            resources: ResourceMonitor::new(),
            shutdown: CancellationToken::new(),
            source: "riskd".to_string(),
        }
    }

    /// The breach latch, for inspection and manual reset.
    pub fn latch(&self) -> &Arc<ShutdownLatch> {
        &self.latch
    }

    /// Token that stops the loop at its next iteration boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request the loop exit after its current iteration.
    pub fn stop(&self) {
        info!("Risk governor stop requested");
        self.shutdown.cancel();
    }

    /// Run the watchdog loop until cancelled.
    pub async fn run(&self) {
        info!(
            interval_ms = self.config.check_interval_ms,
            max_drawdown_pct = %self.config.max_drawdown_pct,
            daily_loss_limit = %self.config.daily_loss_limit,
            "Risk governor running"
        );

        let interval = Duration::from_millis(self.config.check_interval_ms);
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            if let Err(e) = self.tick().await {
                // The loop must survive anything a tick throws at it.
                error!(error = %e, "Risk check failed; continuing on next period");
            }
        }

        info!("Risk governor loop exited");
    }

    /// One poll: evaluate limits, run the shutdown sequence on a fresh
    /// breach, then check resource pressure.
    pub async fn tick(&self) -> crate::error::RiskResult<()> {
        let snapshot = self.metrics.snapshot().await?;
        debug!(
            drawdown_pct = %snapshot.drawdown_pct,
            daily_pnl = %snapshot.daily_pnl,
            open_positions = snapshot.open_positions,
            "Risk snapshot"
        );

        if let Some(reason) = self.evaluate(&snapshot) {
            metrics::RISK_BREACHES_TOTAL.inc();
            if self.latch.trigger(reason.clone()) {
                let report = shutdown::execute(
                    &reason,
                    self.bridge.as_ref(),
                    &self.marker,
                    self.alerts.as_ref(),
                    &self.reaper,
                    &self.source,
                )
                .await;
                if !report.all_ok() {
                    error!(reason = %reason, "Emergency shutdown completed with failed steps");
                }
            } else {
                debug!(reason = %reason, "Breach while already latched; no-op");
            }
        }

        self.check_resources().await;
        Ok(())
    }

    fn evaluate(&self, snapshot: &RiskSnapshot) -> Option<BreachReason> {
        if snapshot.drawdown_pct > self.config.max_drawdown_pct {
            return Some(BreachReason::DrawdownExceeded {
                drawdown_pct: snapshot.drawdown_pct,
                limit_pct: self.config.max_drawdown_pct,
            });
        }
        if snapshot.daily_pnl < -self.config.daily_loss_limit {
            return Some(BreachReason::DailyLossExceeded {
                daily_pnl: snapshot.daily_pnl,
                limit: self.config.daily_loss_limit,
            });
        }
        None
    }

    /// Resource pressure warns the operators at lower severity; it never
    /// halts trading.
    async fn check_resources(&self) {
        let usage = self.resources.sample();
        if usage.cpu_pct <= self.config.cpu_warn_pct
            && usage.memory_pct <= self.config.memory_warn_pct
        {
            return;
        }

        warn!(
            cpu_pct = usage.cpu_pct,
            memory_pct = usage.memory_pct,
            "Resource pressure"
        );
        let body = format!(
            "cpu {:.1}% (warn {:.0}%), memory {:.1}% (warn {:.0}%)",
            usage.cpu_pct, self.config.cpu_warn_pct, usage.memory_pct, self.config.memory_warn_pct
        );
        if let Err(e) = self
            .alerts
            .dispatch(AlertSeverity::Warning, "Resource pressure", &body)
            .await
        {
            warn!(error = %e, "Resource warning dispatch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MockAlertDispatcher;
    use crate::bridge::MockTradingBridge;
    use crate::metrics_provider::MockMetricsProvider;
    use rust_decimal_macros::dec;

    struct Harness {
        _dir: tempfile::TempDir,
        governor: RiskGovernor,
        provider: Arc<MockMetricsProvider>,
        bridge: Arc<MockTradingBridge>,
        alerts: Arc<MockAlertDispatcher>,
        marker: DisabledMarker,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let marker = DisabledMarker::new(dir.path().join("trading_disabled.json"));
        let provider = Arc::new(MockMetricsProvider::new());
        let bridge = Arc::new(MockTradingBridge::new());
        let alerts = Arc::new(MockAlertDispatcher::new());
        let reaper = WorkerReaper::new(dir.path().join("pids"));

        let config = GovernorConfig {
            check_interval_ms: 10,
            max_drawdown_pct: dec!(10),
            daily_loss_limit: dec!(500),
            // Unreachable so resource warnings stay out of these tests.
            cpu_warn_pct: 1000.0,
            memory_warn_pct: 1000.0,
        };

        let governor = RiskGovernor::new(
            config,
            marker.clone(),
            provider.clone(),
            bridge.clone(),
            alerts.clone(),
            reaper,
        );

        Harness {
            _dir: dir,
            governor,
            provider,
            bridge,
            alerts,
            marker,
        }
    }

    fn snapshot(drawdown: rust_decimal::Decimal, pnl: rust_decimal::Decimal) -> RiskSnapshot {
        RiskSnapshot::new(dec!(10000), dec!(9000), drawdown, pnl, 2)
    }

    #[tokio::test]
    async fn test_drawdown_breach_runs_sequence_exactly_once() {
        let h = harness();
        h.provider.set(snapshot(dec!(12), dec!(0)));

        h.governor.tick().await.unwrap();
        assert!(h.governor.latch().is_triggered());
        assert_eq!(h.bridge.call_count(), 1);
        assert!(h.marker.is_set());
        assert_eq!(h.alerts.count_at(AlertSeverity::Critical), 1);

        // Immediately breached again: the sequence must not rerun.
        h.governor.tick().await.unwrap();
        assert_eq!(h.bridge.call_count(), 1);
        assert_eq!(h.alerts.count_at(AlertSeverity::Critical), 1);
    }

    #[tokio::test]
    async fn test_daily_loss_breach_triggers() {
        let h = harness();
        h.provider.set(snapshot(dec!(1), dec!(-501)));

        h.governor.tick().await.unwrap();
        match h.governor.latch().reason() {
            Some(BreachReason::DailyLossExceeded { .. }) => {}
            other => panic!("expected DailyLossExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_within_limits_no_trigger() {
        let h = harness();
        h.provider.set(snapshot(dec!(9.9), dec!(-499)));

        h.governor.tick().await.unwrap();
        assert!(!h.governor.latch().is_triggered());
        assert!(!h.marker.is_set());
        assert_eq!(h.bridge.call_count(), 0);
    }

    #[tokio::test]
    async fn test_loop_survives_provider_errors() {
        let h = harness();
        // No snapshot configured: every tick errors.
        assert!(h.governor.tick().await.is_err());

        // A later valid snapshot is still evaluated.
        h.provider.set(snapshot(dec!(12), dec!(0)));
        h.governor.tick().await.unwrap();
        assert!(h.governor.latch().is_triggered());
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_cancel() {
        let h = harness();
        h.provider.set(snapshot(dec!(0), dec!(0)));

        let token = h.governor.cancellation_token();
        let ran = tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(h.governor.run(), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel();
            })
        })
        .await;

        assert!(ran.is_ok(), "run() must exit after cancellation");
        assert!(h.provider.poll_count() >= 1);
    }
}
