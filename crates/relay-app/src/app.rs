//! Application wiring and the dispatch loop.
//!
//! The dispatch loop is thin glue: it drains inbound frames, feeds
//! prices from status responses into the queue's trigger evaluation,
//! sends due signals, and refuses all dispatch while the durable
//! trading-disabled marker is present. Strategy and scoring live
//! elsewhere.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use relay_conn::{ConnState, ConnectionInfo, ConnectionSupervisor};
use relay_core::{Price, RiskSnapshot, Signal};
use relay_proto::{Envelope, MessageType};
use relay_queue::SignalQueue;
use relay_risk::{DisabledMarker, GovernorProcess};
use relay_telemetry::metrics;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// STATUS_RESPONSE payload shape.
#[derive(Debug, Deserialize)]
struct StatusPayload {
    /// Latest prices by symbol.
    #[serde(default)]
    prices: HashMap<String, Decimal>,
    /// Account fields, re-exported for the risk governor.
    #[serde(default)]
    account: Option<AccountStatus>,
}

#[derive(Debug, Deserialize)]
struct AccountStatus {
    balance: Decimal,
    equity: Decimal,
    drawdown_pct: Decimal,
    daily_pnl: Decimal,
    open_positions: u32,
}

/// The relay bridge application.
pub struct Application {
    config: AppConfig,
    config_path: Option<String>,
    queue: Arc<SignalQueue>,
    supervisor: Arc<ConnectionSupervisor>,
    marker: DisabledMarker,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application. Fails fast on invalid configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let supervisor = Arc::new(ConnectionSupervisor::new(config.supervisor_config()));
        let marker = DisabledMarker::new(&config.risk.marker_path);

        Ok(Self {
            config,
            config_path: None,
            queue: Arc::new(SignalQueue::new()),
            supervisor,
            marker,
            shutdown: CancellationToken::new(),
        })
    }

    /// Remember the config file path so the governor process can be
    /// spawned with the same configuration.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// The signal queue, for producers living in this process.
    pub fn queue(&self) -> &Arc<SignalQueue> {
        &self.queue
    }

    /// The connection supervisor.
    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// Admit a signal from a strategy or manual producer.
    ///
    /// Refused while the trading-disabled marker is set.
    pub fn submit_signal(&self, signal: Signal) -> AppResult<()> {
        if self.marker.is_set() {
            let reason = self
                .marker
                .read()
                .map(|r| r.reason)
                .unwrap_or_else(|| "marker present".to_string());
            return Err(AppError::TradingDisabled(reason));
        }

        let priority = signal.priority.to_string();
        self.queue.add(signal)?;
        metrics::SIGNALS_ENQUEUED_TOTAL
            .with_label_values(&[&priority])
            .inc();
        Ok(())
    }

    /// Connection health for display layers.
    pub fn get_connection_info(&self) -> ConnectionInfo {
        self.supervisor.connection_info()
    }

    /// Signals due inside the configured lookahead window, plus all
    /// pending price-driven signals. For display layers.
    pub fn upcoming_signals(&self) -> Vec<Signal> {
        self.queue
            .get_upcoming(Duration::from_secs(self.config.dispatch.upcoming_window_secs))
    }

    /// Stop the dispatch loop at its next iteration boundary.
    pub fn shutdown(&self) {
        info!("Application shutdown requested");
        self.shutdown.cancel();
    }

    /// Run the bridge until shutdown.
    pub async fn run(self: &Arc<Self>) -> AppResult<()> {
        info!(endpoint = %self.config.endpoint, "Relay bridge starting");

        let (hb_loop, rc_loop) = self.supervisor.spawn_loops();

        if let Err(e) = self.supervisor.connect().await {
            warn!(error = %e, "Initial connect failed; reconnect loop will retry");
        }

        let governor = self.spawn_governor();

        {
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received; shutting down");
                    token.cancel();
                }
            });
        }

        let mut dispatch_tick =
            tokio::time::interval(Duration::from_millis(self.config.dispatch.poll_interval_ms));
        let mut status_tick =
            tokio::time::interval(Duration::from_millis(self.config.dispatch.status_interval_ms));

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = status_tick.tick() => self.request_status().await,
                _ = dispatch_tick.tick() => {
                    if let Err(e) = self.dispatch_cycle().await {
                        warn!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }

        if let Some(process) = governor {
            let grace = Duration::from_millis(self.config.risk.stop_grace_ms);
            if let Err(e) = process.stop(grace).await {
                warn!(error = %e, "Governor stop failed");
            }
        }

        self.supervisor.shutdown();
        let _ = hb_loop.await;
        let _ = rc_loop.await;
        info!("Relay bridge stopped");
        Ok(())
    }

    fn spawn_governor(&self) -> Option<GovernorProcess> {
        if !self.config.risk.manage_governor {
            info!("Governor management disabled; expecting an external riskd");
            return None;
        }
        let Some(config_path) = self.config_path.as_deref() else {
            warn!("No config path known; riskd not spawned");
            return None;
        };
        match GovernorProcess::spawn(&self.config.risk.riskd_path, config_path) {
            Ok(process) => Some(process),
            Err(e) => {
                warn!(error = %e, "Failed to spawn riskd; running without local governor");
                None
            }
        }
    }

    async fn request_status(&self) {
        if self.supervisor.state() != ConnState::Connected {
            return;
        }

        let upcoming = self.upcoming_signals();
        if !upcoming.is_empty() {
            debug!(count = upcoming.len(), "Signals pending in lookahead window");
        }

        let request = Envelope::status_request(&self.config.source);
        match self.supervisor.send(&request).await {
            Ok(()) => {
                metrics::FRAMES_SENT_TOTAL
                    .with_label_values(&["STATUS_REQUEST"])
                    .inc();
            }
            Err(e) => debug!(error = %e, "Status request failed"),
        }
    }

    fn update_conn_state_metric(&self) {
        const STATES: [(ConnState, &str); 6] = [
            (ConnState::Disconnected, "disconnected"),
            (ConnState::Connecting, "connecting"),
            (ConnState::Connected, "connected"),
            (ConnState::Degraded, "degraded"),
            (ConnState::Reconnecting, "reconnecting"),
            (ConnState::Failed, "failed"),
        ];
        let current = self.supervisor.state();
        for (state, label) in STATES {
            let value = if state == current { 1.0 } else { 0.0 };
            metrics::CONN_STATE.with_label_values(&[label]).set(value);
        }
    }

    /// One dispatch cycle: drain inbound, gate on the marker, send due
    /// clock signals.
    async fn dispatch_cycle(&self) -> AppResult<()> {
        self.update_conn_state_metric();

        let disabled = self.marker.is_set();
        metrics::TRADING_DISABLED.set(i64::from(disabled));

        self.drain_inbound(disabled).await;

        if disabled {
            debug!("Trading disabled; dispatch suspended");
            return Ok(());
        }

        for signal in self.queue.take_due(Utc::now()) {
            self.send_signal(&signal, "clock").await;
        }
        Ok(())
    }

    async fn drain_inbound(&self, disabled: bool) {
        let timeout = Duration::from_millis(self.config.dispatch.receive_timeout_ms);
        loop {
            match self.supervisor.receive(timeout).await {
                Ok(Some(envelope)) => {
                    metrics::FRAMES_RECEIVED_TOTAL
                        .with_label_values(&[&envelope.kind.to_string()])
                        .inc();
                    self.handle_envelope(envelope, disabled).await;
                }
                Ok(None) => return,
                Err(e) => {
                    debug!(error = %e, "Receive unavailable");
                    return;
                }
            }
        }
    }

    async fn handle_envelope(&self, envelope: Envelope, disabled: bool) {
        match envelope.kind {
            MessageType::StatusResponse => self.handle_status_response(&envelope, disabled).await,
            MessageType::StatusRequest => {
                let payload =
                    serde_json::to_value(self.get_connection_info()).unwrap_or(serde_json::Value::Null);
                let reply = Envelope::status_response(&self.config.source, &envelope, payload);
                if let Err(e) = self.supervisor.send(&reply).await {
                    debug!(error = %e, "Status reply failed");
                }
            }
            MessageType::Signal => {
                debug!(id = %envelope.id, "Ignoring inbound SIGNAL envelope");
            }
            // Heartbeats are consumed inside the supervisor.
            MessageType::Heartbeat => {}
        }
    }

    async fn handle_status_response(&self, envelope: &Envelope, disabled: bool) {
        if envelope.payload.is_null() {
            return;
        }
        let payload: StatusPayload = match serde_json::from_value(envelope.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Malformed STATUS_RESPONSE payload");
                return;
            }
        };

        if let Some(account) = payload.account {
            let snapshot = RiskSnapshot::new(
                account.balance,
                account.equity,
                account.drawdown_pct,
                account.daily_pnl,
                account.open_positions,
            );
            if let Err(e) = self.export_metrics(&snapshot) {
                warn!(error = %e, "Account metrics export failed");
            }
        }

        if disabled || payload.prices.is_empty() {
            return;
        }

        let prices: HashMap<String, Price> = payload
            .prices
            .into_iter()
            .map(|(symbol, price)| (symbol, Price::new(price)))
            .collect();
        for signal in self.queue.evaluate_price_triggers(&prices) {
            self.send_signal(&signal, "price").await;
        }
    }

    /// Re-export account metrics to the JSON file the governor polls.
    /// Written atomically so the governor never reads a torn sample.
    fn export_metrics(&self, snapshot: &RiskSnapshot) -> AppResult<()> {
        let path = std::path::Path::new(&self.config.risk.metrics_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    async fn send_signal(&self, signal: &Signal, trigger: &str) {
        let payload = match serde_json::to_value(signal) {
            Ok(v) => v,
            Err(e) => {
                warn!(signal_id = %signal.signal_id, error = %e, "Signal serialization failed");
                return;
            }
        };

        let envelope = Envelope::signal(&self.config.source, payload);
        match self.supervisor.send(&envelope).await {
            Ok(()) => {
                metrics::FRAMES_SENT_TOTAL.with_label_values(&["SIGNAL"]).inc();
                metrics::SIGNALS_DISPATCHED_TOTAL
                    .with_label_values(&[trigger])
                    .inc();
                info!(
                    signal_id = %signal.signal_id,
                    symbol = %signal.symbol,
                    trigger,
                    "Signal dispatched"
                );
            }
            Err(e) => {
                warn!(signal_id = %signal.signal_id, error = %e, "Signal dispatch failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Direction, Priority, SignalKind, Size};
    use relay_risk::MarkerRecord;
    use rust_decimal_macros::dec;

    fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.risk.manage_governor = false;
        config.risk.marker_path = dir
            .join("trading_disabled.json")
            .to_string_lossy()
            .into_owned();
        config.risk.metrics_path = dir
            .join("account_metrics.json")
            .to_string_lossy()
            .into_owned();
        config
    }

    fn sample_signal() -> Signal {
        Signal::new(
            "EURUSD",
            SignalKind::Reentry,
            Direction::Buy,
            Size::new(dec!(0.1)),
            Priority::Normal,
            "test",
        )
    }

    #[test]
    fn test_submit_signal_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::new(test_config(dir.path())).unwrap();

        app.submit_signal(sample_signal()).unwrap();
        assert_eq!(app.queue().pending_len(), 1);
    }

    #[test]
    fn test_submit_refused_while_marker_set() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let marker = DisabledMarker::new(&config.risk.marker_path);
        marker
            .write(&MarkerRecord::new("drawdown breach", "riskd"))
            .unwrap();

        let app = Application::new(config).unwrap();
        match app.submit_signal(sample_signal()) {
            Err(AppError::TradingDisabled(reason)) => assert!(reason.contains("drawdown")),
            other => panic!("expected TradingDisabled, got {:?}", other),
        }
        assert_eq!(app.queue().pending_len(), 0);
    }

    #[test]
    fn test_connection_info_starts_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::new(test_config(dir.path())).unwrap();

        let info = app.get_connection_info();
        assert_eq!(info.state, ConnState::Disconnected);
        assert_eq!(info.attempt_count, 0);
        assert!(info.last_heartbeat_at.is_none());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.endpoint = String::new();
        assert!(Application::new(config).is_err());
    }

    #[test]
    fn test_metrics_export_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::new(test_config(dir.path())).unwrap();

        let snapshot = RiskSnapshot::new(dec!(10000), dec!(9700), dec!(3), dec!(-300), 1);
        app.export_metrics(&snapshot).unwrap();

        let content = std::fs::read_to_string(&app.config.risk.metrics_path).unwrap();
        let back: RiskSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(back, snapshot);
    }
}
