//! Risk governor daemon.
//!
//! Runs in its own process so a hang or crash in the bridge cannot
//! prevent risk evaluation. Exits cooperatively on SIGTERM/Ctrl-C at the
//! next loop-iteration boundary.

use anyhow::Result;
use clap::Parser;
use relay_risk::{
    DisabledMarker, FileMetricsProvider, GovernorConfig, LogAlertDispatcher, RiskGovernor,
    WireTradingBridge, WorkerReaper,
};
use std::sync::Arc;
use tracing::info;

/// Relay risk governor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via RELAY_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    relay_telemetry::init_logging()?;

    info!("Starting risk governor v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("RELAY_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = relay_app::AppConfig::from_file(&config_path)?;

    let governor = RiskGovernor::new(
        GovernorConfig::from(&config.risk),
        DisabledMarker::new(&config.risk.marker_path),
        Arc::new(FileMetricsProvider::new(&config.risk.metrics_path)),
        Arc::new(WireTradingBridge::new(
            &config.endpoint,
            "riskd",
            config.connection.connect_timeout_ms,
        )),
        Arc::new(LogAlertDispatcher),
        WorkerReaper::new(&config.risk.worker_pid_dir),
    );

    let token = governor.cancellation_token();
    tokio::spawn(async move {
        wait_for_stop_signal().await;
        info!("Stop signal received; governor exiting after current iteration");
        token.cancel();
    });

    governor.run().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
