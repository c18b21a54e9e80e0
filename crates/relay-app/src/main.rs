//! Relay trading bridge - entry point.
//!
//! Frames and exchanges messages with the execution engine, queues and
//! prioritizes trading signals, and supervises the isolated risk
//! governor process.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// Relay trading bridge
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

    info!("Starting relay bridge v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("RELAY_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = relay_app::AppConfig::from_file(&config_path)?;

    let app = Arc::new(relay_app::Application::new(config)?.with_config_path(&config_path));
    app.run().await?;

    Ok(())
}
