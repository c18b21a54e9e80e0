//! Application configuration.

use crate::error::{AppError, AppResult};
use relay_conn::SupervisorConfig;
use relay_risk::GovernorConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Connection configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSection {
    /// Reconnect attempts before the terminal FAILED state.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Reconnect loop period (ms).
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Heartbeat loop period (ms).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Heartbeat reply deadline (ms).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Handshake round-trip deadline (ms).
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// TCP connect deadline (ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_retry_interval_ms() -> u64 {
    5000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_handshake_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Dispatch loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Dispatch cycle period (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-cycle receive timeout while draining inbound frames (ms).
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// Window used for upcoming-signal queries (s).
    #[serde(default = "default_upcoming_window_secs")]
    pub upcoming_window_secs: u64,
    /// STATUS_REQUEST cadence (ms).
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_receive_timeout_ms() -> u64 {
    100
}

fn default_upcoming_window_secs() -> u64 {
    300
}

fn default_status_interval_ms() -> u64 {
    5000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
            upcoming_window_secs: default_upcoming_window_secs(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

/// Risk governor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSection {
    /// Governor poll period (ms).
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Maximum tolerated drawdown, percent.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    /// Daily loss limit (positive; breach when pnl < -limit).
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: Decimal,
    /// CPU warning threshold, percent.
    #[serde(default = "default_cpu_warn_pct")]
    pub cpu_warn_pct: f32,
    /// Memory warning threshold, percent.
    #[serde(default = "default_memory_warn_pct")]
    pub memory_warn_pct: f32,
    /// Trading-disabled marker path.
    #[serde(default = "default_marker_path")]
    pub marker_path: String,
    /// Account-metrics JSON export path.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    /// Directory of auxiliary-worker pid files.
    #[serde(default = "default_worker_pid_dir")]
    pub worker_pid_dir: String,
    /// Bounded wait before the governor is force-killed on stop (ms).
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Path of the riskd binary.
    #[serde(default = "default_riskd_path")]
    pub riskd_path: String,
    /// Whether the main process spawns and supervises riskd.
    #[serde(default = "default_manage_governor")]
    pub manage_governor: bool,
}

fn default_check_interval_ms() -> u64 {
    1000
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::from(10)
}

fn default_daily_loss_limit() -> Decimal {
    Decimal::from(500)
}

fn default_cpu_warn_pct() -> f32 {
    90.0
}

fn default_memory_warn_pct() -> f32 {
    90.0
}

fn default_marker_path() -> String {
    "data/trading_disabled.json".to_string()
}

fn default_metrics_path() -> String {
    "data/account_metrics.json".to_string()
}

fn default_worker_pid_dir() -> String {
    "data/pids".to_string()
}

fn default_stop_grace_ms() -> u64 {
    5000
}

fn default_riskd_path() -> String {
    "riskd".to_string()
}

fn default_manage_governor() -> bool {
    true
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            max_drawdown_pct: default_max_drawdown_pct(),
            daily_loss_limit: default_daily_loss_limit(),
            cpu_warn_pct: default_cpu_warn_pct(),
            memory_warn_pct: default_memory_warn_pct(),
            marker_path: default_marker_path(),
            metrics_path: default_metrics_path(),
            worker_pid_dir: default_worker_pid_dir(),
            stop_grace_ms: default_stop_grace_ms(),
            riskd_path: default_riskd_path(),
            manage_governor: default_manage_governor(),
        }
    }
}

impl From<&RiskSection> for GovernorConfig {
    fn from(cfg: &RiskSection) -> Self {
        Self {
            check_interval_ms: cfg.check_interval_ms,
            max_drawdown_pct: cfg.max_drawdown_pct,
            daily_loss_limit: cfg.daily_loss_limit,
            cpu_warn_pct: cfg.cpu_warn_pct,
            memory_warn_pct: cfg.memory_warn_pct,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Execution engine endpoint, `host:port`.
    pub endpoint: String,
    /// Source tag stamped on outgoing envelopes.
    #[serde(default = "default_source")]
    pub source: String,
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionSection,
    /// Dispatch loop configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Risk governor configuration.
    #[serde(default)]
    pub risk: RiskSection,
}

fn default_source() -> String {
    "relay-bridge".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:9100".to_string(),
            source: default_source(),
            connection: ConnectionSection::default(),
            dispatch: DispatchConfig::default(),
            risk: RiskSection::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid startup parameters immediately.
    pub fn validate(&self) -> AppResult<()> {
        if self.endpoint.is_empty() || !self.endpoint.contains(':') {
            return Err(AppError::Config(format!(
                "endpoint must be host:port, got {:?}",
                self.endpoint
            )));
        }
        if self.source.is_empty() {
            return Err(AppError::Config("source must not be empty".to_string()));
        }

        let intervals = [
            ("connection.retry_interval_ms", self.connection.retry_interval_ms),
            (
                "connection.heartbeat_interval_ms",
                self.connection.heartbeat_interval_ms,
            ),
            (
                "connection.heartbeat_timeout_ms",
                self.connection.heartbeat_timeout_ms,
            ),
            (
                "connection.handshake_timeout_ms",
                self.connection.handshake_timeout_ms,
            ),
            ("connection.connect_timeout_ms", self.connection.connect_timeout_ms),
            ("dispatch.poll_interval_ms", self.dispatch.poll_interval_ms),
            ("dispatch.receive_timeout_ms", self.dispatch.receive_timeout_ms),
            ("dispatch.status_interval_ms", self.dispatch.status_interval_ms),
            ("risk.check_interval_ms", self.risk.check_interval_ms),
            ("risk.stop_grace_ms", self.risk.stop_grace_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(AppError::Config(format!("{name} must be positive")));
            }
        }

        if self.connection.max_reconnect_attempts == 0 {
            return Err(AppError::Config(
                "connection.max_reconnect_attempts must be positive".to_string(),
            ));
        }
        if self.risk.max_drawdown_pct <= Decimal::ZERO {
            return Err(AppError::Config(
                "risk.max_drawdown_pct must be positive".to_string(),
            ));
        }
        if self.risk.daily_loss_limit <= Decimal::ZERO {
            return Err(AppError::Config(
                "risk.daily_loss_limit must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the supervisor configuration.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            endpoint: self.endpoint.clone(),
            max_reconnect_attempts: self.connection.max_reconnect_attempts,
            retry_interval_ms: self.connection.retry_interval_ms,
            heartbeat_interval_ms: self.connection.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.connection.heartbeat_timeout_ms,
            handshake_timeout_ms: self.connection.handshake_timeout_ms,
            connect_timeout_ms: self.connection.connect_timeout_ms,
            source: self.source.clone(),
        }
    }
}
