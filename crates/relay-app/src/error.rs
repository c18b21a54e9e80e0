//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid startup parameters. Fatal, reported immediately.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The trading-disabled marker is set; new signals are refused.
    #[error("trading disabled: {0}")]
    TradingDisabled(String),

    #[error(transparent)]
    Conn(#[from] relay_conn::ConnError),

    #[error(transparent)]
    Queue(#[from] relay_queue::QueueError),

    #[error(transparent)]
    Risk(#[from] relay_risk::RiskError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;
