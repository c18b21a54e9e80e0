//! Risk governor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("trading bridge command failed: {0}")]
    BridgeFailed(String),

    #[error("alert dispatch failed: {0}")]
    AlertFailed(String),

    #[error("governor process error: {0}")]
    Process(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RiskResult<T> = Result<T, RiskError>;
