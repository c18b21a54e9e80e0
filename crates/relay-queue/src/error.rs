//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("duplicate signal id: {0}")]
    DuplicateSignal(String),

    #[error("no symbol mapping for currency: {0}")]
    UnknownCurrency(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
