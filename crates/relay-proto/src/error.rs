//! Protocol error types.

use thiserror::Error;

/// Violations of the frame format itself.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer closed connection mid-frame")]
    PeerClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Either failure mode of a frame read.
///
/// Decode distinguishes the two so the supervisor can keep a connection
/// alive through a malformed frame but tear it down on transport loss.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(ProtocolError::Json(e))
    }
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(ConnectionError::Io(e))
    }
}
