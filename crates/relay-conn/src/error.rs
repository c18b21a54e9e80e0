//! Connection supervisor error types.

use crate::supervisor::ConnState;
use relay_proto::{ConnectionError, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("not connected (state: {0})")]
    NotConnected(ConnState),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    #[error("supervisor is FAILED; explicit reset required")]
    Failed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl From<relay_proto::FrameError> for ConnError {
    fn from(e: relay_proto::FrameError) -> Self {
        match e {
            relay_proto::FrameError::Protocol(p) => Self::Protocol(p),
            relay_proto::FrameError::Connection(c) => Self::Connection(c),
        }
    }
}

pub type ConnResult<T> = Result<T, ConnError>;
