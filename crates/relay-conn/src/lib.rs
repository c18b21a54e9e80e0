//! Connection supervision for the relay trading bridge.
//!
//! Owns the TCP transport to the execution engine and runs two concurrent
//! loops against shared connection state:
//! - heartbeat loop: periodic HEARTBEAT pings, missed replies degrade the
//!   connection without tearing it down
//! - reconnect loop: fixed-interval reconnection while disconnected, with
//!   a terminal FAILED state after the attempt budget is spent

pub mod error;
pub mod heartbeat;
pub mod supervisor;

pub use error::{ConnError, ConnResult};
pub use heartbeat::HeartbeatMonitor;
pub use supervisor::{ConnState, ConnectionInfo, ConnectionSupervisor, SupervisorConfig};
