//! Risk governor for the relay trading bridge.
//!
//! Runs in its own OS process (`riskd`) so a hang or crash in signal
//! dispatch cannot prevent risk evaluation. Polls account metrics against
//! hard limits and, on breach, executes the emergency shutdown sequence
//! exactly once per breach episode. The only state shared with the main
//! process is the durable trading-disabled marker file.

pub mod alert;
pub mod bridge;
pub mod error;
pub mod governor;
pub mod latch;
pub mod marker;
pub mod metrics_provider;
pub mod process;
pub mod resource;
pub mod shutdown;
pub mod workers;

pub use alert::{AlertDispatcher, AlertSeverity, LogAlertDispatcher, MockAlertDispatcher};
pub use bridge::{MockTradingBridge, TradingBridge, WireTradingBridge};
pub use error::{RiskError, RiskResult};
pub use governor::{GovernorConfig, RiskGovernor};
pub use latch::{BreachReason, ShutdownLatch};
pub use marker::{DisabledMarker, MarkerRecord};
pub use metrics_provider::{FileMetricsProvider, MetricsProvider, MockMetricsProvider};
pub use process::GovernorProcess;
pub use resource::{ResourceMonitor, ResourceUsage};
pub use shutdown::{ShutdownReport, StepOutcome};
pub use workers::WorkerReaper;

use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
