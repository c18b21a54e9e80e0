//! Core domain types for the relay trading bridge.
//!
//! This crate provides fundamental types used throughout the bridge:
//! - `Price`, `Size`: precision-safe numeric types
//! - `Signal`: a pending trading instruction with priority and trigger data
//! - `RiskSnapshot`: one account-metrics sample consumed by the risk governor

pub mod decimal;
pub mod error;
pub mod signal;
pub mod snapshot;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use signal::{Direction, Priority, Signal, SignalKind};
pub use snapshot::RiskSnapshot;
