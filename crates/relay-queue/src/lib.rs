//! Signal priority queue for the relay trading bridge.
//!
//! Holds pending signals under a strict total order, answers
//! due/upcoming queries for the dispatch loop, evaluates price-based
//! triggers, and admits economic-calendar events through a fixed
//! currency-to-symbol mapping.

pub mod calendar;
pub mod error;
pub mod queue;

pub use calendar::{symbol_for_currency, EconomicEvent, Impact};
pub use error::{QueueError, QueueResult};
pub use queue::SignalQueue;
