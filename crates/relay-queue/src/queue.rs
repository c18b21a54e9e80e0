//! Signal priority queue.
//!
//! Pending signals are held in a strict total order: priority rank
//! ascending, then `created_at`, then insertion sequence, so exact ties
//! dequeue deterministically. A fired or dispatched signal moves to the
//! executed archive exactly once; the two sets never share an id.

use crate::calendar::EconomicEvent;
use crate::error::{QueueError, QueueResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use relay_core::{Direction, Price, Signal, SignalKind};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

/// Total-order key for pending signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: u8,
    created_at: DateTime<Utc>,
    seq: u64,
}

struct Inner {
    pending: BTreeMap<QueueKey, Signal>,
    /// Key lookup by signal id, for removal and duplicate detection.
    by_id: HashMap<String, QueueKey>,
    executed: Vec<Signal>,
    next_seq: u64,
}

/// Priority queue of pending trading signals.
///
/// All operations are non-blocking; safe for concurrent producers and a
/// single periodic consumer.
pub struct SignalQueue {
    inner: Mutex<Inner>,
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: BTreeMap::new(),
                by_id: HashMap::new(),
                executed: Vec::new(),
                next_seq: 0,
            }),
        }
    }

    /// Insert a signal under the strict total order.
    ///
    /// A `signal_id` already present in the pending set or the executed
    /// archive is rejected; producers never silently overwrite a live
    /// signal.
    pub fn add(&self, signal: Signal) -> QueueResult<()> {
        let mut inner = self.inner.lock();

        if inner.by_id.contains_key(&signal.signal_id)
            || inner.executed.iter().any(|s| s.signal_id == signal.signal_id)
        {
            return Err(QueueError::DuplicateSignal(signal.signal_id));
        }

        let key = QueueKey {
            rank: signal.priority.rank(),
            created_at: signal.created_at,
            seq: inner.next_seq,
        };
        inner.next_seq += 1;

        debug!(
            signal_id = %signal.signal_id,
            symbol = %signal.symbol,
            priority = %signal.priority,
            "Signal enqueued"
        );
        inner.by_id.insert(signal.signal_id.clone(), key);
        inner.pending.insert(key, signal);
        Ok(())
    }

    /// Number of pending signals.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Snapshot of the pending set in dequeue order.
    pub fn pending(&self) -> Vec<Signal> {
        self.inner.lock().pending.values().cloned().collect()
    }

    /// Snapshot of the executed archive in execution order.
    pub fn executed(&self) -> Vec<Signal> {
        self.inner.lock().executed.clone()
    }

    /// Pending signals due inside `[now, now + window]`, plus every
    /// pending price-driven signal unconditionally (their trigger is
    /// data-driven, not clock-driven). Priority order; non-consuming.
    pub fn get_upcoming(&self, window: Duration) -> Vec<Signal> {
        let now = Utc::now();
        let horizon = now + ChronoDuration::from_std(window).unwrap_or(ChronoDuration::zero());

        self.inner
            .lock()
            .pending
            .values()
            .filter(|signal| {
                if signal.is_price_driven() {
                    return true;
                }
                signal
                    .execution_time
                    .is_some_and(|t| t >= now && t <= horizon)
            })
            .cloned()
            .collect()
    }

    /// Pull clock-driven signals whose `execution_time` has passed,
    /// moving them to the executed archive. Priority order.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Signal> {
        let mut inner = self.inner.lock();

        let due_keys: Vec<QueueKey> = inner
            .pending
            .iter()
            .filter(|(_, signal)| {
                !signal.is_price_driven() && signal.execution_time.is_some_and(|t| t <= now)
            })
            .map(|(key, _)| *key)
            .collect();

        let mut due = Vec::with_capacity(due_keys.len());
        for key in due_keys {
            if let Some(signal) = inner.pending.remove(&key) {
                inner.by_id.remove(&signal.signal_id);
                due.push(signal.clone());
                inner.executed.push(signal);
            }
        }
        due
    }

    /// Evaluate price triggers against the latest prices.
    ///
    /// A buy fires when the price is at or below the threshold, a sell
    /// when at or above. Fired signals move to the executed archive
    /// exactly once and are returned; symbols absent from `prices` are
    /// skipped without error.
    pub fn evaluate_price_triggers(&self, prices: &HashMap<String, Price>) -> Vec<Signal> {
        let mut inner = self.inner.lock();

        let fired_keys: Vec<QueueKey> = inner
            .pending
            .iter()
            .filter(|(_, signal)| {
                if !signal.is_price_driven() {
                    return false;
                }
                let Some(threshold) = signal.price_threshold else {
                    return false;
                };
                let Some(&current) = prices.get(&signal.symbol) else {
                    return false;
                };
                match signal.direction {
                    Direction::Buy => current <= threshold,
                    Direction::Sell => current >= threshold,
                    Direction::Neutral | Direction::Close => false,
                }
            })
            .map(|(key, _)| *key)
            .collect();

        let mut fired = Vec::with_capacity(fired_keys.len());
        for key in fired_keys {
            if let Some(signal) = inner.pending.remove(&key) {
                info!(
                    signal_id = %signal.signal_id,
                    symbol = %signal.symbol,
                    direction = %signal.direction,
                    "Price trigger fired"
                );
                inner.by_id.remove(&signal.signal_id);
                fired.push(signal.clone());
                inner.executed.push(signal);
            }
        }
        fired
    }

    /// Move one pending signal to the executed archive by id.
    /// Returns whether the signal was pending.
    pub fn mark_executed(&self, signal_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(key) = inner.by_id.remove(signal_id) else {
            return false;
        };
        if let Some(signal) = inner.pending.remove(&key) {
            inner.executed.push(signal);
            true
        } else {
            false
        }
    }

    /// Admit an economic-calendar event as an urgent clock-driven signal.
    ///
    /// The symbol comes from the fixed currency mapping; an unmapped
    /// currency is rejected. Returns the new signal id.
    pub fn admit_economic_event(&self, event: &EconomicEvent) -> QueueResult<String> {
        let symbol = crate::calendar::symbol_for_currency(&event.currency)
            .ok_or_else(|| QueueError::UnknownCurrency(event.currency.clone()))?;

        let signal = Signal::new(
            symbol,
            SignalKind::Economic,
            Direction::Neutral,
            relay_core::Size::ZERO,
            relay_core::Priority::Urgent,
            "economic-calendar",
        )
        .at(event.time)
        .with_metadata(serde_json::json!({
            "event": event.name,
            "currency": event.currency,
            "impact": event.impact.to_string(),
        }));

        let signal_id = signal.signal_id.clone();
        self.add(signal)?;
        info!(signal_id = %signal_id, event = %event.name, "Calendar event admitted");
        Ok(signal_id)
    }
}
