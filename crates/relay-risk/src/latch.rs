//! Breach latch for emergency stop.
//!
//! Once triggered, remains triggered until manually reset, so the
//! emergency shutdown sequence runs exactly once per breach episode.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// Why the latch fired.
#[derive(Debug, Clone, PartialEq)]
pub enum BreachReason {
    /// Drawdown exceeded the configured maximum.
    DrawdownExceeded {
        drawdown_pct: Decimal,
        limit_pct: Decimal,
    },
    /// Daily PnL fell below the negative loss limit.
    DailyLossExceeded { daily_pnl: Decimal, limit: Decimal },
    /// Manual trigger by operator.
    Manual { message: String },
}

impl std::fmt::Display for BreachReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DrawdownExceeded {
                drawdown_pct,
                limit_pct,
            } => write!(f, "drawdown {}% exceeds limit {}%", drawdown_pct, limit_pct),
            Self::DailyLossExceeded { daily_pnl, limit } => {
                write!(f, "daily PnL {} breaches loss limit {}", daily_pnl, limit)
            }
            Self::Manual { message } => write!(f, "manual: {}", message),
        }
    }
}

/// Emergency stop latch.
///
/// Thread-safe; share via `Arc<ShutdownLatch>`.
pub struct ShutdownLatch {
    /// Triggered flag (true = shutdown sequence has run or is running).
    triggered: AtomicBool,
    /// Unix milliseconds of the trigger, 0 if not triggered.
    triggered_at: AtomicU64,
    /// Reason for the trigger.
    reason: RwLock<Option<BreachReason>>,
}

impl Default for ShutdownLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownLatch {
    /// Create a new latch in the non-triggered state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            triggered_at: AtomicU64::new(0),
            reason: RwLock::new(None),
        }
    }

    /// Check if the latch is currently triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Trigger the latch.
    ///
    /// Returns `true` only for the call that actually latched; a breach
    /// while already latched keeps the original reason and returns
    /// `false`.
    pub fn trigger(&self, reason: BreachReason) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            self.triggered_at.store(now, Ordering::SeqCst);

            {
                let mut guard = self.reason.write();
                *guard = Some(reason.clone());
            }

            error!(reason = %reason, "EMERGENCY STOP TRIGGERED");
            true
        } else {
            warn!(new_reason = %reason, "Latch already triggered, ignoring new trigger");
            false
        }
    }

    /// Unix milliseconds of the trigger, if triggered.
    #[must_use]
    pub fn triggered_at(&self) -> Option<u64> {
        if self.is_triggered() {
            let ts = self.triggered_at.load(Ordering::SeqCst);
            if ts > 0 {
                return Some(ts);
            }
        }
        None
    }

    /// Reason for the trigger, if triggered.
    #[must_use]
    pub fn reason(&self) -> Option<BreachReason> {
        if self.is_triggered() {
            self.reason.read().clone()
        } else {
            None
        }
    }

    /// Reset the latch.
    ///
    /// Manual operation for operators, after the condition that caused
    /// the trigger has been investigated and resolved. Auto-reset is
    /// prohibited.
    pub fn reset(&self) {
        if self.is_triggered() {
            let reason = self.reason.read().clone();
            info!(previous_reason = ?reason, "Shutdown latch manually reset");

            self.triggered.store(false, Ordering::SeqCst);
            self.triggered_at.store(0, Ordering::SeqCst);
            {
                let mut guard = self.reason.write();
                *guard = None;
            }
        }
    }
}
