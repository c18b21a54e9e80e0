//! Account risk snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One sample of account-level risk metrics.
///
/// Produced by the account metrics provider each governor poll; not
/// persisted as an entity. `drawdown_pct` is the peak-to-current equity
/// decline as a percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Account balance.
    pub balance: Decimal,
    /// Account equity (balance plus floating PnL).
    pub equity: Decimal,
    /// Peak-to-current equity decline, percent.
    pub drawdown_pct: Decimal,
    /// Realized plus floating PnL for the current trading day.
    pub daily_pnl: Decimal,
    /// Number of open positions.
    pub open_positions: u32,
    /// When this sample was taken.
    pub sampled_at: DateTime<Utc>,
}

impl RiskSnapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(
        balance: Decimal,
        equity: Decimal,
        drawdown_pct: Decimal,
        daily_pnl: Decimal,
        open_positions: u32,
    ) -> Self {
        Self {
            balance,
            equity,
            drawdown_pct,
            daily_pnl,
            open_positions,
            sampled_at: Utc::now(),
        }
    }

    /// Age of this sample in milliseconds.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.sampled_at).num_milliseconds()
    }
}
