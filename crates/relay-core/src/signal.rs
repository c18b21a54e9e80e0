//! Trading signal types.

use crate::{Price, Size};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Signal category. Determines how the signal is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Fires at a scheduled calendar-event time.
    Economic,
    /// Fires when the market crosses a price threshold.
    Price,
    /// Re-entry after a previous position was closed.
    Reentry,
    /// Instruction to close existing exposure.
    Close,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Economic => write!(f, "economic"),
            Self::Price => write!(f, "price"),
            Self::Reentry => write!(f, "reentry"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
    Close,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::Neutral => write!(f, "neutral"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Ordinal importance of a signal. Lower rank dispatches first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank used as the primary queue ordering key.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Low => 4,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Urgent => write!(f, "urgent"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// A pending trading instruction.
///
/// Owned by the signal queue until fired or expired, then moved to the
/// executed archive. A signal is either clock-driven (`execution_time`)
/// or price-driven (`price_threshold`), never both at once in practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal ID.
    pub signal_id: String,
    /// Instrument symbol (e.g. "EURUSD").
    pub symbol: String,
    /// Signal category.
    pub kind: SignalKind,
    /// Trade direction.
    pub direction: Direction,
    /// Order size in lots.
    pub size: Size,
    /// Dispatch priority.
    pub priority: Priority,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Absolute time at which a clock-driven signal becomes due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<DateTime<Utc>>,
    /// Trigger price for price-driven signals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_threshold: Option<Price>,
    /// Producer confidence, 0.0-1.0.
    pub confidence: Decimal,
    /// Producer identifier.
    pub source: String,
    /// Free-form metadata carried through to the execution engine.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Signal {
    /// Create a new signal with a generated ID and the current timestamp.
    pub fn new(
        symbol: impl Into<String>,
        kind: SignalKind,
        direction: Direction,
        size: Size,
        priority: Priority,
        source: impl Into<String>,
    ) -> Self {
        Self {
            signal_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            kind,
            direction,
            size,
            priority,
            created_at: Utc::now(),
            execution_time: None,
            price_threshold: None,
            confidence: Decimal::ONE,
            source: source.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the absolute execution time (clock-driven signals).
    #[must_use]
    pub fn at(mut self, execution_time: DateTime<Utc>) -> Self {
        self.execution_time = Some(execution_time);
        self
    }

    /// Set the trigger threshold (price-driven signals).
    #[must_use]
    pub fn with_threshold(mut self, threshold: Price) -> Self {
        self.price_threshold = Some(threshold);
        self
    }

    /// Set producer confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence;
        self
    }

    /// Attach free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this signal's trigger is price-driven rather than clock-driven.
    #[must_use]
    pub fn is_price_driven(&self) -> bool {
        self.kind == SignalKind::Price
    }
}
