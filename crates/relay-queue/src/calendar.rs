//! Economic calendar events and the currency-to-symbol mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Expected market impact of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One economic-calendar record as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    /// Scheduled release time.
    pub time: DateTime<Utc>,
    /// ISO currency code (e.g. "USD").
    pub currency: String,
    /// Event name (e.g. "Non-Farm Payrolls").
    pub name: String,
    /// Expected impact.
    pub impact: Impact,
}

/// Fixed currency-to-symbol mapping for calendar admission.
///
/// The traded symbol for an event is looked up here and nowhere else;
/// it is never inferred from the event text. Each currency maps to the
/// most liquid USD pair it participates in.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("USD", "EURUSD"),
    ("EUR", "EURUSD"),
    ("GBP", "GBPUSD"),
    ("JPY", "USDJPY"),
    ("CHF", "USDCHF"),
    ("CAD", "USDCAD"),
    ("AUD", "AUDUSD"),
    ("NZD", "NZDUSD"),
];

/// Look up the traded symbol for a currency code. Case-insensitive,
/// exact-match only.
#[must_use]
pub fn symbol_for_currency(currency: &str) -> Option<&'static str> {
    let upper = currency.to_ascii_uppercase();
    CURRENCY_SYMBOLS
        .iter()
        .find(|(code, _)| *code == upper)
        .map(|(_, symbol)| *symbol)
}
