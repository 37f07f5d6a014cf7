//! Quote data model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price observation for a ticker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol as requested (e.g. "PETR4")
    pub ticker: String,

    /// Last traded market price
    pub price: Decimal,

    /// When the price was observed
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    /// Create a quote observed now
    pub fn new(ticker: impl Into<String>, price: Decimal) -> Self {
        Self::observed(ticker, price, Utc::now())
    }

    /// Create a quote with an explicit observation time
    pub fn observed(ticker: impl Into<String>, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            observed_at,
        }
    }
}
