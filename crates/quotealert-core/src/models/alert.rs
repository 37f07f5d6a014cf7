//! Alert data models

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Quote;

/// Discriminant of an [`AlertEvent`], used as the dispatcher registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Price at or below the buy threshold
    BelowThreshold,
    /// Price at or above the sell threshold
    AboveThreshold,
    /// The price could not be fetched
    CheckFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BelowThreshold => "below_threshold",
            Self::AboveThreshold => "above_threshold",
            Self::CheckFailed => "check_failed",
        };
        f.write_str(name)
    }
}

/// An event produced by the monitor on each poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    /// The observed price crossed the buy threshold
    BelowThreshold {
        /// Monitored ticker
        ticker: String,
        /// Observed price
        price: Decimal,
        /// Buy threshold that was reached
        threshold: Decimal,
        /// When the quote was evaluated
        at: DateTime<Utc>,
    },
    /// The observed price crossed the sell threshold
    AboveThreshold {
        /// Monitored ticker
        ticker: String,
        /// Observed price
        price: Decimal,
        /// Sell threshold that was reached
        threshold: Decimal,
        /// When the quote was evaluated
        at: DateTime<Utc>,
    },
    /// Fetching the price failed
    CheckFailed {
        /// Monitored ticker
        ticker: String,
        /// Rendered fetch error
        error: String,
        /// When the failure was observed
        at: DateTime<Utc>,
    },
}

impl AlertEvent {
    /// The event's kind
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BelowThreshold { .. } => EventKind::BelowThreshold,
            Self::AboveThreshold { .. } => EventKind::AboveThreshold,
            Self::CheckFailed { .. } => EventKind::CheckFailed,
        }
    }

    /// Ticker the event refers to
    pub fn ticker(&self) -> &str {
        match self {
            Self::BelowThreshold { ticker, .. }
            | Self::AboveThreshold { ticker, .. }
            | Self::CheckFailed { ticker, .. } => ticker,
        }
    }

    /// When the event happened
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::BelowThreshold { at, .. }
            | Self::AboveThreshold { at, .. }
            | Self::CheckFailed { at, .. } => *at,
        }
    }

    /// Build a check-failed event stamped now
    pub fn check_failed(ticker: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::CheckFailed {
            ticker: ticker.into(),
            error: error.to_string(),
            at: Utc::now(),
        }
    }
}

/// Thresholds and cadence for a single monitored ticker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Ticker to poll
    pub ticker: String,

    /// Alert to buy when the price is at or below this value
    pub buy_price: Decimal,

    /// Alert to sell when the price is at or above this value
    pub sell_price: Decimal,

    /// Delay between the end of one tick and the start of the next
    pub polling_interval: Duration,

    /// Also email failed price checks instead of only logging them
    pub notify_on_error: bool,
}

impl MonitorConfig {
    /// Create a config that only notifies on threshold crossings
    pub fn new(
        ticker: impl Into<String>,
        buy_price: Decimal,
        sell_price: Decimal,
        polling_interval: Duration,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            buy_price,
            sell_price,
            polling_interval,
            notify_on_error: false,
        }
    }

    /// Reject settings the polling loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ticker.trim().is_empty() {
            return Err(Error::validation("ticker must not be blank"));
        }
        if self.polling_interval.is_zero() {
            return Err(Error::validation("polling interval must be greater than zero"));
        }
        Ok(())
    }

    /// Events triggered by a quote, buy check first.
    ///
    /// Both checks are independent, so a single quote can produce both events
    /// when the thresholds overlap. Events are stamped with the evaluation
    /// time; the quote's own market time may be stale outside trading hours.
    pub fn evaluate(&self, quote: &Quote) -> Vec<AlertEvent> {
        let mut events = Vec::with_capacity(2);
        let at = Utc::now();

        if quote.price <= self.buy_price {
            events.push(AlertEvent::BelowThreshold {
                ticker: self.ticker.clone(),
                price: quote.price,
                threshold: self.buy_price,
                at,
            });
        }

        if quote.price >= self.sell_price {
            events.push(AlertEvent::AboveThreshold {
                ticker: self.ticker.clone(),
                price: quote.price,
                threshold: self.sell_price,
                at,
            });
        }

        events
    }
}
