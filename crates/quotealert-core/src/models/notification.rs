//! Notification message models

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Channel-agnostic classification of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// Price reached the buy threshold
    BuyAlert,
    /// Price reached the sell threshold
    SellAlert,
    /// Something went wrong while monitoring
    Error,
}

/// Content of a notification handed to a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Short summary, used as the email subject
    pub subject: String,

    /// Full plain-text body
    pub body: String,

    /// Classification for channel-specific formatting
    pub category: NotificationCategory,
}

impl NotificationMessage {
    /// Create a message
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        category: NotificationCategory,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            category,
        }
    }

    /// Buy alert for a price at or below the buy threshold
    pub fn buy_alert(ticker: &str, price: Decimal, threshold: Decimal, at: DateTime<Utc>) -> Self {
        let body = format!(
            "The stock {ticker} has reached a buy price!\n\n\
             Current Price: {}\n\
             Your Buy Threshold: {}\n\
             Time: {} UTC\n\n\
             Consider buying this stock.",
            money(price),
            money(threshold),
            at.format(TIME_FORMAT),
        );

        Self::new(format!("BUY ALERT: {ticker}"), body, NotificationCategory::BuyAlert)
    }

    /// Sell alert for a price at or above the sell threshold
    pub fn sell_alert(ticker: &str, price: Decimal, threshold: Decimal, at: DateTime<Utc>) -> Self {
        let body = format!(
            "The stock {ticker} has reached a sell price!\n\n\
             Current Price: {}\n\
             Your Sell Threshold: {}\n\
             Time: {} UTC\n\n\
             Consider selling this stock.",
            money(price),
            money(threshold),
            at.format(TIME_FORMAT),
        );

        Self::new(format!("SELL ALERT: {ticker}"), body, NotificationCategory::SellAlert)
    }

    /// Report of a failed price check
    pub fn check_failed(ticker: &str, error: &str, at: DateTime<Utc>) -> Self {
        let body = format!(
            "Failed to check the price of {ticker}.\n\n\
             Error: {error}\n\
             Time: {} UTC\n\n\
             Monitoring continues on the next tick.",
            at.format(TIME_FORMAT),
        );

        Self::new(
            format!("PRICE CHECK FAILED: {ticker}"),
            body,
            NotificationCategory::Error,
        )
    }
}

/// Render a price with two decimal places
pub fn money(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}
