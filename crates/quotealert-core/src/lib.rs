//! # QuoteAlert
//!
//! Stock quote polling with buy/sell threshold alerts.
//!
//! QuoteAlert polls a quote API on a fixed interval, compares the price with
//! configured buy and sell thresholds and emails an alert when either is
//! crossed.
//!
//! ## Architecture
//!
//! - **Quotes**: [`quotes::PriceSource`] and the BRAPI HTTP client
//! - **Monitor**: the polling loop that turns quotes into [`models::AlertEvent`]s
//! - **Dispatcher**: in-process publish/subscribe fanning events out to handlers
//! - **Notifier**: [`alerting::NotificationSink`] and the SMTP implementation
//!
//! ## Quick Start
//!
//! ```bash
//! # Buy below 30.00, sell above 40.00
//! quotealert PETR4 40.00 30.00 --config config.json
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod error;
pub mod models;
pub mod quotes;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertMonitor, EventDispatcher, NotificationSink, SmtpNotifier};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::quotes::{BrapiClient, PriceSource};
}
