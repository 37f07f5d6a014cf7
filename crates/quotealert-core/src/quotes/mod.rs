//! Price sources
//!
//! The monitor only depends on the [`PriceSource`] trait; [`BrapiClient`] is the
//! HTTP implementation used by the binary.

mod brapi;

pub use brapi::{BrapiClient, BrapiConfig};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::Quote;

/// Fetches the current price of a ticker
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the latest quote for `ticker`.
    ///
    /// Implementations should give up early once `cancel` fires.
    async fn fetch_price(&self, ticker: &str, cancel: &CancellationToken)
        -> Result<Quote, FetchError>;
}

/// Price fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success HTTP status
    #[error("Quote service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Body could not be turned into a quote
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Gave up because the monitor is stopping
    #[error("Fetch cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}
