//! Error types for QuoteAlert

use thiserror::Error;

use crate::alerting::NotificationError;
use crate::quotes::FetchError;

/// Result type alias using QuoteAlert's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for QuoteAlert operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The monitor's polling loop is already running
    #[error("Monitor is already running")]
    AlreadyRunning,

    /// The monitor was stopped and cannot be started again
    #[error("Monitor has been stopped; create a new monitor to poll again")]
    Stopped,

    /// Quote provider error
    #[error("Price fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Notification delivery error
    #[error("Notification failed: {0}")]
    Notify(#[from] NotificationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
