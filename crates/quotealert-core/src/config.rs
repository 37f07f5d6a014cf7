//! Configuration management for QuoteAlert
//!
//! The configuration file is JSON. Property names are matched without regard
//! to case or `_`/`-` separators, so `smtpHost`, `SmtpHost` and `smtp_host` are
//! equivalent. Email settings may also be given flat at the top level.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Keys that belong to the email section when it is written flat
const EMAIL_KEYS: &[&str] = &[
    "smtphost",
    "smtpport",
    "usessl",
    "username",
    "password",
    "fromemail",
    "toemail",
];

/// Main configuration struct
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Email delivery configuration
    pub email: EmailConfig,

    /// Quote provider configuration
    pub provider: ProviderConfig,

    /// Alerting configuration
    pub alerts: AlertingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// SMTP settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP server host
    #[serde(rename = "smtphost")]
    pub smtp_host: String,
    /// SMTP server port
    #[serde(rename = "smtpport")]
    pub smtp_port: u16,
    /// Use TLS from the start of the connection instead of STARTTLS
    #[serde(rename = "usessl")]
    pub use_ssl: bool,
    /// Login name; authentication is skipped when absent or blank
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Sender address
    #[serde(rename = "fromemail")]
    pub from_email: String,
    /// Recipient address
    #[serde(rename = "toemail")]
    pub to_email: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            use_ssl: false,
            username: None,
            password: None,
            from_email: String::new(),
            to_email: String::new(),
        }
    }
}

/// Quote provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Bearer token for the quote API
    #[serde(rename = "apikey")]
    pub api_key: Option<String>,
    /// Service root URL
    #[serde(rename = "baseurl")]
    pub base_url: String,
    /// Per-request timeout
    #[serde(rename = "requesttimeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://brapi.dev".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Delay between polls
    #[serde(rename = "pollinginterval", with = "humantime_serde")]
    pub polling_interval: Duration,
    /// Email failed price checks as well as logging them
    #[serde(rename = "notifyonerror")]
    pub notify_on_error: bool,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(5 * 60),
            notify_on_error: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level filter
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load and validate the configuration file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json(&raw).map_err(|e| {
            let reason = match e {
                Error::Config(msg) => msg,
                other => other.to_string(),
            };
            Error::config(format!("{}: {reason}", path.display()))
        })?;

        Ok(config)
    }

    /// Parse and validate configuration from a JSON document
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = value else {
            return Err(Error::config("expected a JSON object"));
        };

        let config: Self = serde_json::from_value(Value::Object(nest_flat_email(normalize(map))))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings needed to start are present
    pub fn validate(&self) -> Result<()> {
        let email = &self.email;
        if email.smtp_host.trim().is_empty() {
            return Err(Error::config("email.smtpHost is required"));
        }
        if email.smtp_port == 0 {
            return Err(Error::config("email.smtpPort must be greater than zero"));
        }
        if email.from_email.trim().is_empty() {
            return Err(Error::config("email.fromEmail is required"));
        }
        if email.to_email.trim().is_empty() {
            return Err(Error::config("email.toEmail is required"));
        }
        if self.alerts.polling_interval.is_zero() {
            return Err(Error::config("alerts.pollingInterval must be greater than zero"));
        }
        Ok(())
    }
}

/// Lowercase object keys and drop `_`/`-`, recursively
fn normalize(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let key: String = key
                .chars()
                .filter(|c| *c != '_' && *c != '-')
                .flat_map(char::to_lowercase)
                .collect();
            let value = match value {
                Value::Object(inner) => Value::Object(normalize(inner)),
                other => other,
            };
            (key, value)
        })
        .collect()
}

/// Move top-level email keys into an `email` section if there is none
fn nest_flat_email(mut map: Map<String, Value>) -> Map<String, Value> {
    if map.contains_key("email") || !map.contains_key("smtphost") {
        return map;
    }

    let email: Map<String, Value> = EMAIL_KEYS
        .iter()
        .filter_map(|key| map.remove(*key).map(|value| ((*key).to_string(), value)))
        .collect();
    map.insert("email".to_string(), Value::Object(email));
    map
}
