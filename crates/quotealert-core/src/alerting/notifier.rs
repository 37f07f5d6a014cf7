//! Notification delivery for alerts

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::models::NotificationMessage;

/// Delivers notification messages through an external channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a single message. Failed sends are not retried.
    async fn send(
        &self,
        message: &NotificationMessage,
        cancel: &CancellationToken,
    ) -> Result<(), NotificationError>;

    /// Release any resources held by the sink
    fn close(&self) {}
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// SMTP transport or server error
    #[error("SMTP error: {0}")]
    SmtpError(String),

    /// Invalid sink settings
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Message could not be built
    #[error("Invalid message: {0}")]
    MessageError(String),

    /// The sink was closed
    #[error("Notification sink is closed")]
    Closed,

    /// Delivery abandoned on shutdown
    #[error("Notification cancelled")]
    Cancelled,
}

type SmtpTransport = AsyncSmtpTransport<Tokio1Executor>;

/// Sends notifications as plain-text email over SMTP
pub struct SmtpNotifier {
    transport: Mutex<Option<SmtpTransport>>,
    from: Mailbox,
    to: Mailbox,
    host: String,
}

impl SmtpNotifier {
    /// Create a new SMTP notifier.
    ///
    /// No connection is made until the first message is sent.
    pub fn new(config: &EmailConfig) -> Result<Self, NotificationError> {
        let from: Mailbox = config.from_email.parse().map_err(|e| {
            NotificationError::ConfigError(format!("invalid from address {}: {e}", config.from_email))
        })?;
        let to: Mailbox = config.to_email.parse().map_err(|e| {
            NotificationError::ConfigError(format!("invalid to address {}: {e}", config.to_email))
        })?;

        let tls_parameters = TlsParameters::new(config.smtp_host.clone())
            .map_err(|e| NotificationError::ConfigError(e.to_string()))?;
        let tls = if config.use_ssl {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Opportunistic(tls_parameters)
        };

        let mut builder = SmtpTransport::builder_dangerous(&config.smtp_host)
            .port(config.smtp_port)
            .tls(tls);

        if let Some(username) = config.username.as_deref().filter(|u| !u.trim().is_empty()) {
            builder = builder.credentials(Credentials::new(
                username.to_string(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        Ok(Self {
            transport: Mutex::new(Some(builder.build())),
            from,
            to,
            host: config.smtp_host.clone(),
        })
    }

    fn build_message(&self, message: &NotificationMessage) -> Result<Message, NotificationError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| NotificationError::MessageError(e.to_string()))
    }
}

#[async_trait]
impl NotificationSink for SmtpNotifier {
    async fn send(
        &self,
        message: &NotificationMessage,
        cancel: &CancellationToken,
    ) -> Result<(), NotificationError> {
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or(NotificationError::Closed)?;
        let email = self.build_message(message)?;

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(NotificationError::Cancelled),
            result = transport.send(email) => {
                result.map_err(|e| NotificationError::SmtpError(e.to_string()))?;
            }
        }

        info!(
            host = %self.host,
            to = %self.to,
            category = ?message.category,
            "Email notification sent"
        );
        Ok(())
    }

    fn close(&self) {
        if self.transport.lock().take().is_some() {
            debug!(host = %self.host, "SMTP transport released");
        }
    }
}
