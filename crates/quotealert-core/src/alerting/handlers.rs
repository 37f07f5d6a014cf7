//! Default reactions to alert events

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::{money, AlertEvent, EventKind, NotificationMessage};

use super::dispatcher::EventDispatcher;
use super::notifier::NotificationSink;

/// Subscribe the monitor's handlers: buy/sell alerts are logged and emailed,
/// failed checks are logged (and emailed only when `notify_on_error` is set).
pub(crate) fn register_default_handlers(
    dispatcher: &EventDispatcher,
    sink: &Arc<dyn NotificationSink>,
    cancel: &CancellationToken,
    notify_on_error: bool,
) {
    for kind in [
        EventKind::BelowThreshold,
        EventKind::AboveThreshold,
        EventKind::CheckFailed,
    ] {
        let sink = Arc::clone(sink);
        let cancel = cancel.clone();
        dispatcher.subscribe(kind, move |event| {
            let sink = Arc::clone(&sink);
            let cancel = cancel.clone();
            async move { handle(event, sink.as_ref(), &cancel, notify_on_error).await }
        });
    }
}

async fn handle(
    event: AlertEvent,
    sink: &dyn NotificationSink,
    cancel: &CancellationToken,
    notify_on_error: bool,
) -> anyhow::Result<()> {
    let message = match &event {
        AlertEvent::BelowThreshold {
            ticker,
            price,
            threshold,
            at,
        } => {
            info!(
                ticker = %ticker,
                "BUY ALERT: {ticker} is at {}, below threshold of {}",
                money(*price),
                money(*threshold)
            );
            NotificationMessage::buy_alert(ticker, *price, *threshold, *at)
        }
        AlertEvent::AboveThreshold {
            ticker,
            price,
            threshold,
            at,
        } => {
            info!(
                ticker = %ticker,
                "SELL ALERT: {ticker} is at {}, above threshold of {}",
                money(*price),
                money(*threshold)
            );
            NotificationMessage::sell_alert(ticker, *price, *threshold, *at)
        }
        AlertEvent::CheckFailed { ticker, error, at } => {
            error!(ticker = %ticker, error = %error, "Failed to check price");
            if !notify_on_error {
                return Ok(());
            }
            NotificationMessage::check_failed(ticker, error, *at)
        }
    };

    sink.send(&message, cancel)
        .await
        .with_context(|| format!("failed to send \"{}\"", message.subject))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::NotificationError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::io;

    struct RejectingSink;

    #[async_trait]
    impl NotificationSink for RejectingSink {
        async fn send(
            &self,
            _message: &NotificationMessage,
            _cancel: &CancellationToken,
        ) -> Result<(), NotificationError> {
            Err(NotificationError::SmtpError(
                "535 authentication rejected".to_string(),
            ))
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn below_event() -> AlertEvent {
        AlertEvent::BelowThreshold {
            ticker: "ABC".to_string(),
            price: Decimal::new(950, 2),
            threshold: Decimal::new(1000, 2),
            at: chrono::Utc::now(),
        }
    }

    // Current-thread runtime so spawned handlers log through the scoped subscriber
    #[tokio::test]
    async fn test_send_failure_log_includes_cause() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dispatcher = EventDispatcher::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(RejectingSink);
        register_default_handlers(&dispatcher, &sink, &CancellationToken::new(), false);

        let outcome = dispatcher.publish(below_event()).await;

        assert_eq!(outcome.failed, 1);
        let output = logs.contents();
        assert!(output.contains("Error in event handler"), "logs: {output}");
        assert!(output.contains("failed to send"), "logs: {output}");
        assert!(output.contains("535 authentication rejected"), "logs: {output}");
    }

    #[tokio::test]
    async fn test_check_failed_not_sent_by_default() {
        let dispatcher = EventDispatcher::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(RejectingSink);
        register_default_handlers(&dispatcher, &sink, &CancellationToken::new(), false);

        let outcome = dispatcher
            .publish(AlertEvent::check_failed("ABC", "connection refused"))
            .await;

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 0);
    }
}
