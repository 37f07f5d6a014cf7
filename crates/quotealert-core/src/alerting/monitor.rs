//! Price polling loop
//!
//! The monitor is the only producer of [`AlertEvent`]s. Each tick fetches a
//! quote, publishes threshold events (or a check failure) and then sleeps for
//! the polling interval. The sleep starts after the tick's handlers finish, so
//! ticks never overlap.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::models::{money, AlertEvent, MonitorConfig};
use crate::quotes::PriceSource;

use super::dispatcher::EventDispatcher;
use super::handlers::register_default_handlers;
use super::notifier::NotificationSink;

/// Lifecycle of an [`AlertMonitor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed, not yet started
    Idle,
    /// Polling loop is running
    Running,
    /// Stopped; a new monitor is needed to poll again
    Stopped,
}

struct Lifecycle {
    state: MonitorState,
    task: Option<JoinHandle<()>>,
}

/// Polls a price source and publishes alert events
pub struct AlertMonitor {
    config: Arc<MonitorConfig>,
    source: Arc<dyn PriceSource>,
    sink: Arc<dyn NotificationSink>,
    dispatcher: Arc<EventDispatcher>,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl AlertMonitor {
    /// Create a monitor with a fresh dispatcher and the default handlers
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn PriceSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self::with_dispatcher(config, source, sink, Arc::new(EventDispatcher::new()))
    }

    /// Create a monitor publishing through an existing dispatcher
    pub fn with_dispatcher(
        config: MonitorConfig,
        source: Arc<dyn PriceSource>,
        sink: Arc<dyn NotificationSink>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let cancel = CancellationToken::new();
        register_default_handlers(&dispatcher, &sink, &cancel, config.notify_on_error);

        Self {
            config: Arc::new(config),
            source,
            sink,
            dispatcher,
            cancel,
            lifecycle: Mutex::new(Lifecycle {
                state: MonitorState::Idle,
                task: None,
            }),
        }
    }

    /// The dispatcher events are published through
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// The monitor's configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> MonitorState {
        self.lifecycle.lock().state
    }

    /// Spawn the polling loop. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            MonitorState::Running => return Err(Error::AlreadyRunning),
            MonitorState::Stopped => return Err(Error::Stopped),
            MonitorState::Idle => {}
        }
        self.config.validate()?;

        let poller = Poller {
            config: Arc::clone(&self.config),
            source: Arc::clone(&self.source),
            dispatcher: Arc::clone(&self.dispatcher),
            cancel: self.cancel.clone(),
        };
        lifecycle.task = Some(tokio::spawn(poller.run()));
        lifecycle.state = MonitorState::Running;

        info!(
            ticker = %self.config.ticker,
            buy_threshold = %money(self.config.buy_price),
            sell_threshold = %money(self.config.sell_price),
            interval = ?self.config.polling_interval,
            "Started monitoring"
        );
        Ok(())
    }

    /// Cancel the polling loop and release the sink.
    ///
    /// Does not wait for in-flight notifications; use [`AlertMonitor::wait`]
    /// to join the loop. Calling this more than once has no further effect.
    pub fn stop(&self) {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            std::mem::replace(&mut lifecycle.state, MonitorState::Stopped)
        };
        if previous == MonitorState::Stopped {
            return;
        }

        self.cancel.cancel();
        self.sink.close();

        if previous == MonitorState::Running {
            info!(ticker = %self.config.ticker, "Stopped monitoring");
        }
    }

    /// Wait for the polling loop to exit.
    ///
    /// Returns immediately if the loop was never started or has already been
    /// joined; otherwise blocks until [`AlertMonitor::stop`] takes effect.
    pub async fn wait(&self) {
        let task = self.lifecycle.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Polling loop terminated abnormally");
            }
        }
    }
}

impl Drop for AlertMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the background polling task
struct Poller {
    config: Arc<MonitorConfig>,
    source: Arc<dyn PriceSource>,
    dispatcher: Arc<EventDispatcher>,
    cancel: CancellationToken,
}

impl Poller {
    async fn run(self) {
        loop {
            if !self.tick().await {
                break;
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.polling_interval) => {}
            }
        }

        debug!(ticker = %self.config.ticker, "Polling loop exited");
    }

    /// Run one fetch/evaluate/publish cycle. Returns `false` once cancelled.
    async fn tick(&self) -> bool {
        let ticker = &self.config.ticker;

        let fetched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return false,
            result = self.source.fetch_price(ticker, &self.cancel) => result,
        };

        match fetched {
            Ok(quote) => {
                info!(ticker = %ticker, price = %money(quote.price), "Current price");
                for event in self.config.evaluate(&quote) {
                    self.dispatcher.publish(event).await;
                }
            }
            Err(_) if self.cancel.is_cancelled() => return false,
            Err(e) => {
                self.dispatcher
                    .publish(AlertEvent::check_failed(ticker.as_str(), &e))
                    .await;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::NotificationError;
    use crate::models::{EventKind, NotificationCategory, NotificationMessage, Quote};
    use crate::quotes::FetchError;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// Replays scripted prices; `None` entries fail. Repeats the last entry.
    struct ScriptedSource {
        script: Mutex<VecDeque<Option<&'static str>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: &[Option<&'static str>]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_price(
            &self,
            ticker: &str,
            _cancel: &CancellationToken,
        ) -> std::result::Result<Quote, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut script = self.script.lock();
                if script.len() > 1 {
                    script.pop_front().flatten()
                } else {
                    script.front().copied().flatten()
                }
            };
            match next {
                Some(price) => Ok(Quote::new(ticker, Decimal::from_str(price).unwrap())),
                None => Err(FetchError::Http("connection refused".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<NotificationMessage>>,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(
            &self,
            message: &NotificationMessage,
            _cancel: &CancellationToken,
        ) -> std::result::Result<(), NotificationError> {
            self.sent.lock().push(message.clone());
            Ok(())
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(interval: Duration) -> MonitorConfig {
        MonitorConfig::new(
            "ABC",
            Decimal::from_str("10.00").unwrap(),
            Decimal::from_str("20.00").unwrap(),
            interval,
        )
    }

    fn record_events(monitor: &AlertMonitor) -> mpsc::UnboundedReceiver<AlertEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in [
            EventKind::BelowThreshold,
            EventKind::AboveThreshold,
            EventKind::CheckFailed,
        ] {
            let tx = tx.clone();
            monitor.dispatcher().subscribe(kind, move |event| {
                let tx = tx.clone();
                async move {
                    tx.send(event)?;
                    Ok::<(), anyhow::Error>(())
                }
            });
        }
        rx
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<AlertEvent>) -> AlertEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn wait_for_sends(sink: &RecordingSink, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while sink.sent.lock().len() < count {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for sends");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_new_registers_default_handlers() {
        let monitor = AlertMonitor::new(
            config(Duration::from_secs(60)),
            ScriptedSource::new(&[Some("15")]),
            Arc::new(RecordingSink::default()),
        );

        for kind in [
            EventKind::BelowThreshold,
            EventKind::AboveThreshold,
            EventKind::CheckFailed,
        ] {
            assert_eq!(monitor.dispatcher().handler_count(kind), 1);
        }
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let monitor = AlertMonitor::new(
            config(Duration::from_secs(60)),
            ScriptedSource::new(&[Some("15")]),
            Arc::new(RecordingSink::default()),
        );

        monitor.start().unwrap();

        assert!(matches!(monitor.start(), Err(Error::AlreadyRunning)));
        assert_eq!(monitor.state(), MonitorState::Running);
        monitor.stop();
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let source = ScriptedSource::new(&[Some("15")]);
        let monitor = AlertMonitor::new(
            config(Duration::ZERO),
            Arc::clone(&source) as Arc<dyn PriceSource>,
            Arc::new(RecordingSink::default()),
        );

        assert!(matches!(monitor.start(), Err(Error::Validation(_))));
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_after_stop_fails() {
        let monitor = AlertMonitor::new(
            config(Duration::from_secs(60)),
            ScriptedSource::new(&[Some("15")]),
            Arc::new(RecordingSink::default()),
        );

        monitor.start().unwrap();
        monitor.stop();
        monitor.wait().await;

        assert!(matches!(monitor.start(), Err(Error::Stopped)));
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_fetch_failures_do_not_stop_loop() {
        let source = ScriptedSource::new(&[None]);
        let sink = Arc::new(RecordingSink::default());
        let monitor = AlertMonitor::new(
            config(Duration::from_millis(10)),
            source.clone(),
            sink.clone(),
        );
        let mut rx = record_events(&monitor);

        monitor.start().unwrap();
        for _ in 0..3 {
            let event = next_event(&mut rx).await;
            assert_eq!(event.kind(), EventKind::CheckFailed);
        }
        monitor.stop();
        monitor.wait().await;

        assert!(source.calls.load(Ordering::SeqCst) >= 3);
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let monitor = AlertMonitor::new(
            config(Duration::from_secs(10)),
            ScriptedSource::new(&[Some("15")]),
            Arc::new(RecordingSink::default()),
        );

        monitor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        monitor.stop();
        let joined = timeout(Duration::from_secs(1), monitor.wait()).await;

        assert!(joined.is_ok(), "loop kept sleeping after stop");
    }

    #[tokio::test]
    async fn test_stop_releases_sink_once() {
        let sink = Arc::new(RecordingSink::default());
        let monitor = AlertMonitor::new(
            config(Duration::from_secs(60)),
            ScriptedSource::new(&[Some("15")]),
            sink.clone(),
        );

        monitor.start().unwrap();
        monitor.stop();
        monitor.stop();
        drop(monitor);

        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_sink() {
        let sink = Arc::new(RecordingSink::default());
        let monitor = AlertMonitor::new(
            config(Duration::from_secs(60)),
            ScriptedSource::new(&[Some("15")]),
            sink.clone(),
        );

        monitor.start().unwrap();
        drop(monitor);

        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overlapping_thresholds_send_both_alerts() {
        let sink = Arc::new(RecordingSink::default());
        let monitor = AlertMonitor::new(
            MonitorConfig::new(
                "ABC",
                Decimal::from(100),
                Decimal::from(90),
                Duration::from_secs(60),
            ),
            ScriptedSource::new(&[Some("95")]),
            sink.clone(),
        );
        let mut rx = record_events(&monitor);

        monitor.start().unwrap();
        let first = next_event(&mut rx).await;
        let second = next_event(&mut rx).await;
        wait_for_sends(&sink, 2).await;
        monitor.stop();

        assert_eq!(first.kind(), EventKind::BelowThreshold);
        assert_eq!(second.kind(), EventKind::AboveThreshold);

        let mut categories: Vec<_> = sink.sent.lock().iter().map(|m| m.category).collect();
        categories.sort_by_key(|c| *c as u8);
        assert_eq!(
            categories,
            vec![NotificationCategory::BuyAlert, NotificationCategory::SellAlert]
        );
    }

    #[tokio::test]
    async fn test_notify_on_error_sends_error_message() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = config(Duration::from_secs(60));
        config.notify_on_error = true;
        let monitor = AlertMonitor::new(config, ScriptedSource::new(&[None]), sink.clone());
        let mut rx = record_events(&monitor);

        monitor.start().unwrap();
        let event = next_event(&mut rx).await;
        wait_for_sends(&sink, 1).await;
        monitor.stop();

        assert_eq!(event.kind(), EventKind::CheckFailed);
        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].category, NotificationCategory::Error);
    }
}
