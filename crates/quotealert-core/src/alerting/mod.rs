//! Alerting for QuoteAlert
//!
//! Price polling, event dispatch and notification delivery.

mod dispatcher;
mod handlers;
mod monitor;
mod notifier;

pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use monitor::{AlertMonitor, MonitorState};
pub use notifier::{NotificationError, NotificationSink, SmtpNotifier};
