//! In-process publish/subscribe for alert events
//!
//! Handlers are registered per [`EventKind`]. Publishing fans an event out to
//! every handler of its kind on separate tasks and waits for all of them; a
//! failing or panicking handler is logged and never reaches the publisher.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::models::{AlertEvent, EventKind};

type Handler = Arc<dyn Fn(AlertEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Summary of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers that completed successfully
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Registry mapping event kinds to their handlers
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events of `kind`
    pub fn subscribe<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(AlertEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| handler(event).boxed());
        self.handlers.lock().entry(kind).or_default().push(handler);
    }

    /// Number of handlers registered for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler of its kind and wait for them to finish
    pub async fn publish(&self, event: AlertEvent) -> DispatchOutcome {
        let kind = event.kind();

        // Snapshot so registration during fan-out cannot affect this publish
        let handlers = {
            let registry = self.handlers.lock();
            match registry.get(&kind) {
                Some(handlers) if !handlers.is_empty() => handlers.clone(),
                _ => {
                    debug!(event = %kind, "No handlers registered");
                    return DispatchOutcome::default();
                }
            }
        };

        let tasks = handlers.into_iter().map(|handler| {
            let event = event.clone();
            tokio::spawn(async move { handler(event).await })
        });

        let mut outcome = DispatchOutcome::default();
        for result in join_all(tasks).await {
            match result {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    error!(event = %kind, error = %format!("{e:#}"), "Error in event handler");
                }
                Err(e) => {
                    outcome.failed += 1;
                    error!(event = %kind, error = %e, "Event handler panicked");
                }
            }
        }

        debug!(
            event = %kind,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "Event dispatched"
        );
        outcome
    }
}
