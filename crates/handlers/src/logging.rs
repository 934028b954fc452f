//! Activity log: one structured log line per committed event.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domain::{CancellationToken, DomainEvent, EventHandler, HandlerError};

/// Logs every event it receives at info level.
#[derive(Debug, Default)]
pub struct ActivityLogHandler {
    logged: AtomicU64,
}

impl ActivityLogHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events logged since construction.
    pub fn logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<E: DomainEvent> EventHandler<E> for ActivityLogHandler {
    fn name(&self) -> &'static str {
        "activity_log"
    }

    async fn handle(&self, event: &E, _cancel: &CancellationToken) -> Result<(), HandlerError> {
        tracing::info!(
            event_type = event.event_type(),
            aggregate_type = event.aggregate_type(),
            aggregate_id = event.aggregate_id(),
            occurred_at = %event.occurred_at(),
            payload = %event.payload(),
            "domain event committed"
        );
        metrics::counter!("activity_events_total", "event_type" => event.event_type()).increment(1);
        self.logged.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
