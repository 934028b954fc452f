//! The unit of work: the single path from aggregate changes to storage and
//! then to the event router.

use std::time::Instant;

use storage::{StorageBackend, WriteBatch};
use tokio_util::sync::CancellationToken;

use crate::aggregate::TrackedAggregate;
use crate::dispatch::EventRouter;
use crate::error::CommitError;
use crate::event::EventRecord;

/// Outcome of a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Rows touched by the atomic write.
    pub rows_written: usize,

    /// Events harvested from the tracked aggregates.
    pub events_harvested: usize,

    /// Events handed to every registered handler.
    pub events_dispatched: usize,
}

/// Tracks aggregates changed by one operation and commits them together.
///
/// `commit` harvests and clears the pending events of every tracked
/// aggregate, writes all aggregates in one atomic batch and, only if that
/// write succeeded, dispatches the harvested events in order.
pub struct UnitOfWork<'a, S: StorageBackend + ?Sized> {
    storage: &'a S,
    router: &'a EventRouter,
    tracked: Vec<&'a mut dyn TrackedAggregate>,
    cancellable_before_write: bool,
}

impl<'a, S: StorageBackend + ?Sized> UnitOfWork<'a, S> {
    pub fn new(storage: &'a S, router: &'a EventRouter) -> Self {
        Self {
            storage,
            router,
            tracked: Vec::new(),
            cancellable_before_write: true,
        }
    }

    /// Writes even if cancellation was requested before the commit.
    ///
    /// Used when a row was already inserted for a tracked aggregate, so
    /// skipping the write would leave that row without its pending events.
    /// Cancellation still stops dispatch after the write.
    pub fn write_despite_cancellation(&mut self) -> &mut Self {
        self.cancellable_before_write = false;
        self
    }

    /// Adds an aggregate to the unit of work. Tracking order is harvest order.
    pub fn track(&mut self, aggregate: &'a mut dyn TrackedAggregate) -> &mut Self {
        self.tracked.push(aggregate);
        self
    }

    /// Number of tracked aggregates.
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Number of events currently pending across tracked aggregates.
    pub fn pending_event_count(&self) -> usize {
        self.tracked
            .iter()
            .map(|aggregate| aggregate.pending_events().len())
            .sum()
    }

    /// Persists every tracked aggregate and dispatches their events.
    ///
    /// Cancellation is honoured before the write (unless
    /// [`write_despite_cancellation`](Self::write_despite_cancellation) was
    /// called) and between dispatched events, never during the write itself. Buffers are cleared before
    /// the write, so a second commit never re-emits the same events.
    #[tracing::instrument(skip_all, fields(aggregates = self.tracked.len()))]
    pub async fn commit(&mut self, cancel: &CancellationToken) -> Result<CommitReceipt, CommitError> {
        let started = Instant::now();
        let result = self.run(cancel).await;

        metrics::histogram!("uow_commit_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                metrics::counter!("uow_commits_total").increment(1);
                tracing::debug!(
                    rows = receipt.rows_written,
                    events = receipt.events_dispatched,
                    "unit of work committed"
                );
            }
            Err(CommitError::Dispatch {
                receipt,
                undispatched,
                source,
            }) => {
                // Durable write, partial side effects
                metrics::counter!("uow_commits_total").increment(1);
                metrics::counter!("uow_commit_failures_total", "stage" => "dispatch").increment(1);
                tracing::warn!(
                    rows = receipt.rows_written,
                    undispatched = *undispatched,
                    error = %source,
                    "state committed but event dispatch stopped early"
                );
            }
            Err(e) => {
                metrics::counter!("uow_commit_failures_total", "stage" => "write").increment(1);
                tracing::error!(error = %e, "unit of work commit failed");
            }
        }

        result
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<CommitReceipt, CommitError> {
        if self.cancellable_before_write && cancel.is_cancelled() {
            return Err(CommitError::Cancelled);
        }

        let mut batch = WriteBatch::new();
        for aggregate in &self.tracked {
            batch.push(aggregate.write_op()?);
        }

        let events: Vec<EventRecord> = self
            .tracked
            .iter_mut()
            .flat_map(|aggregate| aggregate.take_events())
            .collect();

        let mut receipt = CommitReceipt {
            events_harvested: events.len(),
            ..CommitReceipt::default()
        };

        if !batch.is_empty() {
            let written = self
                .storage
                .write(batch)
                .await
                .map_err(CommitError::Persistence)?;
            receipt.rows_written = written.rows();
        }

        match self.router.dispatch_all(&events, cancel).await {
            Ok(dispatched) => {
                receipt.events_dispatched = dispatched;
                Ok(receipt)
            }
            Err(source) => {
                receipt.events_dispatched = source.delivered();
                Err(CommitError::Dispatch {
                    receipt,
                    undispatched: events.len() - source.delivered(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::HasDomainEvents;
    use crate::dispatch::{EventHandler, RoutingTable};
    use crate::error::{DispatchError, HandlerError};
    use crate::order::{Money, NewOrder, Order, OrderConfirmed, OrderLine};
    use async_trait::async_trait;
    use common::{BookId, OrderId};
    use std::sync::Arc;
    use storage::{InMemoryStorage, StorageBackendExt};
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct Recorder {
        seen: RwLock<Vec<OrderId>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler<OrderConfirmed> for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(
            &self,
            event: &OrderConfirmed,
            _cancel: &CancellationToken,
        ) -> Result<(), HandlerError> {
            self.seen.write().await.push(event.order_id);
            if self.fail {
                return Err(HandlerError::failed("recorder down"));
            }
            Ok(())
        }
    }

    /// Requests cancellation while handling the event it is given.
    struct Canceller;

    #[async_trait]
    impl EventHandler<OrderConfirmed> for Canceller {
        fn name(&self) -> &'static str {
            "canceller"
        }

        async fn handle(
            &self,
            _event: &OrderConfirmed,
            cancel: &CancellationToken,
        ) -> Result<(), HandlerError> {
            cancel.cancel();
            Ok(())
        }
    }

    async fn persisted_order(storage: &InMemoryStorage) -> Order {
        let mut draft = NewOrder::create(42, None).unwrap();
        draft
            .add_line(OrderLine::new(
                BookId::new(7).unwrap(),
                "Dune",
                2,
                Money::from_cents(1000),
            ))
            .unwrap();
        let state = serde_json::to_value(draft.data()).unwrap();
        let id = storage.insert("Order", state).await.unwrap();
        draft.materialize(OrderId::new(id).unwrap())
    }

    fn router_with(recorder: &Arc<Recorder>) -> EventRouter {
        EventRouter::new(
            RoutingTable::builder()
                .route::<OrderConfirmed, _>(recorder.clone())
                .build(),
        )
    }

    #[tokio::test]
    async fn test_commit_writes_then_dispatches() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder::default());
        let router = router_with(&recorder);
        let mut order = persisted_order(&storage).await;
        order.confirm().unwrap();

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.track(&mut order);
        let receipt = uow.commit(&CancellationToken::new()).await.unwrap();

        assert_eq!(receipt.rows_written, 1);
        assert_eq!(receipt.events_dispatched, 1);
        assert_eq!(*recorder.seen.read().await, vec![order.id()]);
        assert!(order.pending_events().is_empty());

        let row = storage.load_required(&order.key()).await.unwrap();
        assert_eq!(row.state["status"], "Confirmed");
    }

    #[tokio::test]
    async fn test_write_failure_dispatches_nothing() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder::default());
        let router = router_with(&recorder);
        let mut order = persisted_order(&storage).await;
        order.confirm().unwrap();
        storage.set_fail_on_write(true).await;

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.track(&mut order);
        let result = uow.commit(&CancellationToken::new()).await;

        assert!(matches!(result, Err(CommitError::Persistence(_))));
        assert!(recorder.seen.read().await.is_empty());
        assert!(order.pending_events().is_empty());
    }

    #[tokio::test]
    async fn test_second_commit_emits_nothing() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder::default());
        let router = router_with(&recorder);
        let mut order = persisted_order(&storage).await;
        order.confirm().unwrap();

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.track(&mut order);
        uow.commit(&CancellationToken::new()).await.unwrap();
        let second = uow.commit(&CancellationToken::new()).await.unwrap();

        assert_eq!(second.events_harvested, 0);
        assert_eq!(recorder.seen.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_commit_writes_nothing() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder::default());
        let router = router_with(&recorder);
        let mut order = persisted_order(&storage).await;
        order.confirm().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.track(&mut order);
        let result = uow.commit(&cancel).await;
        drop(uow);

        assert!(matches!(result, Err(CommitError::Cancelled)));
        assert_eq!(storage.write_count().await, 0);
        assert_eq!(order.pending_events().len(), 1);
    }

    #[tokio::test]
    async fn test_write_despite_cancellation_still_stops_dispatch() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder::default());
        let router = router_with(&recorder);
        let mut order = persisted_order(&storage).await;
        order.confirm().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.write_despite_cancellation().track(&mut order);
        let err = uow.commit(&cancel).await.unwrap_err();
        drop(uow);

        match err {
            CommitError::Dispatch {
                receipt,
                undispatched,
                source,
            } => {
                assert_eq!(receipt.rows_written, 1);
                assert_eq!(undispatched, 1);
                assert!(matches!(source, DispatchError::Cancelled { delivered: 0 }));
            }
            other => panic!("expected dispatch failure, got {other:?}"),
        }
        assert_eq!(storage.write_count().await, 1);
        assert!(recorder.seen.read().await.is_empty());
        assert!(order.pending_events().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_dispatch_skips_remaining_events() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder::default());
        let router = EventRouter::new(
            RoutingTable::builder()
                .route::<OrderConfirmed, _>(Arc::new(Canceller))
                .route::<OrderConfirmed, _>(recorder.clone())
                .build(),
        );
        let mut first = persisted_order(&storage).await;
        let mut second = persisted_order(&storage).await;
        first.confirm().unwrap();
        second.confirm().unwrap();

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.track(&mut first).track(&mut second);
        let err = uow.commit(&CancellationToken::new()).await.unwrap_err();

        match err {
            CommitError::Dispatch {
                receipt,
                undispatched,
                source,
            } => {
                assert_eq!(receipt.rows_written, 2);
                assert_eq!(receipt.events_dispatched, 1);
                assert_eq!(undispatched, 1);
                assert!(matches!(source, DispatchError::Cancelled { delivered: 1 }));
            }
            other => panic!("expected dispatch failure, got {other:?}"),
        }
        // Handlers already running for the first event finish it
        assert_eq!(*recorder.seen.read().await, vec![first.id()]);

        let row = storage.load_required(&second.key()).await.unwrap();
        assert_eq!(row.state["status"], "Confirmed");
    }

    #[tokio::test]
    async fn test_handler_failure_keeps_write() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let router = router_with(&recorder);
        let mut first = persisted_order(&storage).await;
        let mut second = persisted_order(&storage).await;
        first.confirm().unwrap();
        second.confirm().unwrap();

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.track(&mut first).track(&mut second);
        let err = uow.commit(&CancellationToken::new()).await.unwrap_err();

        match err {
            CommitError::Dispatch {
                receipt,
                undispatched,
                source,
            } => {
                assert_eq!(receipt.rows_written, 2);
                assert_eq!(undispatched, 2);
                assert!(matches!(source, DispatchError::Handler { .. }));
            }
            other => panic!("expected dispatch failure, got {other:?}"),
        }
        // Only the first event reached the failing handler
        assert_eq!(recorder.seen.read().await.len(), 1);
        assert_eq!(storage.write_count().await, 1);
    }

    #[tokio::test]
    async fn test_events_follow_tracking_order() {
        let storage = InMemoryStorage::new();
        let recorder = Arc::new(Recorder::default());
        let router = router_with(&recorder);
        let mut first = persisted_order(&storage).await;
        let mut second = persisted_order(&storage).await;
        second.confirm().unwrap();
        first.confirm().unwrap();
        let expected = vec![second.id(), first.id()];

        let mut uow = UnitOfWork::new(&storage, &router);
        uow.track(&mut second).track(&mut first);
        assert_eq!(uow.pending_event_count(), 2);
        uow.commit(&CancellationToken::new()).await.unwrap();

        assert_eq!(*recorder.seen.read().await, expected);
    }

    #[tokio::test]
    async fn test_empty_unit_of_work_is_noop() {
        let storage = InMemoryStorage::new();
        let router = EventRouter::empty();
        let mut uow = UnitOfWork::new(&storage, &router);
        assert!(uow.is_empty());

        let receipt = uow.commit(&CancellationToken::new()).await.unwrap();
        assert_eq!(receipt, CommitReceipt::default());
        assert_eq!(storage.write_count().await, 0);
    }
}
