//! Event routing: an explicit table from event type to ordered handlers.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, HandlerError};
use crate::event::{DomainEvent, EventRecord};

/// A handler reacting to one event type with a side effect.
///
/// A single handler type may implement this trait for several event types
/// and be registered once per type.
#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync {
    /// Returns the name of this handler, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Handles one event.
    async fn handle(&self, event: &E, cancel: &CancellationToken) -> Result<(), HandlerError>;
}

/// Type-erased view of a registered handler.
#[async_trait]
trait ErasedHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, record: &EventRecord, cancel: &CancellationToken)
    -> Result<(), HandlerError>;
}

struct Registered<E, H> {
    handler: Arc<H>,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> ErasedHandler for Registered<E, H>
where
    E: DomainEvent,
    H: EventHandler<E> + 'static,
{
    fn name(&self) -> &'static str {
        EventHandler::<E>::name(self.handler.as_ref())
    }

    async fn handle(
        &self,
        record: &EventRecord,
        cancel: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let event = record.downcast_ref::<E>().ok_or_else(|| {
            HandlerError::failed(format!(
                "{} routed to handler for {}",
                record.event_type(),
                std::any::type_name::<E>()
            ))
        })?;
        EventHandler::<E>::handle(self.handler.as_ref(), event, cancel).await
    }
}

struct Route {
    event_type: &'static str,
    handlers: Vec<Arc<dyn ErasedHandler>>,
}

/// Immutable mapping from event type to its handlers, in registration order.
///
/// Built once at start-up with [`RoutingTable::builder`] and shared by
/// reference through [`EventRouter`].
pub struct RoutingTable {
    routes: HashMap<TypeId, Route>,
}

impl RoutingTable {
    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder::default()
    }

    /// A table with no routes.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Returns the names of the handlers registered for `E`, in order.
    pub fn handler_names<E: DomainEvent>(&self) -> Vec<&'static str> {
        self.routes
            .get(&TypeId::of::<E>())
            .map(|route| route.handlers.iter().map(|h| h.name()).collect())
            .unwrap_or_default()
    }

    /// Number of event types with at least one handler.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Total number of registrations across all event types.
    pub fn handler_count(&self) -> usize {
        self.routes.values().map(|route| route.handlers.len()).sum()
    }

    fn route(&self, type_id: &TypeId) -> Option<&Route> {
        self.routes.get(type_id)
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for route in self.routes.values() {
            let names: Vec<&str> = route.handlers.iter().map(|h| h.name()).collect();
            map.entry(&route.event_type, &names);
        }
        map.finish()
    }
}

/// Builder for [`RoutingTable`].
#[derive(Default)]
pub struct RoutingTableBuilder {
    routes: HashMap<TypeId, Route>,
}

impl RoutingTableBuilder {
    /// Registers `handler` for events of type `E`, after any handler
    /// already registered for `E`.
    pub fn route<E, H>(mut self, handler: Arc<H>) -> Self
    where
        E: DomainEvent,
        H: EventHandler<E> + 'static,
    {
        let route = self.routes.entry(TypeId::of::<E>()).or_insert_with(|| Route {
            event_type: short_type_name::<E>(),
            handlers: Vec::new(),
        });
        route.handlers.push(Arc::new(Registered::<E, H> {
            handler,
            _event: PhantomData,
        }));
        self
    }

    pub fn build(self) -> RoutingTable {
        RoutingTable {
            routes: self.routes,
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Dispatches harvested events to the handlers of a [`RoutingTable`].
///
/// Dispatch is sequential: each handler is awaited before the next one
/// starts, and events are processed in the order given.
#[derive(Clone)]
pub struct EventRouter {
    table: Arc<RoutingTable>,
}

impl EventRouter {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    /// Creates a router over an already shared table.
    pub fn from_shared(table: Arc<RoutingTable>) -> Self {
        Self { table }
    }

    /// A router that drops every event.
    pub fn empty() -> Self {
        Self::new(RoutingTable::empty())
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Invokes every handler registered for the record's concrete type.
    ///
    /// Returns the number of handlers invoked. An event type without
    /// handlers is a no-op. The first handler error stops the remaining
    /// handlers for this event.
    #[tracing::instrument(skip_all, fields(event_type = record.event_type(), event_id = %record.id()))]
    pub async fn dispatch(
        &self,
        record: &EventRecord,
        cancel: &CancellationToken,
    ) -> Result<usize, DispatchError> {
        let Some(route) = self.table.route(&record.event_type_id()) else {
            tracing::debug!("no handlers registered");
            return Ok(0);
        };

        for handler in &route.handlers {
            if let Err(source) = handler.handle(record, cancel).await {
                metrics::counter!("event_handler_failures_total", "handler" => handler.name())
                    .increment(1);
                tracing::error!(handler = handler.name(), error = %source, "event handler failed");
                return Err(DispatchError::Handler {
                    handler: handler.name(),
                    event_type: record.event_type(),
                    event_id: record.id(),
                    delivered: 0,
                    source,
                });
            }
            tracing::trace!(handler = handler.name(), "handler completed");
        }

        metrics::counter!("events_dispatched_total", "event_type" => record.event_type())
            .increment(1);
        Ok(route.handlers.len())
    }

    /// Dispatches each record in order, sequentially.
    ///
    /// Cancellation is checked before each event. The first failure aborts
    /// the rest of the batch; the error reports how many events were fully
    /// delivered before it.
    pub async fn dispatch_all(
        &self,
        records: &[EventRecord],
        cancel: &CancellationToken,
    ) -> Result<usize, DispatchError> {
        for (delivered, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled { delivered });
            }
            self.dispatch(record, cancel)
                .await
                .map_err(|e| e.with_delivered(delivered))?;
        }
        Ok(records.len())
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("table", &self.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use common::GenreId;
    use tokio::sync::RwLock;

    #[derive(Debug, serde::Serialize)]
    struct Pinged {
        genre_id: GenreId,
        at: DateTime<Utc>,
    }

    crate::domain_event!(Pinged, "Genre", id = genre_id, at = at);

    #[derive(Debug, serde::Serialize)]
    struct Ponged {
        genre_id: GenreId,
        at: DateTime<Utc>,
    }

    crate::domain_event!(Ponged, "Genre", id = genre_id, at = at);

    fn pinged(id: i64) -> EventRecord {
        EventRecord::new(Pinged {
            genre_id: GenreId::new(id).unwrap(),
            at: Utc::now(),
        })
    }

    fn ponged(id: i64) -> EventRecord {
        EventRecord::new(Ponged {
            genre_id: GenreId::new(id).unwrap(),
            at: Utc::now(),
        })
    }

    /// Records every call into a shared journal.
    struct Journal {
        name: &'static str,
        calls: Arc<RwLock<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler<Pinged> for Journal {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, event: &Pinged, _cancel: &CancellationToken) -> Result<(), HandlerError> {
            self.calls
                .write()
                .await
                .push(format!("{}:ping:{}", self.name, event.genre_id));
            if self.fail {
                return Err(HandlerError::failed("boom"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EventHandler<Ponged> for Journal {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, event: &Ponged, _cancel: &CancellationToken) -> Result<(), HandlerError> {
            self.calls
                .write()
                .await
                .push(format!("{}:pong:{}", self.name, event.genre_id));
            Ok(())
        }
    }

    fn journal(name: &'static str, calls: &Arc<RwLock<Vec<String>>>, fail: bool) -> Arc<Journal> {
        Arc::new(Journal {
            name,
            calls: calls.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let calls = Arc::new(RwLock::new(Vec::new()));
        let table = RoutingTable::builder()
            .route::<Pinged, _>(journal("first", &calls, false))
            .route::<Pinged, _>(journal("second", &calls, false))
            .build();
        let router = EventRouter::new(table);

        let invoked = router
            .dispatch(&pinged(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(invoked, 2);
        assert_eq!(*calls.read().await, vec!["first:ping:1", "second:ping:1"]);
    }

    #[tokio::test]
    async fn test_unregistered_event_is_noop() {
        let calls = Arc::new(RwLock::new(Vec::new()));
        let table = RoutingTable::builder()
            .route::<Pinged, _>(journal("only", &calls, false))
            .build();
        let router = EventRouter::new(table);

        let invoked = router
            .dispatch(&ponged(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(invoked, 0);
        assert!(calls.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_routes_by_concrete_type() {
        let calls = Arc::new(RwLock::new(Vec::new()));
        let handler = journal("j", &calls, false);
        let table = RoutingTable::builder()
            .route::<Pinged, _>(handler.clone())
            .route::<Ponged, _>(handler)
            .build();
        let router = EventRouter::new(table);

        router
            .dispatch_all(&[pinged(1), ponged(2), pinged(3)], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            *calls.read().await,
            vec!["j:ping:1", "j:pong:2", "j:ping:3"]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_rest_of_batch() {
        let calls = Arc::new(RwLock::new(Vec::new()));
        let table = RoutingTable::builder()
            .route::<Pinged, _>(journal("bad", &calls, true))
            .route::<Pinged, _>(journal("after", &calls, false))
            .route::<Ponged, _>(journal("pong", &calls, false))
            .build();
        let router = EventRouter::new(table);

        let err = router
            .dispatch_all(&[ponged(1), pinged(2), ponged(3)], &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.delivered(), 1);
        assert!(matches!(err, DispatchError::Handler { handler: "bad", .. }));
        assert_eq!(*calls.read().await, vec!["pong:pong:1", "bad:ping:2"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_events() {
        let calls = Arc::new(RwLock::new(Vec::new()));
        let table = RoutingTable::builder()
            .route::<Pinged, _>(journal("j", &calls, false))
            .build();
        let router = EventRouter::new(table);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = router
            .dispatch_all(&[pinged(1), pinged(2)], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled { delivered: 0 }));
        assert!(calls.read().await.is_empty());
    }

    #[test]
    fn test_table_introspection() {
        let calls = Arc::new(RwLock::new(Vec::new()));
        let table = RoutingTable::builder()
            .route::<Pinged, _>(journal("a", &calls, false))
            .route::<Pinged, _>(journal("b", &calls, false))
            .route::<Ponged, _>(journal("c", &calls, false))
            .build();

        assert_eq!(table.route_count(), 2);
        assert_eq!(table.handler_count(), 3);
        assert_eq!(table.handler_names::<Pinged>(), vec!["a", "b"]);
        assert!(format!("{table:?}").contains("Ponged"));
    }

    #[tokio::test]
    async fn test_empty_router_accepts_everything() {
        let router = EventRouter::empty();
        let dispatched = router
            .dispatch_all(&[pinged(1), ponged(2)], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(dispatched, 2);
    }
}
