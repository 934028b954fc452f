//! Core aggregate traits and the pending-event buffer.

use std::fmt::{Debug, Display};

use common::InvalidId;
use serde::{Serialize, de::DeserializeOwned};
use storage::{AggregateKey, WriteOp};

use crate::event::{DomainEvent, EventRecord};

/// Ordered buffer of events an aggregate produced but nobody has dispatched.
///
/// Only aggregate transition methods inside this crate can record events,
/// so every buffered event corresponds to a state change that actually
/// happened.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<EventRecord>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record<E: DomainEvent>(&mut self, event: E) {
        self.events.push(EventRecord::new(event));
    }

    /// Returns the pending events in the order they were recorded.
    pub fn pending(&self) -> &[EventRecord] {
        &self.events
    }

    /// Drains the buffer, returning its events in recording order.
    pub fn take(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Capability of an aggregate that accumulates domain events.
///
/// Read and drain only; events are added by the aggregate's own transitions.
pub trait HasDomainEvents {
    /// Returns the events recorded since the last harvest.
    fn pending_events(&self) -> &[EventRecord];

    /// Removes and returns every pending event.
    fn take_events(&mut self) -> Vec<EventRecord>;

    /// Discards every pending event.
    fn clear_events(&mut self);
}

/// An aggregate a unit of work can persist.
pub trait TrackedAggregate: HasDomainEvents + Send {
    /// Returns the storage key of the aggregate.
    fn key(&self) -> AggregateKey;

    /// Returns the storage change that persists the current state.
    fn write_op(&self) -> Result<WriteOp, serde_json::Error>;
}

/// A persisted aggregate root with a typed identity and serializable state.
///
/// Implemented by `Order`, `Genre`, `Book` and `Account`. Their `New*`
/// counterparts have no identity and therefore no event-raising methods.
pub trait AggregateRoot: TrackedAggregate + Sized + Sync + 'static {
    /// Typed identity assigned by storage.
    type Id: Copy + Debug + Display + Into<i64> + TryFrom<i64, Error = InvalidId> + Send + Sync;

    /// Business state stored as the row payload.
    type Data: Serialize + DeserializeOwned + Send + Sync;

    /// Storage kind, e.g. "Order".
    const KIND: &'static str;

    fn id(&self) -> Self::Id;

    fn data(&self) -> &Self::Data;

    /// Rebuilds the aggregate from persisted state, with an empty buffer.
    fn restore(id: Self::Id, data: Self::Data) -> Self;
}

/// Builds the storage key for an aggregate root.
pub fn key_of<A: AggregateRoot>(aggregate: &A) -> AggregateKey {
    AggregateKey::new(A::KIND, aggregate.id().into())
}

/// Builds an update operation carrying the aggregate's current state.
pub fn update_op<A: AggregateRoot>(aggregate: &A) -> Result<WriteOp, serde_json::Error> {
    Ok(WriteOp::Update {
        key: key_of(aggregate),
        state: serde_json::to_value(aggregate.data())?,
    })
}

/// Builds a delete operation for the aggregate's row.
pub fn delete_op<A: AggregateRoot>(aggregate: &A) -> WriteOp {
    WriteOp::Delete {
        key: key_of(aggregate),
    }
}

/// Implements [`HasDomainEvents`] for a type with an `events: EventBuffer` field.
macro_rules! impl_has_domain_events {
    ($ty:ty) => {
        impl $crate::aggregate::HasDomainEvents for $ty {
            fn pending_events(&self) -> &[$crate::event::EventRecord] {
                self.events.pending()
            }

            fn take_events(&mut self) -> Vec<$crate::event::EventRecord> {
                self.events.take()
            }

            fn clear_events(&mut self) {
                self.events.clear();
            }
        }
    };
}

pub(crate) use impl_has_domain_events;
