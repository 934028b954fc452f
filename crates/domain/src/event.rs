//! Domain events and the records that carry them through dispatch.

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::EventId;

/// Upcast to `&dyn Any` so the router can recover the concrete event type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Trait for domain events.
///
/// Domain events represent facts that have happened to an aggregate.
/// They are immutable, named in past tense, and carry no reference back
/// to the aggregate that produced them.
pub trait DomainEvent: AsAny + Debug + Send + Sync + 'static {
    /// Returns the stable event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the kind of aggregate that produced the event.
    fn aggregate_type(&self) -> &'static str;

    /// Returns the identity of the aggregate that produced the event.
    fn aggregate_id(&self) -> i64;

    /// Returns when the fact occurred.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Returns a JSON view of the event fields.
    fn payload(&self) -> serde_json::Value;
}

impl dyn DomainEvent {
    /// Returns the concrete event if it is of type `E`.
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Returns the `TypeId` of the concrete event type.
    pub fn concrete_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }
}

/// Implements [`DomainEvent`] for a serializable event struct.
///
/// `id` names the field holding the aggregate identity and `at` the field
/// holding the occurrence timestamp.
#[macro_export]
macro_rules! domain_event {
    ($ty:ty, $aggregate:literal, id = $id:ident, at = $at:ident) => {
        impl $crate::event::DomainEvent for $ty {
            fn event_type(&self) -> &'static str {
                stringify!($ty)
            }

            fn aggregate_type(&self) -> &'static str {
                $aggregate
            }

            fn aggregate_id(&self) -> i64 {
                self.$id.as_i64()
            }

            fn occurred_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.$at
            }

            fn payload(&self) -> ::serde_json::Value {
                ::serde_json::to_value(self).unwrap_or_default()
            }
        }
    };
}

/// A harvested event on its way to the router.
///
/// Each record gets a fresh [`EventId`] when the aggregate records the
/// event; the id only serves log and audit correlation.
#[derive(Debug, Clone)]
pub struct EventRecord {
    id: EventId,
    event: Arc<dyn DomainEvent>,
}

impl EventRecord {
    /// Wraps an event with a new id.
    pub fn new<E: DomainEvent>(event: E) -> Self {
        Self {
            id: EventId::new(),
            event: Arc::new(event),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event(&self) -> &dyn DomainEvent {
        self.event.as_ref()
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Returns the `TypeId` of the wrapped event, used as the routing key.
    pub fn event_type_id(&self) -> TypeId {
        self.event().concrete_type_id()
    }

    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.event().downcast_ref::<E>()
    }

    /// Returns true if the wrapped event is of type `E`.
    pub fn is<E: DomainEvent>(&self) -> bool {
        self.event_type_id() == TypeId::of::<E>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::GenreId;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Renamed {
        genre_id: GenreId,
        name: String,
        renamed_at: DateTime<Utc>,
    }

    domain_event!(Renamed, "Genre", id = genre_id, at = renamed_at);

    #[derive(Debug, Serialize)]
    struct Removed {
        genre_id: GenreId,
        removed_at: DateTime<Utc>,
    }

    domain_event!(Removed, "Genre", id = genre_id, at = removed_at);

    fn renamed() -> Renamed {
        Renamed {
            genre_id: GenreId::new(3).unwrap(),
            name: "Poetry".to_string(),
            renamed_at: Utc::now(),
        }
    }

    #[test]
    fn test_macro_fills_metadata() {
        let event = renamed();
        assert_eq!(event.event_type(), "Renamed");
        assert_eq!(event.aggregate_type(), "Genre");
        assert_eq!(event.aggregate_id(), 3);
        assert_eq!(event.payload()["name"], "Poetry");
    }

    #[test]
    fn test_record_downcasts_to_concrete_type() {
        let record = EventRecord::new(renamed());
        assert_eq!(record.event_type(), "Renamed");
        assert_eq!(record.event_type_id(), TypeId::of::<Renamed>());
        assert!(record.is::<Renamed>());
        assert!(!record.is::<Removed>());
        assert_eq!(record.downcast_ref::<Renamed>().unwrap().name, "Poetry");
        assert!(record.downcast_ref::<Removed>().is_none());
    }

    #[test]
    fn test_records_get_distinct_ids() {
        let a = EventRecord::new(renamed());
        let b = EventRecord::new(renamed());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_clone_shares_event() {
        let record = EventRecord::new(renamed());
        let copy = record.clone();
        assert_eq!(record.id(), copy.id());
        assert!(copy.is::<Renamed>());
    }
}
