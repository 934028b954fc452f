use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Returned when a raw value is not a valid persisted identity.
///
/// Identities are assigned by the storage backend and are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} identity must be positive, got {value}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: i64,
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a storage-assigned identity, rejecting non-positive values.
            pub fn new(value: i64) -> Result<Self, InvalidId> {
                if value > 0 {
                    Ok(Self(value))
                } else {
                    Err(InvalidId { kind: $kind, value })
                }
            }

            /// Returns the raw identity value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = InvalidId;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identity of a persisted order.
    OrderId,
    "Order"
);
entity_id!(
    /// Identity of a customer or staff account.
    AccountId,
    "Account"
);
entity_id!(
    /// Identity of a catalog book.
    BookId,
    "Book"
);
entity_id!(
    /// Identity of a catalog genre.
    GenreId,
    "Genre"
);

/// Unique identifier attached to every harvested event.
///
/// Used to correlate log lines and audit rows produced for the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
