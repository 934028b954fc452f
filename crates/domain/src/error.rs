//! Domain error types.

use std::any::Any;

use common::{EventId, InvalidId};
use storage::StorageError;
use thiserror::Error;

use crate::account::AccountError;
use crate::book::BookError;
use crate::genre::GenreError;
use crate::order::OrderError;
use crate::unit_of_work::CommitReceipt;

/// Failure reported by an event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler observed the cancellation signal and stopped.
    #[error("Handler cancelled")]
    Cancelled,

    /// A storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Errors that abort the dispatch of a batch of events.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler returned an error; later handlers and events were skipped.
    #[error("Handler {handler} failed on {event_type} ({event_id}): {source}")]
    Handler {
        handler: &'static str,
        event_type: &'static str,
        event_id: EventId,
        delivered: usize,
        #[source]
        source: HandlerError,
    },

    /// Cancellation was requested between two events.
    #[error("Dispatch cancelled after {delivered} event(s)")]
    Cancelled { delivered: usize },
}

impl DispatchError {
    /// Number of events fully delivered before the failure.
    pub fn delivered(&self) -> usize {
        match self {
            DispatchError::Handler { delivered, .. } | DispatchError::Cancelled { delivered } => {
                *delivered
            }
        }
    }

    pub(crate) fn with_delivered(mut self, count: usize) -> Self {
        match &mut self {
            DispatchError::Handler { delivered, .. } | DispatchError::Cancelled { delivered } => {
                *delivered = count
            }
        }
        self
    }
}

/// Errors returned by [`UnitOfWork::commit`](crate::UnitOfWork::commit).
#[derive(Debug, Error)]
pub enum CommitError {
    /// Cancellation was requested before anything was written.
    #[error("Commit cancelled before write")]
    Cancelled,

    /// Aggregate state could not be serialized; nothing was written.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The atomic write failed; nothing was written or dispatched.
    #[error("Persistence failure: {0}")]
    Persistence(#[source] StorageError),

    /// The write is durable but dispatch stopped early.
    #[error(
        "Write committed ({} rows) but {undispatched} event(s) were not dispatched: {source}",
        .receipt.rows_written
    )]
    Dispatch {
        receipt: CommitReceipt,
        undispatched: usize,
        #[source]
        source: DispatchError,
    },
}

/// Coarse classification used at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Persistence,
    Dispatch,
    Cancelled,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Persistence => "persistence",
            ErrorClass::Dispatch => "dispatch",
            ErrorClass::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the genre aggregate.
    #[error("Genre error: {0}")]
    Genre(#[from] GenreError),

    /// An error occurred in the book aggregate.
    #[error("Book error: {0}")]
    Book(#[from] BookError),

    /// An error occurred in the account aggregate.
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// A raw identity was not positive.
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    /// Aggregate not found.
    #[error("Aggregate not found: {kind} with id {id}")]
    NotFound { kind: String, id: i64 },

    /// Storage failed; the operation was not applied.
    #[error("Persistence failure: {0}")]
    Persistence(#[source] StorageError),

    /// State was committed but some side effects did not run.
    ///
    /// `committed` holds what the operation would have returned on success
    /// (the committed aggregate, or the receipt for deletions).
    #[error("Dispatch failure after commit ({undispatched} event(s) undelivered): {source}")]
    Dispatch {
        receipt: CommitReceipt,
        undispatched: usize,
        #[source]
        source: DispatchError,
        committed: Option<Box<dyn Any + Send + Sync>>,
    },

    /// The operation was cancelled before anything was written.
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Classifies the error for boundary reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            DomainError::Order(_)
            | DomainError::Genre(_)
            | DomainError::Book(_)
            | DomainError::Account(_)
            | DomainError::InvalidId(_) => ErrorClass::Validation,
            DomainError::NotFound { .. } => ErrorClass::NotFound,
            DomainError::Persistence(_) | DomainError::Serialization(_) => ErrorClass::Persistence,
            DomainError::Dispatch { .. } => ErrorClass::Dispatch,
            DomainError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// True when the primary state change is durable despite the error.
    pub fn is_committed(&self) -> bool {
        matches!(self, DomainError::Dispatch { .. })
    }

    /// Attaches the result of a committed operation to a dispatch failure.
    /// Other errors are returned unchanged.
    pub fn with_committed<T: Any + Send + Sync>(self, value: T) -> Self {
        match self {
            DomainError::Dispatch {
                receipt,
                undispatched,
                source,
                ..
            } => DomainError::Dispatch {
                receipt,
                undispatched,
                source,
                committed: Some(Box::new(value)),
            },
            other => other,
        }
    }

    /// Returns the committed result carried by a dispatch failure, if it is a `T`.
    pub fn committed<T: Any>(&self) -> Option<&T> {
        match self {
            DomainError::Dispatch {
                committed: Some(value),
                ..
            } => (**value).downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl From<StorageError> for DomainError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => DomainError::NotFound {
                kind: key.kind,
                id: key.id,
            },
            other => DomainError::Persistence(other),
        }
    }
}

impl From<CommitError> for DomainError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::Cancelled => DomainError::Cancelled,
            CommitError::Serialization(e) => DomainError::Serialization(e),
            CommitError::Persistence(e) => DomainError::Persistence(e),
            CommitError::Dispatch {
                receipt,
                undispatched,
                source,
            } => DomainError::Dispatch {
                receipt,
                undispatched,
                source,
                committed: Some(Box::new(receipt)),
            },
        }
    }
}
