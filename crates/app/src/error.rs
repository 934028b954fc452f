//! Application error types and the boundary mapping of domain errors.

use domain::{
    AccountError, BookError, CommitReceipt, DomainError, ErrorClass, GenreError, OrderError,
};
use serde::Serialize;
use serde_json::{Value, json};
use storage::StorageError;
use thiserror::Error;

/// Failures while starting the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),
}

/// Outcome class reported to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

impl Status {
    /// Equivalent HTTP status code.
    pub fn code(&self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::Conflict => 409,
            Status::Internal => 500,
        }
    }
}

/// A domain failure translated for the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryError {
    pub status: Status,
    pub message: String,

    /// The state change is durable even though the operation failed.
    pub committed: bool,
}

impl BoundaryError {
    pub fn body(&self) -> Value {
        json!({ "error": self.message, "status": self.status, "committed": self.committed })
    }
}

impl From<DomainError> for BoundaryError {
    fn from(err: DomainError) -> Self {
        let status = status_of(&err);
        if status == Status::Internal {
            tracing::error!(error = %err, class = %err.class(), "internal error");
        }
        Self {
            status,
            message: err.to_string(),
            committed: err.is_committed(),
        }
    }
}

fn status_of(err: &DomainError) -> Status {
    match err {
        DomainError::Order(e) => match e {
            OrderError::InvalidState { .. } | OrderError::AlreadyAnnounced { .. } => {
                Status::Conflict
            }
            OrderError::InvalidAccount { .. }
            | OrderError::EmptyOrder
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::CancellationReasonRequired
            | OrderError::AmountOverflow
            | OrderError::InsufficientStock { .. } => Status::BadRequest,
        },
        DomainError::Genre(e) => match e {
            GenreError::BlankName => Status::BadRequest,
            GenreError::HasDependents { .. }
            | GenreError::AlreadyAnnounced { .. }
            | GenreError::MarkedForDeletion { .. } => Status::Conflict,
        },
        DomainError::Book(e) => match e {
            BookError::BlankField { .. } | BookError::InvalidPrice { .. } => Status::BadRequest,
            BookError::InUse { .. }
            | BookError::AlreadyAnnounced { .. }
            | BookError::MarkedForDeletion { .. } => Status::Conflict,
        },
        DomainError::Account(e) => match e {
            AccountError::BlankField { .. }
            | AccountError::InvalidEmail { .. }
            | AccountError::InvalidActivationCode => Status::BadRequest,
            AccountError::AlreadyActive { .. } | AccountError::AlreadyAnnounced { .. } => {
                Status::Conflict
            }
        },
        DomainError::InvalidId(_) => Status::BadRequest,
        DomainError::NotFound { .. } => Status::NotFound,
        DomainError::Persistence(_)
        | DomainError::Serialization(_)
        | DomainError::Dispatch { .. }
        | DomainError::Cancelled => Status::Internal,
    }
}

/// Result of an operation whose state change reached storage.
#[derive(Debug)]
pub enum Reported<T> {
    Completed(T),

    /// The write is durable but some side effects did not run.
    ///
    /// `value` is what the operation would have returned, when the failure
    /// carried one of the expected type.
    CommittedWithWarning {
        value: Option<T>,
        receipt: CommitReceipt,
        undispatched: usize,
        warning: String,
    },
}

impl<T> Reported<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Reported::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Reported::Completed(value) => Some(value),
            Reported::CommittedWithWarning { .. } => None,
        }
    }

    /// The committed value, whether or not every side effect ran.
    pub fn into_value(self) -> Option<T> {
        match self {
            Reported::Completed(value) => Some(value),
            Reported::CommittedWithWarning { value, .. } => value,
        }
    }
}

/// Separates committed-with-warning outcomes from real failures.
///
/// A dispatch failure is not reported as an error: the primary change is
/// durable and must not be retried.
pub fn report<T: 'static>(result: Result<T, DomainError>) -> Result<Reported<T>, BoundaryError> {
    match result {
        Ok(value) => Ok(Reported::Completed(value)),
        Err(DomainError::Dispatch {
            receipt,
            undispatched,
            source,
            committed,
        }) => {
            tracing::warn!(
                rows = receipt.rows_written,
                undispatched,
                error = %source,
                "committed with undispatched events"
            );
            let value = committed
                .and_then(|value| value.downcast::<T>().ok())
                .map(|value| *value);
            Ok(Reported::CommittedWithWarning {
                value,
                receipt,
                undispatched,
                warning: source.to_string(),
            })
        }
        Err(err) => {
            debug_assert_ne!(err.class(), ErrorClass::Dispatch);
            Err(err.into())
        }
    }
}
