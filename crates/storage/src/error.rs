use thiserror::Error;

use crate::AggregateKey;

/// Errors that can occur when interacting with a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write targeted a row that does not exist.
    #[error("Aggregate not found: {0}")]
    NotFound(AggregateKey),

    /// The write batch was rejected before touching storage.
    #[error("Invalid write batch: {0}")]
    InvalidBatch(String),

    /// The backend refused the operation (connection lost, injected failure).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
