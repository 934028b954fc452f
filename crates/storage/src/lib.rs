//! Aggregate persistence for the bookstore.
//!
//! Aggregates are stored as JSON state rows keyed by `(kind, id)`. All
//! changes of one unit of work reach storage as a single [`WriteBatch`],
//! which every backend applies atomically.

pub mod audit;
pub mod backend;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;

pub use audit::{AuditAction, AuditEntry, AuditLogStore, InMemoryAuditLog};
pub use backend::{StorageBackend, StorageBackendExt};
pub use error::{Result, StorageError};
pub use memory::InMemoryStorage;
pub use postgres::{PostgresAuditLog, PostgresStorage};
pub use record::{AggregateKey, StoredAggregate, WriteBatch, WriteOp, WriteReceipt};
