use async_trait::async_trait;

use crate::{AggregateKey, Result, StorageError, StoredAggregate, WriteBatch, WriteReceipt};

/// Core trait for aggregate persistence.
///
/// Implementations must be thread-safe (Send + Sync). Each unit of work
/// holds a reference to one backend and funnels every change through
/// [`write`](StorageBackend::write).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persists the state of a brand-new aggregate and returns the identity
    /// assigned to it. Identities are positive.
    async fn insert(&self, kind: &str, state: serde_json::Value) -> Result<i64>;

    /// Applies every operation of the batch atomically.
    ///
    /// Either all operations succeed or none is visible afterwards. An
    /// update or delete of a missing row fails the whole batch with
    /// [`StorageError::NotFound`].
    async fn write(&self, batch: WriteBatch) -> Result<WriteReceipt>;

    /// Loads a single row, returning None if it does not exist.
    async fn load(&self, key: &AggregateKey) -> Result<Option<StoredAggregate>>;

    /// Lists every row of the given kind ordered by identity.
    async fn list(&self, kind: &str) -> Result<Vec<StoredAggregate>>;

    /// Counts rows of `kind` whose state field `field` equals `id` or, when
    /// the field is an array, contains it.
    async fn count_references(&self, kind: &str, field: &str, id: i64) -> Result<u64>;
}

/// Extension trait providing convenience methods for storage backends.
#[async_trait]
pub trait StorageBackendExt: StorageBackend {
    /// Loads a row that must exist.
    async fn load_required(&self, key: &AggregateKey) -> Result<StoredAggregate> {
        self.load(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.clone()))
    }

    /// Checks whether a row exists.
    async fn exists(&self, key: &AggregateKey) -> Result<bool> {
        Ok(self.load(key).await?.is_some())
    }
}

impl<T: StorageBackend + ?Sized> StorageBackendExt for T {}

/// Returns true when `value` is `id` or an array containing `id`.
pub(crate) fn references(value: &serde_json::Value, id: i64) -> bool {
    match value {
        serde_json::Value::Number(n) => n.as_i64() == Some(id),
        serde_json::Value::Array(items) => items.iter().any(|item| item.as_i64() == Some(id)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn references_matches_scalar() {
        assert!(references(&json!(7), 7));
        assert!(!references(&json!(8), 7));
    }

    #[test]
    fn references_matches_array_member() {
        assert!(references(&json!([1, 7, 9]), 7));
        assert!(!references(&json!([1, 9]), 7));
    }

    #[test]
    fn references_ignores_other_shapes() {
        assert!(!references(&json!("7"), 7));
        assert!(!references(&json!(null), 7));
        assert!(!references(&json!({"id": 7}), 7));
    }
}
