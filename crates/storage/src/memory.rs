use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::backend::{StorageBackend, references};
use crate::{AggregateKey, Result, StorageError, StoredAggregate, WriteBatch, WriteOp, WriteReceipt};

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<AggregateKey, StoredAggregate>,
    next_ids: HashMap<String, i64>,
    fail_on_write: bool,
    fail_on_insert: bool,
    writes: usize,
}

/// In-memory storage backend for testing.
///
/// Provides the same atomicity guarantees as the PostgreSQL backend: a
/// batch is fully validated before any row is touched. Failures can be
/// injected to exercise the commit path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `write` fail until reset.
    pub async fn set_fail_on_write(&self, fail: bool) {
        self.state.write().await.fail_on_write = fail;
    }

    /// Makes every subsequent `insert` fail until reset.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().await.fail_on_insert = fail;
    }

    /// Returns the number of batches successfully written.
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }

    /// Returns the number of stored rows.
    pub async fn row_count(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Clears all rows and counters.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.rows.clear();
        state.next_ids.clear();
        state.writes = 0;
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn insert(&self, kind: &str, state: serde_json::Value) -> Result<i64> {
        let mut store = self.state.write().await;
        if store.fail_on_insert {
            return Err(StorageError::Unavailable("insert rejected".to_string()));
        }

        let next = store.next_ids.entry(kind.to_string()).or_insert(0);
        *next += 1;
        let id = *next;

        let now = Utc::now();
        let key = AggregateKey::new(kind, id);
        store.rows.insert(
            key.clone(),
            StoredAggregate {
                key,
                state,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn write(&self, batch: WriteBatch) -> Result<WriteReceipt> {
        batch.validate()?;

        let mut store = self.state.write().await;
        if store.fail_on_write {
            return Err(StorageError::Unavailable("write rejected".to_string()));
        }

        // Validate every target before mutating anything
        if let Some(missing) = batch
            .ops()
            .iter()
            .map(WriteOp::key)
            .find(|key| !store.rows.contains_key(*key))
        {
            return Err(StorageError::NotFound(missing.clone()));
        }

        let now = Utc::now();
        let mut receipt = WriteReceipt::default();
        for op in batch.into_ops() {
            match op {
                WriteOp::Update { key, state } => {
                    if let Some(row) = store.rows.get_mut(&key) {
                        row.state = state;
                        row.updated_at = now;
                        receipt.updated += 1;
                    }
                }
                WriteOp::Delete { key } => {
                    if store.rows.remove(&key).is_some() {
                        receipt.deleted += 1;
                    }
                }
            }
        }
        store.writes += 1;
        tracing::trace!(updated = receipt.updated, deleted = receipt.deleted, "batch applied");

        Ok(receipt)
    }

    async fn load(&self, key: &AggregateKey) -> Result<Option<StoredAggregate>> {
        Ok(self.state.read().await.rows.get(key).cloned())
    }

    async fn list(&self, kind: &str) -> Result<Vec<StoredAggregate>> {
        let store = self.state.read().await;
        Ok(store
            .rows
            .values()
            .filter(|row| row.key.kind == kind)
            .cloned()
            .collect())
    }

    async fn count_references(&self, kind: &str, field: &str, id: i64) -> Result<u64> {
        let store = self.state.read().await;
        let count = store
            .rows
            .values()
            .filter(|row| row.key.kind == kind)
            .filter(|row| row.state.get(field).is_some_and(|value| references(value, id)))
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageBackendExt;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_sequential_ids_per_kind() {
        let store = InMemoryStorage::new();

        let first = store.insert("Order", json!({"n": 1})).await.unwrap();
        let second = store.insert("Order", json!({"n": 2})).await.unwrap();
        let genre = store.insert("Genre", json!({"name": "Poetry"})).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(genre, 1);
        assert_eq!(store.row_count().await, 3);
    }

    #[tokio::test]
    async fn write_updates_and_deletes() {
        let store = InMemoryStorage::new();
        let order = store.insert("Order", json!({"status": "Pending"})).await.unwrap();
        let genre = store.insert("Genre", json!({"name": "Drama"})).await.unwrap();

        let batch = WriteBatch::new()
            .update(AggregateKey::new("Order", order), json!({"status": "Confirmed"}))
            .delete(AggregateKey::new("Genre", genre));

        let receipt = store.write(batch).await.unwrap();
        assert_eq!(receipt.updated, 1);
        assert_eq!(receipt.deleted, 1);

        let row = store
            .load_required(&AggregateKey::new("Order", order))
            .await
            .unwrap();
        assert_eq!(row.state["status"], "Confirmed");
        assert!(!store.exists(&AggregateKey::new("Genre", genre)).await.unwrap());
    }

    #[tokio::test]
    async fn write_is_all_or_nothing() {
        let store = InMemoryStorage::new();
        let order = store.insert("Order", json!({"status": "Pending"})).await.unwrap();

        let batch = WriteBatch::new()
            .update(AggregateKey::new("Order", order), json!({"status": "Confirmed"}))
            .update(AggregateKey::new("Order", 999), json!({}));

        let result = store.write(batch).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));

        let row = store
            .load_required(&AggregateKey::new("Order", order))
            .await
            .unwrap();
        assert_eq!(row.state["status"], "Pending");
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn injected_write_failure() {
        let store = InMemoryStorage::new();
        let order = store.insert("Order", json!({})).await.unwrap();
        store.set_fail_on_write(true).await;

        let batch = WriteBatch::new().update(AggregateKey::new("Order", order), json!({"x": 1}));
        assert!(matches!(
            store.write(batch.clone()).await,
            Err(StorageError::Unavailable(_))
        ));

        store.set_fail_on_write(false).await;
        assert!(store.write(batch).await.is_ok());
        assert_eq!(store.write_count().await, 1);
    }

    #[tokio::test]
    async fn injected_insert_failure() {
        let store = InMemoryStorage::new();
        store.set_fail_on_insert(true).await;
        assert!(store.insert("Order", json!({})).await.is_err());
        assert_eq!(store.row_count().await, 0);
    }

    #[tokio::test]
    async fn list_filters_by_kind() {
        let store = InMemoryStorage::new();
        store.insert("Genre", json!({"name": "A"})).await.unwrap();
        store.insert("Genre", json!({"name": "B"})).await.unwrap();
        store.insert("Book", json!({"title": "C"})).await.unwrap();

        let genres = store.list("Genre").await.unwrap();
        assert_eq!(genres.len(), 2);
        assert_eq!(genres[0].state["name"], "A");
        assert_eq!(genres[1].state["name"], "B");
    }

    #[tokio::test]
    async fn count_references_scans_field() {
        let store = InMemoryStorage::new();
        store.insert("Book", json!({"genre_ids": [1, 2]})).await.unwrap();
        store.insert("Book", json!({"genre_ids": [2]})).await.unwrap();
        store.insert("Book", json!({"genre_ids": []})).await.unwrap();

        assert_eq!(store.count_references("Book", "genre_ids", 2).await.unwrap(), 2);
        assert_eq!(store.count_references("Book", "genre_ids", 1).await.unwrap(), 1);
        assert_eq!(store.count_references("Book", "genre_ids", 3).await.unwrap(), 0);
        assert_eq!(store.count_references("Order", "genre_ids", 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let store = InMemoryStorage::new();
        store.insert("Order", json!({})).await.unwrap();
        store.clear().await;
        assert_eq!(store.row_count().await, 0);
        assert_eq!(store.insert("Order", json!({})).await.unwrap(), 1);
    }
}
