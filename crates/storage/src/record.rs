use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Addresses one persisted aggregate: its kind ("Order", "Genre", ...) and
/// its storage-assigned identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub kind: String,
    pub id: i64,
}

impl AggregateKey {
    /// Creates a key for the given aggregate kind and identity.
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

impl std::fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// A persisted aggregate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAggregate {
    pub key: AggregateKey,

    /// The aggregate's serialized business state (identity excluded).
    pub state: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One change inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the state of an existing row.
    Update {
        key: AggregateKey,
        state: serde_json::Value,
    },

    /// Remove an existing row.
    Delete { key: AggregateKey },
}

impl WriteOp {
    /// Returns the key this operation targets.
    pub fn key(&self) -> &AggregateKey {
        match self {
            WriteOp::Update { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// A set of changes that a backend must apply atomically: all or none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation to the batch.
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Adds a state update.
    pub fn update(mut self, key: AggregateKey, state: serde_json::Value) -> Self {
        self.push(WriteOp::Update { key, state });
        self
    }

    /// Adds a deletion.
    pub fn delete(mut self, key: AggregateKey) -> Self {
        self.push(WriteOp::Delete { key });
        self
    }

    /// Returns the operations in insertion order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consumes the batch, returning its operations.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Rejects batches that touch the same row twice.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::with_capacity(self.ops.len());
        for op in &self.ops {
            if !seen.insert(op.key()) {
                return Err(crate::StorageError::InvalidBatch(format!(
                    "{} appears more than once",
                    op.key()
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a successful atomic write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    pub updated: usize,
    pub deleted: usize,
}

impl WriteReceipt {
    /// Total number of rows touched.
    pub fn rows(&self) -> usize {
        self.updated + self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_display() {
        assert_eq!(AggregateKey::new("Order", 42).to_string(), "Order#42");
    }

    #[test]
    fn batch_preserves_insertion_order() {
        let batch = WriteBatch::new()
            .update(AggregateKey::new("Order", 1), json!({"a": 1}))
            .delete(AggregateKey::new("Genre", 2));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ops()[0].key(), &AggregateKey::new("Order", 1));
        assert!(matches!(batch.ops()[1], WriteOp::Delete { .. }));
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn batch_rejects_duplicate_keys() {
        let batch = WriteBatch::new()
            .update(AggregateKey::new("Order", 1), json!({}))
            .delete(AggregateKey::new("Order", 1));

        assert!(matches!(
            batch.validate(),
            Err(crate::StorageError::InvalidBatch(_))
        ));
    }

    #[test]
    fn same_id_different_kind_is_not_a_duplicate() {
        let batch = WriteBatch::new()
            .update(AggregateKey::new("Order", 1), json!({}))
            .update(AggregateKey::new("Genre", 1), json!({}));

        assert!(batch.validate().is_ok());
    }

    #[test]
    fn receipt_counts_rows() {
        let receipt = WriteReceipt {
            updated: 2,
            deleted: 1,
        };
        assert_eq!(receipt.rows(), 3);
    }
}
