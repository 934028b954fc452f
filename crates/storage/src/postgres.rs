use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    AggregateKey, Result, StorageError, StoredAggregate, WriteBatch, WriteOp, WriteReceipt,
    audit::{AuditAction, AuditEntry, AuditLogStore},
    backend::StorageBackend,
};

/// PostgreSQL-backed storage implementation.
///
/// Each aggregate is one JSONB row in `aggregates`, keyed by `(kind, id)`.
/// Write batches run inside a single transaction.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new PostgreSQL storage backend.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_aggregate(row: PgRow) -> Result<StoredAggregate> {
        Ok(StoredAggregate {
            key: AggregateKey::new(row.try_get::<String, _>("kind")?, row.try_get("id")?),
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl StorageBackend for PostgresStorage {
    async fn insert(&self, kind: &str, state: serde_json::Value) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO aggregates (kind, state)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(kind)
        .bind(&state)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    #[tracing::instrument(skip_all, fields(ops = batch.len()))]
    async fn write(&self, batch: WriteBatch) -> Result<WriteReceipt> {
        batch.validate()?;

        let mut tx = self.pool.begin().await?;
        let mut receipt = WriteReceipt::default();

        for op in batch.into_ops() {
            // Dropping the transaction on early return rolls it back
            match op {
                WriteOp::Update { key, state } => {
                    let result = sqlx::query(
                        r#"
                        UPDATE aggregates
                        SET state = $3, updated_at = NOW()
                        WHERE kind = $1 AND id = $2
                        "#,
                    )
                    .bind(&key.kind)
                    .bind(key.id)
                    .bind(&state)
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() != 1 {
                        return Err(StorageError::NotFound(key));
                    }
                    receipt.updated += 1;
                }
                WriteOp::Delete { key } => {
                    let result = sqlx::query("DELETE FROM aggregates WHERE kind = $1 AND id = $2")
                        .bind(&key.kind)
                        .bind(key.id)
                        .execute(&mut *tx)
                        .await?;

                    if result.rows_affected() != 1 {
                        return Err(StorageError::NotFound(key));
                    }
                    receipt.deleted += 1;
                }
            }
        }

        tx.commit().await?;
        metrics::counter!("storage_rows_written_total").increment(receipt.rows() as u64);
        tracing::debug!(updated = receipt.updated, deleted = receipt.deleted, "batch committed");
        Ok(receipt)
    }

    async fn load(&self, key: &AggregateKey) -> Result<Option<StoredAggregate>> {
        let row = sqlx::query(
            r#"
            SELECT kind, id, state, created_at, updated_at
            FROM aggregates
            WHERE kind = $1 AND id = $2
            "#,
        )
        .bind(&key.kind)
        .bind(key.id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_aggregate).transpose()
    }

    async fn list(&self, kind: &str) -> Result<Vec<StoredAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, id, state, created_at, updated_at
            FROM aggregates
            WHERE kind = $1
            ORDER BY id ASC
            "#,
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_aggregate).collect()
    }

    async fn count_references(&self, kind: &str, field: &str, id: i64) -> Result<u64> {
        // jsonb containment matches both a scalar field and an array member
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM aggregates
            WHERE kind = $1 AND state -> $2 @> to_jsonb($3::bigint)
            "#,
        )
        .bind(kind)
        .bind(field)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}

/// PostgreSQL-backed audit log.
#[derive(Clone)]
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: PgRow) -> Result<AuditEntry> {
        let action: String = row.try_get("action")?;
        Ok(AuditEntry {
            id: row.try_get("id")?,
            action: action.parse::<AuditAction>()?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            old_values: row.try_get("old_values")?,
            new_values: row.try_get("new_values")?,
            timestamp: row.try_get("timestamp")?,
            performed_by: row.try_get("performed_by")?,
        })
    }
}

#[async_trait]
impl AuditLogStore for PostgresAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, action, entity_type, entity_id, old_values, new_values, timestamp, performed_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(entry.timestamp)
        .bind(&entry.performed_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, entity_type, entity_id, old_values, new_values, timestamp, performed_by
            FROM audit_log
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY position ASC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn all(&self) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, entity_type, entity_id, old_values, new_values, timestamp, performed_by
            FROM audit_log
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
