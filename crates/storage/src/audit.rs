//! Audit trail rows written by the audit handler.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Result, StorageError};

/// Kind of change recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(StorageError::Corrupt(format!("unknown audit action {other}"))),
        }
    }
}

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,

    /// Entity kind, e.g. "Orders" or "Genre".
    pub entity_type: String,
    pub entity_id: String,

    /// Previous values; None for creations.
    pub old_values: Option<serde_json::Value>,

    /// New values; None for deletions.
    pub new_values: Option<serde_json::Value>,

    pub timestamp: DateTime<Utc>,
    pub performed_by: Option<String>,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
        performed_by: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            old_values,
            new_values,
            timestamp: Utc::now(),
            performed_by,
        }
    }
}

/// Persistence for audit entries.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Appends one entry.
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// Returns the entries of one entity, oldest first.
    async fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>>;

    /// Returns every entry, oldest first.
    async fn all(&self) -> Result<Vec<AuditEntry>>;
}

#[derive(Debug, Default)]
struct AuditState {
    entries: Vec<AuditEntry>,
    fail_on_append: bool,
}

/// In-memory audit log for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    state: Arc<RwLock<AuditState>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent append fail until reset.
    pub async fn set_fail_on_append(&self, fail: bool) {
        self.state.write().await.fail_on_append = fail;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_append {
            return Err(StorageError::Unavailable("audit log rejected append".to_string()));
        }
        state.entries.push(entry);
        Ok(())
    }

    async fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.state.read().await.entries.clone())
    }
}
