//! Audit trail handler.
//!
//! Every audited event becomes one [`AuditEntry`] describing what changed.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    AccountActivated, AccountPasswordChanged, AccountProfileUpdated, AccountRegistered,
    BookCreated, BookDeleted, BookUpdated, CancellationToken, DomainEvent, EventHandler,
    GenreCreated, GenreDeleted, GenreUpdated, HandlerError, OrderCancelled, OrderConfirmed,
    OrderCreated, OrderDelivered, OrderShipped,
};
use serde_json::{Value, json};
use storage::{AuditAction, AuditEntry, AuditLogStore};

/// An event that maps onto an audit row.
pub trait Audited: DomainEvent {
    fn action(&self) -> AuditAction;

    /// Values before the change. None for creations.
    fn old_values(&self) -> Option<Value> {
        None
    }

    /// Values after the change. Defaults to the event payload.
    fn new_values(&self) -> Option<Value> {
        Some(self.payload())
    }
}

/// Writes one audit entry per event through an [`AuditLogStore`].
///
/// A store failure fails the handler, which stops dispatch of the batch.
pub struct AuditLogHandler {
    store: Arc<dyn AuditLogStore>,
    performed_by: Option<String>,
}

impl AuditLogHandler {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self {
            store,
            performed_by: None,
        }
    }

    /// Stamps every entry with the given actor.
    pub fn performed_by(mut self, actor: impl Into<String>) -> Self {
        self.performed_by = Some(actor.into());
        self
    }

    fn entry_for<E: Audited>(&self, event: &E) -> AuditEntry {
        let mut entry = AuditEntry::new(
            event.action(),
            event.aggregate_type(),
            event.aggregate_id(),
            event.old_values(),
            event.new_values(),
            self.performed_by.clone(),
        );
        entry.timestamp = event.occurred_at();
        entry
    }
}

#[async_trait]
impl<E: Audited> EventHandler<E> for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    async fn handle(&self, event: &E, cancel: &CancellationToken) -> Result<(), HandlerError> {
        if cancel.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }

        let entry = self.entry_for(event);
        tracing::debug!(
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "writing audit entry"
        );
        self.store.append(entry).await?;
        Ok(())
    }
}

/// Status transitions audit as an UPDATE from the previous status.
macro_rules! audited_status_change {
    ($ty:ty, $from:literal, $to:literal) => {
        impl Audited for $ty {
            fn action(&self) -> AuditAction {
                AuditAction::Update
            }

            fn old_values(&self) -> Option<Value> {
                Some(json!({ "status": $from }))
            }

            fn new_values(&self) -> Option<Value> {
                let mut values = self.payload();
                values["status"] = json!($to);
                Some(values)
            }
        }
    };
}

impl Audited for OrderCreated {
    fn action(&self) -> AuditAction {
        AuditAction::Create
    }
}

audited_status_change!(OrderConfirmed, "Pending", "Confirmed");
audited_status_change!(OrderShipped, "Confirmed", "Shipping");
audited_status_change!(OrderDelivered, "Shipping", "Delivered");

impl Audited for OrderCancelled {
    fn action(&self) -> AuditAction {
        AuditAction::Update
    }

    // The prior status is not carried by the event
    fn new_values(&self) -> Option<Value> {
        Some(json!({
            "status": "Cancelled",
            "reason": self.reason,
            "cancelled_at": self.cancelled_at,
        }))
    }
}

impl Audited for GenreCreated {
    fn action(&self) -> AuditAction {
        AuditAction::Create
    }
}

impl Audited for GenreUpdated {
    fn action(&self) -> AuditAction {
        AuditAction::Update
    }

    fn old_values(&self) -> Option<Value> {
        Some(json!({ "name": self.old_name }))
    }

    fn new_values(&self) -> Option<Value> {
        Some(json!({ "name": self.new_name }))
    }
}

impl Audited for GenreDeleted {
    fn action(&self) -> AuditAction {
        AuditAction::Delete
    }

    fn old_values(&self) -> Option<Value> {
        Some(json!({ "name": self.name }))
    }

    fn new_values(&self) -> Option<Value> {
        None
    }
}

impl Audited for BookCreated {
    fn action(&self) -> AuditAction {
        AuditAction::Create
    }

    fn new_values(&self) -> Option<Value> {
        serde_json::to_value(&self.details).ok()
    }
}

impl Audited for BookUpdated {
    fn action(&self) -> AuditAction {
        AuditAction::Update
    }

    fn old_values(&self) -> Option<Value> {
        serde_json::to_value(&self.old).ok()
    }

    fn new_values(&self) -> Option<Value> {
        serde_json::to_value(&self.new).ok()
    }
}

impl Audited for BookDeleted {
    fn action(&self) -> AuditAction {
        AuditAction::Delete
    }

    fn old_values(&self) -> Option<Value> {
        Some(json!({ "title": self.title }))
    }

    fn new_values(&self) -> Option<Value> {
        None
    }
}

impl Audited for AccountRegistered {
    fn action(&self) -> AuditAction {
        AuditAction::Create
    }

    // Activation codes stay out of the audit trail
    fn new_values(&self) -> Option<Value> {
        Some(json!({
            "username": self.username,
            "email": self.email,
            "role": self.role,
        }))
    }
}

impl Audited for AccountActivated {
    fn action(&self) -> AuditAction {
        AuditAction::Update
    }

    fn old_values(&self) -> Option<Value> {
        Some(json!({ "enabled": false }))
    }

    fn new_values(&self) -> Option<Value> {
        Some(json!({ "enabled": true }))
    }
}

impl Audited for AccountPasswordChanged {
    fn action(&self) -> AuditAction {
        AuditAction::Update
    }

    fn new_values(&self) -> Option<Value> {
        Some(json!({ "password": "changed" }))
    }
}

impl Audited for AccountProfileUpdated {
    fn action(&self) -> AuditAction {
        AuditAction::Update
    }

    fn old_values(&self) -> Option<Value> {
        serde_json::to_value(&self.old).ok()
    }

    fn new_values(&self) -> Option<Value> {
        serde_json::to_value(&self.new).ok()
    }
}
