//! Outbound notifications for committed events.
//!
//! Rendering and transport are the notifier's concern; handlers only build
//! structured [`Notification`]s.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    AccountActivated, AccountRegistered, CancellationToken, EventHandler, GenreCreated,
    GenreDeleted, GenreUpdated, HandlerError, OrderCancelled, OrderConfirmed, OrderCreated,
    OrderDelivered, OrderShipped,
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,

    /// Push to connected admin sessions.
    Realtime,
}

/// A message addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub channel: Channel,
    pub recipient: String,
    pub subject: String,

    /// Template data for the transport.
    pub data: Value,
}

impl Notification {
    pub fn email(recipient: impl Into<String>, subject: impl Into<String>, data: Value) -> Self {
        Self {
            channel: Channel::Email,
            recipient: recipient.into(),
            subject: subject.into(),
            data,
        }
    }

    pub fn realtime(topic: impl Into<String>, subject: impl Into<String>, data: Value) -> Self {
        Self {
            channel: Channel::Realtime,
            recipient: topic.into(),
            subject: subject.into(),
            data,
        }
    }
}

/// Sends notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns false when the notification could not be delivered.
    async fn notify(&self, notification: Notification) -> bool;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    fail_on_notify: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to report every delivery as failed.
    pub async fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().await.fail_on_notify = fail;
    }

    /// Returns the notifications delivered so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.state.read().await.sent.clone()
    }

    pub async fn sent_to(&self, recipient: &str) -> Vec<Notification> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> bool {
        let mut state = self.state.write().await;
        if state.fail_on_notify {
            return false;
        }
        state.sent.push(notification);
        true
    }
}

/// Notifier that only records notifications in the log.
///
/// Used when no transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> bool {
        tracing::info!(
            channel = ?notification.channel,
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification"
        );
        true
    }
}

/// Realtime topic for admin sessions.
pub const ADMIN_TOPIC: &str = "admins";

/// Notifies admins about catalog and order changes and account holders
/// about their registration.
///
/// An undelivered notification is logged as a warning; it never fails the
/// handler.
pub struct NotificationHandler {
    notifier: Arc<dyn Notifier>,
    admin_emails: Vec<String>,
}

impl NotificationHandler {
    pub fn new(notifier: Arc<dyn Notifier>, admin_emails: Vec<String>) -> Self {
        Self {
            notifier,
            admin_emails,
        }
    }

    pub fn admin_emails(&self) -> &[String] {
        &self.admin_emails
    }

    fn to_admins(&self, subject: &str, data: &Value) -> Vec<Notification> {
        self.admin_emails
            .iter()
            .map(|email| Notification::email(email.clone(), subject, data.clone()))
            .collect()
    }

    async fn deliver(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let recipient = notification.recipient.clone();
            let channel = notification.channel;
            if self.notifier.notify(notification).await {
                tracing::debug!(%recipient, ?channel, "notification sent");
            } else {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(%recipient, ?channel, "notification not delivered");
            }
        }
    }
}

#[async_trait]
impl EventHandler<OrderCreated> for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &OrderCreated, _cancel: &CancellationToken) -> Result<(), HandlerError> {
        let data = json!({
            "order_id": event.order_id,
            "account_id": event.account_id,
            "total": event.total,
            "item_count": event.lines.len(),
            "total_quantity": event.lines.iter().map(|l| u64::from(l.quantity)).sum::<u64>(),
            "lines": event.lines,
            "order_date": event.order_date,
        });
        let subject = format!("New order #{}", event.order_id);

        let mut notifications = vec![Notification::realtime(ADMIN_TOPIC, &subject, data.clone())];
        notifications.extend(self.to_admins(&subject, &data));
        self.deliver(notifications).await;
        Ok(())
    }
}

/// Order status changes are mailed to every admin.
macro_rules! notify_admins {
    ($ty:ty, |$event:ident| $subject:expr) => {
        #[async_trait]
        impl EventHandler<$ty> for NotificationHandler {
            fn name(&self) -> &'static str {
                "notification"
            }

            async fn handle(&self, $event: &$ty, _cancel: &CancellationToken) -> Result<(), HandlerError> {
                let data = serde_json::to_value($event).unwrap_or_default();
                let subject: String = $subject;
                self.deliver(self.to_admins(&subject, &data)).await;
                Ok(())
            }
        }
    };
}

notify_admins!(OrderConfirmed, |e| format!("Order confirmed: #{}", e.order_id));
notify_admins!(OrderShipped, |e| format!("Order shipped: #{}", e.order_id));
notify_admins!(OrderDelivered, |e| format!("Order delivered: #{}", e.order_id));
notify_admins!(OrderCancelled, |e| format!("Order cancelled: #{}", e.order_id));
notify_admins!(GenreCreated, |e| format!("New genre: {}", e.name));
notify_admins!(GenreUpdated, |e| format!(
    "Genre renamed: {} -> {}",
    e.old_name, e.new_name
));
notify_admins!(GenreDeleted, |e| format!("Genre deleted: {}", e.name));

#[async_trait]
impl EventHandler<AccountRegistered> for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(
        &self,
        event: &AccountRegistered,
        _cancel: &CancellationToken,
    ) -> Result<(), HandlerError> {
        // Accounts created active need no activation mail
        let Some(code) = &event.activation_code else {
            return Ok(());
        };

        let data = json!({
            "account_id": event.account_id,
            "username": event.username,
            "activation_code": code,
        });
        self.deliver(vec![Notification::email(
            event.email.clone(),
            "Activate your account",
            data,
        )])
        .await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler<AccountActivated> for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(
        &self,
        event: &AccountActivated,
        _cancel: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let data = json!({ "account_id": event.account_id, "activated_at": event.activated_at });
        let notification =
            Notification::realtime(ADMIN_TOPIC, format!("Account #{} activated", event.account_id), data);
        self.deliver(vec![notification]).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{AccountId, BookId, OrderId};
    use domain::{Money, OrderLine};

    fn handler(notifier: &Arc<InMemoryNotifier>) -> NotificationHandler {
        NotificationHandler::new(
            notifier.clone(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()],
        )
    }

    fn created() -> OrderCreated {
        OrderCreated {
            order_id: OrderId::new(9).unwrap(),
            account_id: AccountId::new(42).unwrap(),
            order_date: Utc::now(),
            lines: vec![OrderLine::new(
                BookId::new(7).unwrap(),
                "Dune",
                2,
                Money::from_cents(1000),
            )],
            total: Money::from_cents(2000),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_new_order_notifies_realtime_and_each_admin() {
        let notifier = Arc::new(InMemoryNotifier::new());
        handler(&notifier)
            .handle(&created(), &CancellationToken::new())
            .await
            .unwrap();

        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].channel, Channel::Realtime);
        assert_eq!(sent[0].data["total_quantity"], 2);
        assert_eq!(notifier.sent_to("a@example.com").await.len(), 1);
        assert_eq!(notifier.sent_to("b@example.com").await[0].subject, "New order #9");
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_an_error() {
        let notifier = Arc::new(InMemoryNotifier::new());
        notifier.set_fail_on_notify(true).await;

        let result = handler(&notifier)
            .handle(&created(), &CancellationToken::new())
            .await;
        assert!(result.is_ok());
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_registration_sends_activation_email() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let event = AccountRegistered {
            account_id: AccountId::new(3).unwrap(),
            username: "reader".to_string(),
            email: "reader@example.com".to_string(),
            role: domain::Role::Customer,
            activation_code: Some("XYZ".to_string()),
            registered_at: Utc::now(),
        };
        handler(&notifier)
            .handle(&event, &CancellationToken::new())
            .await
            .unwrap();

        let sent = notifier.sent_to("reader@example.com").await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data["activation_code"], "XYZ");
    }

    #[tokio::test]
    async fn test_registration_without_code_sends_nothing() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let event = AccountRegistered {
            account_id: AccountId::new(3).unwrap(),
            username: "walk-in".to_string(),
            email: "walk-in@example.com".to_string(),
            role: domain::Role::Customer,
            activation_code: None,
            registered_at: Utc::now(),
        };
        handler(&notifier)
            .handle(&event, &CancellationToken::new())
            .await
            .unwrap();

        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_mails_admins() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let event = OrderCancelled {
            order_id: OrderId::new(9).unwrap(),
            account_id: AccountId::new(42).unwrap(),
            cancelled_at: Utc::now(),
            reason: "Out of stock".to_string(),
        };
        handler(&notifier)
            .handle(&event, &CancellationToken::new())
            .await
            .unwrap();

        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|n| n.channel == Channel::Email));
        assert_eq!(sent[0].data["reason"], "Out of stock");
    }
}
