//! The routing table of the storefront.
//!
//! Every event type and its handlers are listed here, in dispatch order.
//! Adding an event type means adding a line below.

use std::sync::Arc;

use domain::{
    AccountActivated, AccountPasswordChanged, AccountProfileUpdated, AccountRegistered,
    BookCreated, BookDeleted, BookUpdated, GenreCreated, GenreDeleted, GenreUpdated,
    OrderCancelled, OrderConfirmed, OrderCreated, OrderDelivered, OrderShipped, RoutingTable,
};
use storage::AuditLogStore;

use crate::audit::AuditLogHandler;
use crate::cache::{CacheInvalidationHandler, QueryCache};
use crate::logging::ActivityLogHandler;
use crate::notification::{NotificationHandler, Notifier};

/// External collaborators the handlers write to.
#[derive(Clone)]
pub struct Collaborators {
    pub audit_log: Arc<dyn AuditLogStore>,
    pub cache: Arc<dyn QueryCache>,
    pub notifier: Arc<dyn Notifier>,
    pub admin_emails: Vec<String>,
}

macro_rules! register {
    ($builder:expr; $($event:ty => [$($handler:ident),+ $(,)?]),+ $(,)?) => {{
        let mut builder = $builder;
        $($(builder = builder.route::<$event, _>($handler.clone());)+)+
        builder
    }};
}

/// Builds the routing table.
///
/// Per event: activity log, cache invalidation, audit, then notification.
/// A failed audit write stops the notification for that event.
pub fn routing_table(collaborators: &Collaborators) -> RoutingTable {
    let activity = Arc::new(ActivityLogHandler::new());
    let cache = Arc::new(CacheInvalidationHandler::new(collaborators.cache.clone()));
    let audit = Arc::new(AuditLogHandler::new(collaborators.audit_log.clone()));
    let notify = Arc::new(NotificationHandler::new(
        collaborators.notifier.clone(),
        collaborators.admin_emails.clone(),
    ));

    let builder = register!(RoutingTable::builder();
        OrderCreated => [activity, cache, audit, notify],
        OrderConfirmed => [activity, cache, audit, notify],
        OrderShipped => [activity, cache, audit, notify],
        OrderDelivered => [activity, cache, audit, notify],
        OrderCancelled => [activity, cache, audit, notify],

        GenreCreated => [activity, cache, audit, notify],
        GenreUpdated => [activity, cache, audit, notify],
        GenreDeleted => [activity, cache, audit, notify],

        BookCreated => [activity, cache, audit],
        BookUpdated => [activity, cache, audit],
        BookDeleted => [activity, cache, audit],

        AccountRegistered => [activity, audit, notify],
        AccountActivated => [activity, audit, notify],
        AccountPasswordChanged => [activity, audit],
        AccountProfileUpdated => [activity, audit],
    );

    let table = builder.build();
    tracing::debug!(
        routes = table.route_count(),
        handlers = table.handler_count(),
        "routing table built"
    );
    table
}
