//! Side-effect handlers for committed domain events.
//!
//! This crate provides:
//! - [`AuditLogHandler`] writing one audit row per event
//! - [`CacheInvalidationHandler`] evicting stale [`QueryCache`] entries
//! - [`NotificationHandler`] handing messages to a [`Notifier`]
//! - [`ActivityLogHandler`] emitting a structured log line per event
//! - [`routing_table`], the explicit event-to-handler registration list

pub mod audit;
pub mod cache;
pub mod logging;
pub mod notification;
pub mod wiring;

pub use audit::{AuditLogHandler, Audited};
pub use cache::{CacheInvalidationHandler, InMemoryQueryCache, Invalidates, QueryCache, keys};
pub use logging::ActivityLogHandler;
pub use notification::{
    ADMIN_TOPIC, Channel, InMemoryNotifier, LogNotifier, Notification, NotificationHandler,
    Notifier,
};
pub use wiring::{Collaborators, routing_table};
