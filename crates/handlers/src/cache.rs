//! Query cache and the handler that evicts stale entries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    BookCreated, BookDeleted, BookUpdated, CancellationToken, DomainEvent, EventHandler,
    GenreCreated, GenreDeleted, GenreUpdated, HandlerError, OrderCancelled, OrderConfirmed,
    OrderCreated, OrderDelivered, OrderShipped,
};
use serde_json::Value;
use tokio::sync::RwLock;

/// Cache keys shared by readers and the invalidation handler.
pub mod keys {
    pub const ORDERS_ALL: &str = "orders:all";
    pub const GENRES_ALL: &str = "genres:all";
    pub const BOOKS_ALL: &str = "books:all";

    pub fn order(id: impl std::fmt::Display) -> String {
        format!("orders:id:{id}")
    }

    pub fn account_orders(account_id: impl std::fmt::Display) -> String {
        format!("orders:account:{account_id}")
    }

    pub fn genre(id: impl std::fmt::Display) -> String {
        format!("genres:id:{id}")
    }

    pub fn book(id: impl std::fmt::Display) -> String {
        format!("books:id:{id}")
    }
}

/// Cache of query results keyed by string.
#[async_trait]
pub trait QueryCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn put(&self, key: &str, value: Value);

    /// Removes an entry. Returns true if it was present.
    async fn remove(&self, key: &str) -> bool;
}

/// In-memory query cache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueryCache {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl QueryCache for InMemoryQueryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: &str, value: Value) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }
}

/// An event that makes cached query results stale.
pub trait Invalidates: DomainEvent {
    /// Keys to evict once the event is committed.
    fn stale_keys(&self) -> Vec<String>;
}

/// Evicts every key an event makes stale.
pub struct CacheInvalidationHandler {
    cache: Arc<dyn QueryCache>,
}

impl CacheInvalidationHandler {
    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<E: Invalidates> EventHandler<E> for CacheInvalidationHandler {
    fn name(&self) -> &'static str {
        "cache_invalidation"
    }

    async fn handle(&self, event: &E, _cancel: &CancellationToken) -> Result<(), HandlerError> {
        let mut evicted = 0usize;
        for key in event.stale_keys() {
            if self.cache.remove(&key).await {
                evicted += 1;
            }
        }

        tracing::debug!(
            event_type = event.event_type(),
            aggregate_id = event.aggregate_id(),
            evicted,
            "cache invalidated"
        );
        Ok(())
    }
}

macro_rules! invalidates_order {
    ($($ty:ty),+) => {
        $(
            impl Invalidates for $ty {
                fn stale_keys(&self) -> Vec<String> {
                    vec![
                        keys::ORDERS_ALL.to_string(),
                        keys::order(self.order_id),
                        keys::account_orders(self.account_id),
                    ]
                }
            }
        )+
    };
}

invalidates_order!(
    OrderCreated,
    OrderConfirmed,
    OrderShipped,
    OrderDelivered,
    OrderCancelled
);

macro_rules! invalidates_genre {
    ($($ty:ty),+) => {
        $(
            impl Invalidates for $ty {
                fn stale_keys(&self) -> Vec<String> {
                    vec![keys::GENRES_ALL.to_string(), keys::genre(self.genre_id)]
                }
            }
        )+
    };
}

invalidates_genre!(GenreCreated, GenreUpdated, GenreDeleted);

macro_rules! invalidates_book {
    ($($ty:ty),+) => {
        $(
            impl Invalidates for $ty {
                fn stale_keys(&self) -> Vec<String> {
                    vec![keys::BOOKS_ALL.to_string(), keys::book(self.book_id)]
                }
            }
        )+
    };
}

invalidates_book!(BookCreated, BookUpdated, BookDeleted);
