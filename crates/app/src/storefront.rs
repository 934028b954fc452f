//! Wires the application services to storage and the event router.

use std::sync::Arc;

use domain::{AccountService, BookService, EventRouter, GenreService, OrderService};
use handlers::{Collaborators, InMemoryQueryCache, LogNotifier};
use sqlx::postgres::PgPoolOptions;
use storage::{AuditLogStore, InMemoryStorage, PostgresAuditLog, PostgresStorage, StorageBackend};

use crate::config::Config;
use crate::error::AppError;

/// Collaborators used when no cache or mail transport is configured.
pub fn default_collaborators(config: &Config, audit_log: Arc<dyn AuditLogStore>) -> Collaborators {
    Collaborators {
        audit_log,
        cache: Arc::new(InMemoryQueryCache::new()),
        notifier: Arc::new(LogNotifier),
        admin_emails: config.admin_emails.clone(),
    }
}

/// The order, genre, book and account services sharing one storage
/// backend and one routing table.
pub struct Storefront<S: StorageBackend> {
    storage: Arc<S>,
    router: EventRouter,
    orders: OrderService<S>,
    genres: GenreService<S>,
    books: BookService<S>,
    accounts: AccountService<S>,
}

impl<S: StorageBackend> Storefront<S> {
    pub fn new(storage: Arc<S>, collaborators: &Collaborators) -> Self {
        let router = EventRouter::new(handlers::routing_table(collaborators));
        tracing::info!(
            routes = router.table().route_count(),
            handlers = router.table().handler_count(),
            "storefront wired"
        );

        Self {
            orders: OrderService::new(storage.clone(), router.clone()),
            genres: GenreService::new(storage.clone(), router.clone()),
            books: BookService::new(storage.clone(), router.clone()),
            accounts: AccountService::new(storage.clone(), router.clone()),
            storage,
            router,
        }
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn genres(&self) -> &GenreService<S> {
        &self.genres
    }

    pub fn books(&self) -> &BookService<S> {
        &self.books
    }

    pub fn accounts(&self) -> &AccountService<S> {
        &self.accounts
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

impl Storefront<InMemoryStorage> {
    /// A storefront on fresh in-memory storage.
    pub fn in_memory(collaborators: &Collaborators) -> Self {
        Self::new(Arc::new(InMemoryStorage::new()), collaborators)
    }
}

impl Storefront<PostgresStorage> {
    /// Connects to `DATABASE_URL`, runs migrations and writes audit rows to
    /// the same database.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or(AppError::MissingDatabaseUrl)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(url)
            .await?;

        let storage = PostgresStorage::new(pool.clone());
        storage.run_migrations().await?;
        tracing::info!(max_connections = config.db_max_connections, "database ready");

        let collaborators = default_collaborators(config, Arc::new(PostgresAuditLog::new(pool)));
        Ok(Self::new(Arc::new(storage), &collaborators))
    }
}
