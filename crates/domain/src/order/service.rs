//! Order service providing a simplified API for order operations.

use std::sync::Arc;

use common::{AccountId, BookId, OrderId};
use storage::StorageBackend;
use tokio_util::sync::CancellationToken;

use crate::book::Book;
use crate::dispatch::EventRouter;
use crate::error::DomainError;
use crate::repository::Repository;

use super::{NewOrder, Order, OrderError, OrderLine};

/// Service for managing orders.
///
/// Each operation loads the order, runs one transition and commits it
/// through a unit of work, so events reach the router only after the new
/// state is stored.
pub struct OrderService<S: StorageBackend> {
    repository: Repository<S, Order>,
    books: Repository<S, Book>,
}

impl<S: StorageBackend> OrderService<S> {
    /// Creates a new order service over the given storage and router.
    pub fn new(storage: Arc<S>, router: EventRouter) -> Self {
        Self {
            repository: Repository::new(storage.clone(), router.clone()),
            books: Repository::new(storage, router),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Repository<S, Order> {
        &self.repository
    }

    /// Places an order for catalog books, given as `(book, quantity)` pairs.
    ///
    /// Each book must exist and hold at least the requested quantity. Lines
    /// are priced at the book's sell price when set, else its list price.
    /// Stock is checked, not reserved.
    #[tracing::instrument(skip(self, items, cancel), fields(items = items.len()))]
    pub async fn place_order(
        &self,
        account_id: i64,
        note: Option<String>,
        items: Vec<(BookId, u32)>,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        let mut lines = Vec::with_capacity(items.len());
        for (book_id, quantity) in items {
            let book = self.books.load(book_id).await?;
            if book.stock() < quantity {
                return Err(OrderError::InsufficientStock {
                    book_id,
                    requested: quantity,
                    available: book.stock(),
                }
                .into());
            }
            lines.push(OrderLine::new(
                book_id,
                book.title(),
                quantity,
                book.effective_price(),
            ));
        }

        self.create_order(account_id, note, lines, cancel).await
    }

    /// Places an order with its lines.
    ///
    /// The order is inserted first to obtain its identity; only then is
    /// `OrderCreated` raised and committed.
    #[tracing::instrument(skip(self, lines, cancel), fields(lines = lines.len()))]
    pub async fn create_order(
        &self,
        account_id: i64,
        note: Option<String>,
        lines: Vec<OrderLine>,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        let mut draft = NewOrder::create(account_id, note)?;
        for line in lines {
            draft.add_line(line)?;
        }

        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let id = self.repository.insert(draft.data()).await?;
        let mut order = draft.materialize(id);
        order.raise_created_event()?;
        let order = self.repository.commit_created(order, cancel).await?;

        tracing::info!(order_id = %order.id(), total = %order.total(), "order created");
        Ok(order)
    }

    /// Adds a line to a pending order.
    #[tracing::instrument(skip(self, line, cancel))]
    pub async fn add_line(
        &self,
        order_id: OrderId,
        line: OrderLine,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        self.repository
            .execute(order_id, cancel, |order| order.add_line(line))
            .await
    }

    /// Confirms a pending order.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn confirm_order(
        &self,
        order_id: OrderId,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        self.repository
            .execute(order_id, cancel, |order| order.confirm())
            .await
    }

    /// Marks a confirmed order as shipped.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn ship_order(
        &self,
        order_id: OrderId,
        tracking_number: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        self.repository
            .execute(order_id, cancel, |order| order.start_shipping(tracking_number))
            .await
    }

    /// Marks a shipping order as delivered.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn deliver_order(
        &self,
        order_id: OrderId,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        self.repository
            .execute(order_id, cancel, |order| order.complete_delivery())
            .await
    }

    /// Cancels an order that is not yet delivered.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        reason: String,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        self.repository
            .execute(order_id, cancel, |order| order.cancel(reason))
            .await
    }

    /// Replaces the note of an order.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_note(
        &self,
        order_id: OrderId,
        note: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Order, DomainError> {
        self.repository
            .execute(order_id, cancel, |order| order.update_note(note))
            .await
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.repository.load(order_id).await
    }

    /// Lists every order.
    pub async fn list_orders(&self) -> Result<Vec<Order>, DomainError> {
        self.repository.list().await
    }

    /// Lists the orders placed by one account.
    pub async fn orders_for_account(&self, account_id: AccountId) -> Result<Vec<Order>, DomainError> {
        let orders = self.repository.list().await?;
        Ok(orders
            .into_iter()
            .filter(|order| order.account_id() == account_id)
            .collect())
    }
}
