//! Book service.

use std::sync::Arc;

use common::BookId;
use storage::StorageBackend;
use tokio_util::sync::CancellationToken;

use crate::aggregate::AggregateRoot;
use crate::dispatch::EventRouter;
use crate::error::DomainError;
use crate::order::{Order, OrderLine};
use crate::repository::Repository;
use crate::unit_of_work::CommitReceipt;

use super::{Book, BookDetails, NewBook};

/// Service for managing the book catalog.
pub struct BookService<S: StorageBackend> {
    repository: Repository<S, Book>,
}

impl<S: StorageBackend> BookService<S> {
    pub fn new(storage: Arc<S>, router: EventRouter) -> Self {
        Self {
            repository: Repository::new(storage, router),
        }
    }

    /// Adds a book to the catalog and announces it.
    #[tracing::instrument(skip(self, details, cancel), fields(title = %details.title))]
    pub async fn create_book(
        &self,
        details: BookDetails,
        cancel: &CancellationToken,
    ) -> Result<Book, DomainError> {
        let draft = NewBook::create(details)?;
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let id = self.repository.insert(draft.data()).await?;
        let mut book = draft.materialize(id);
        book.raise_created_event()?;
        let book = self.repository.commit_created(book, cancel).await?;

        tracing::info!(book_id = %book.id(), "book created");
        Ok(book)
    }

    #[tracing::instrument(skip(self, details, cancel))]
    pub async fn update_book(
        &self,
        book_id: BookId,
        details: BookDetails,
        cancel: &CancellationToken,
    ) -> Result<Book, DomainError> {
        self.repository
            .execute(book_id, cancel, |book| book.update_details(details))
            .await
    }

    /// Deletes a book no order line refers to.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_book(
        &self,
        book_id: BookId,
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt, DomainError> {
        let mut book = self.repository.load(book_id).await?;
        let referencing = self
            .repository
            .storage()
            .count_references(Order::KIND, "book_ids", book_id.into())
            .await?;

        book.mark_for_deletion(referencing)?;
        self.repository.commit(&mut book, cancel).await
    }

    pub async fn get_book(&self, book_id: BookId) -> Result<Book, DomainError> {
        self.repository.load(book_id).await
    }

    pub async fn list_books(&self) -> Result<Vec<Book>, DomainError> {
        self.repository.list().await
    }

    /// Builds an order line for `quantity` copies at the current price.
    pub async fn order_line(&self, book_id: BookId, quantity: u32) -> Result<OrderLine, DomainError> {
        let book = self.repository.load(book_id).await?;
        Ok(OrderLine::new(
            book.id(),
            book.title(),
            quantity,
            book.effective_price(),
        ))
    }
}
