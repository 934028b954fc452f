//! Book aggregate and related types.

mod aggregate;
mod events;
mod service;

pub use aggregate::{Book, BookData, BookDetails, NewBook};
pub use events::{BookCreated, BookDeleted, BookUpdated};
pub use service::BookService;

use common::BookId;
use thiserror::Error;

/// Errors that can occur during book operations.
#[derive(Debug, Error)]
pub enum BookError {
    /// A required text field is empty.
    #[error("Book {field} must not be blank")]
    BlankField { field: &'static str },

    #[error("Invalid {field}: {price} (must not be negative)")]
    InvalidPrice { field: &'static str, price: i64 },

    /// Order lines still reference the book.
    #[error("Book {book_id} is referenced by {count} order(s)")]
    InUse { book_id: BookId, count: u64 },

    #[error("Book {book_id} was already announced")]
    AlreadyAnnounced { book_id: BookId },

    #[error("Book {book_id} is marked for deletion")]
    MarkedForDeletion { book_id: BookId },
}
