//! Shared identity types for the storefront event pipeline.

pub mod types;

pub use types::{AccountId, BookId, EventId, GenreId, InvalidId, OrderId};
