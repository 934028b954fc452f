//! Domain layer for the storefront event pipeline.
//!
//! This crate provides:
//! - `DomainEvent` and the per-aggregate `EventBuffer`
//! - Order, Genre, Book and Account aggregates with typed identities
//! - `RoutingTable` / `EventRouter` for explicit event-to-handler routing
//! - `UnitOfWork`, which writes aggregate state and then dispatches events
//! - Application services built on a generic `Repository`

pub mod account;
pub mod aggregate;
pub mod book;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod genre;
pub mod order;
pub mod repository;
pub mod unit_of_work;

pub use account::{
    Account, AccountActivated, AccountError, AccountPasswordChanged, AccountProfileUpdated,
    AccountRegistered, AccountService, NewAccount, Profile, Role,
};
pub use aggregate::{AggregateRoot, EventBuffer, HasDomainEvents, TrackedAggregate};
pub use book::{
    Book, BookCreated, BookDeleted, BookDetails, BookError, BookService, BookUpdated, NewBook,
};
pub use dispatch::{EventHandler, EventRouter, RoutingTable, RoutingTableBuilder};
pub use error::{CommitError, DispatchError, DomainError, ErrorClass, HandlerError};
pub use event::{DomainEvent, EventRecord};
pub use genre::{Genre, GenreCreated, GenreDeleted, GenreError, GenreService, GenreUpdated, NewGenre};
pub use order::{
    Money, NewOrder, Order, OrderCancelled, OrderConfirmed, OrderCreated, OrderDelivered,
    OrderError, OrderLine, OrderService, OrderShipped, OrderStatus,
};
pub use repository::Repository;
pub use unit_of_work::{CommitReceipt, UnitOfWork};

pub use tokio_util::sync::CancellationToken;
