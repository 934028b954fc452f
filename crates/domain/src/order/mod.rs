//! Order aggregate and related types.

mod aggregate;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order, OrderData};
pub use events::{OrderCancelled, OrderConfirmed, OrderCreated, OrderDelivered, OrderShipped};
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::{Money, OrderLine};

use common::{BookId, OrderId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Account identity must be positive.
    #[error("Invalid account id: {account_id}")]
    InvalidAccount { account_id: i64 },

    /// Order is not in the expected status.
    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidState {
        current: OrderStatus,
        action: &'static str,
    },

    /// Order has no lines.
    #[error("Order has no lines")]
    EmptyOrder,

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    /// Cancelling requires a non-empty reason.
    #[error("Cancellation reason is required")]
    CancellationReasonRequired,

    /// The created event was already raised.
    #[error("Order {order_id} was already announced")]
    AlreadyAnnounced { order_id: OrderId },

    /// A subtotal or the order total does not fit in the amount range.
    #[error("Order amount overflow")]
    AmountOverflow,

    /// More units were requested than the book has in stock.
    #[error("Insufficient stock for book {book_id}: requested {requested}, available {available}")]
    InsufficientStock {
        book_id: BookId,
        requested: u32,
        available: u32,
    },
}
