//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AccountId, OrderId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderLine};

/// An order was persisted with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,

    /// The account that placed the order.
    pub account_id: AccountId,

    pub order_date: DateTime<Utc>,

    /// Snapshot of every line at creation time.
    pub lines: Vec<OrderLine>,

    pub total: Money,

    pub note: Option<String>,
}

/// The store accepted the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub confirmed_at: DateTime<Utc>,
}

/// The order left the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub shipped_at: DateTime<Utc>,

    /// Carrier tracking number, if known.
    pub tracking_number: Option<String>,
}

/// The order reached the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub delivered_at: DateTime<Utc>,
}

/// The order was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub cancelled_at: DateTime<Utc>,
    pub reason: String,
}

crate::domain_event!(OrderCreated, "Order", id = order_id, at = order_date);
crate::domain_event!(OrderConfirmed, "Order", id = order_id, at = confirmed_at);
crate::domain_event!(OrderShipped, "Order", id = order_id, at = shipped_at);
crate::domain_event!(OrderDelivered, "Order", id = order_id, at = delivered_at);
crate::domain_event!(OrderCancelled, "Order", id = order_id, at = cancelled_at);
