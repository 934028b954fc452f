//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AccountId, BookId, OrderId};
use serde::{Deserialize, Serialize};
use storage::{AggregateKey, WriteOp};

use crate::aggregate::{
    AggregateRoot, EventBuffer, TrackedAggregate, impl_has_domain_events, key_of, update_op,
};

use super::{
    Money, OrderError, OrderLine, OrderStatus,
    events::{OrderCancelled, OrderConfirmed, OrderCreated, OrderDelivered, OrderShipped},
};

/// Persisted business state of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderData {
    account_id: AccountId,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    total: Money,

    /// Distinct books referenced by the lines, kept for reference counting.
    #[serde(default)]
    book_ids: Vec<BookId>,

    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Set once the created event has been raised.
    #[serde(default)]
    announced: bool,
}

impl OrderData {
    fn new(account_id: AccountId, note: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            status: OrderStatus::Pending,
            lines: Vec::new(),
            total: Money::zero(),
            book_ids: Vec::new(),
            note,
            created_at: now,
            updated_at: now,
            announced: false,
        }
    }

    fn add_line(&mut self, line: OrderLine) -> Result<(), OrderError> {
        if !self.status.can_modify_lines() {
            return Err(OrderError::InvalidState {
                current: self.status,
                action: "add line",
            });
        }

        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                quantity: line.quantity,
            });
        }

        if line.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice {
                price: line.unit_price.cents(),
            });
        }

        // Recompute the subtotal rather than trusting the caller's value
        let subtotal = line
            .unit_price
            .checked_times(line.quantity)
            .ok_or(OrderError::AmountOverflow)?;
        let total = self
            .total
            .checked_add(subtotal)
            .ok_or(OrderError::AmountOverflow)?;

        let line = OrderLine { subtotal, ..line };
        if !self.book_ids.contains(&line.book_id) {
            self.book_ids.push(line.book_id);
        }
        self.lines.push(line);
        self.total = total;
        self.touch();

        Ok(())
    }

    fn touch(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.updated_at = now;
        now
    }
}

/// An order that has not been persisted yet.
///
/// It has no identity, so it cannot raise events. Persist its
/// [`data`](NewOrder::data), then call [`materialize`](NewOrder::materialize)
/// with the identity storage assigned.
#[derive(Debug, Clone)]
pub struct NewOrder {
    data: OrderData,
}

impl NewOrder {
    /// Starts a pending order for an account.
    pub fn create(account_id: i64, note: Option<String>) -> Result<Self, OrderError> {
        let account_id =
            AccountId::new(account_id).map_err(|_| OrderError::InvalidAccount { account_id })?;

        Ok(Self {
            data: OrderData::new(account_id, note),
        })
    }

    /// Adds a line and recomputes the total. Emits nothing.
    pub fn add_line(&mut self, line: OrderLine) -> Result<(), OrderError> {
        self.data.add_line(line)
    }

    pub fn account_id(&self) -> AccountId {
        self.data.account_id
    }

    pub fn status(&self) -> OrderStatus {
        self.data.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.data.lines
    }

    pub fn total(&self) -> Money {
        self.data.total
    }

    /// Returns the state to insert.
    pub fn data(&self) -> &OrderData {
        &self.data
    }

    /// Binds the storage-assigned identity, yielding a persisted order.
    pub fn materialize(self, id: OrderId) -> Order {
        Order {
            id,
            data: self.data,
            events: EventBuffer::new(),
        }
    }
}

/// Order aggregate root.
///
/// Every successful transition mutates the order and records exactly one
/// event. A failed transition changes nothing.
#[derive(Debug, Clone)]
pub struct Order {
    id: OrderId,
    data: OrderData,
    events: EventBuffer,
}

impl_has_domain_events!(Order);

impl TrackedAggregate for Order {
    fn key(&self) -> AggregateKey {
        key_of(self)
    }

    fn write_op(&self) -> Result<WriteOp, serde_json::Error> {
        update_op(self)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;
    type Data = OrderData;

    const KIND: &'static str = "Order";

    fn id(&self) -> OrderId {
        self.id
    }

    fn data(&self) -> &OrderData {
        &self.data
    }

    fn restore(id: OrderId, data: OrderData) -> Self {
        Self {
            id,
            data,
            events: EventBuffer::new(),
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.data.account_id
    }

    pub fn status(&self) -> OrderStatus {
        self.data.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.data.lines
    }

    pub fn total(&self) -> Money {
        self.data.total
    }

    pub fn note(&self) -> Option<&str> {
        self.data.note.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.data.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.data.updated_at
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.data.status.is_terminal()
    }

    /// Returns true once the created event has been raised.
    pub fn is_announced(&self) -> bool {
        self.data.announced
    }

    /// Returns the total quantity of all lines.
    pub fn total_quantity(&self) -> u64 {
        self.data
            .lines
            .iter()
            .map(|line| u64::from(line.quantity))
            .sum()
    }
}

// Transitions
impl Order {
    /// Records `OrderCreated` with a snapshot of every line.
    ///
    /// Call once, after the order and its lines are persisted.
    pub fn raise_created_event(&mut self) -> Result<(), OrderError> {
        if self.data.announced {
            return Err(OrderError::AlreadyAnnounced { order_id: self.id });
        }

        self.data.announced = true;
        self.events.record(OrderCreated {
            order_id: self.id,
            account_id: self.data.account_id,
            order_date: self.data.created_at,
            lines: self.data.lines.clone(),
            total: self.data.total,
            note: self.data.note.clone(),
        });

        Ok(())
    }

    /// Adds a line to a pending order. Emits nothing.
    pub fn add_line(&mut self, line: OrderLine) -> Result<(), OrderError> {
        self.data.add_line(line)
    }

    /// Pending → Confirmed.
    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if !self.data.status.can_confirm() {
            return Err(self.invalid_state("confirm"));
        }

        if self.data.lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        self.data.status = OrderStatus::Confirmed;
        let confirmed_at = self.data.touch();
        self.events.record(OrderConfirmed {
            order_id: self.id,
            account_id: self.data.account_id,
            confirmed_at,
        });

        Ok(())
    }

    /// Confirmed → Shipping.
    pub fn start_shipping(&mut self, tracking_number: Option<String>) -> Result<(), OrderError> {
        if !self.data.status.can_ship() {
            return Err(self.invalid_state("start shipping"));
        }

        self.data.status = OrderStatus::Shipping;
        let shipped_at = self.data.touch();
        self.events.record(OrderShipped {
            order_id: self.id,
            account_id: self.data.account_id,
            shipped_at,
            tracking_number,
        });

        Ok(())
    }

    /// Shipping → Delivered.
    pub fn complete_delivery(&mut self) -> Result<(), OrderError> {
        if !self.data.status.can_deliver() {
            return Err(self.invalid_state("complete delivery"));
        }

        self.data.status = OrderStatus::Delivered;
        let delivered_at = self.data.touch();
        self.events.record(OrderDelivered {
            order_id: self.id,
            account_id: self.data.account_id,
            delivered_at,
        });

        Ok(())
    }

    /// Any non-terminal status → Cancelled. The reason is appended to the note.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        if !self.data.status.can_cancel() {
            return Err(self.invalid_state("cancel"));
        }

        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(OrderError::CancellationReasonRequired);
        }

        let line = format!("Cancellation: {reason}");
        self.data.note = Some(match self.data.note.take() {
            Some(note) if !note.is_empty() => format!("{note}\n{line}"),
            _ => line,
        });
        self.data.status = OrderStatus::Cancelled;
        let cancelled_at = self.data.touch();
        self.events.record(OrderCancelled {
            order_id: self.id,
            account_id: self.data.account_id,
            cancelled_at,
            reason,
        });

        Ok(())
    }

    /// Replaces the note of a non-terminal order. Emits nothing.
    pub fn update_note(&mut self, note: Option<String>) -> Result<(), OrderError> {
        if self.data.status.is_terminal() {
            return Err(self.invalid_state("update note"));
        }

        self.data.note = note;
        self.data.touch();
        Ok(())
    }

    fn invalid_state(&self, action: &'static str) -> OrderError {
        OrderError::InvalidState {
            current: self.data.status,
            action,
        }
    }
}
