//! Order state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Shipping ──► Delivered
///    │            │            │
///    └────────────┴────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order is open, lines can be added.
    #[default]
    Pending,

    /// Order was accepted by the store.
    Confirmed,

    /// Order left the warehouse.
    Shipping,

    /// Order reached the customer (terminal state).
    Delivered,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if lines can be added in this status.
    pub fn can_modify_lines(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be confirmed in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if shipping can start in this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if delivery can be completed in this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipping)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Shipping => "Shipping",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_only_pending_can_modify_lines_or_confirm() {
        for status in ALL {
            let pending = status == OrderStatus::Pending;
            assert_eq!(status.can_modify_lines(), pending);
            assert_eq!(status.can_confirm(), pending);
        }
    }

    #[test]
    fn test_confirmed_can_ship() {
        for status in ALL {
            assert_eq!(status.can_ship(), status == OrderStatus::Confirmed);
        }
    }

    #[test]
    fn test_shipping_can_deliver() {
        for status in ALL {
            assert_eq!(status.can_deliver(), status == OrderStatus::Shipping);
        }
    }

    #[test]
    fn test_can_cancel_from_non_terminal_states() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Confirmed.can_cancel());
        assert!(OrderStatus::Shipping.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Confirmed.is_terminal());
        assert!(!OrderStatus::Shipping.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(OrderStatus::Pending.to_string(), "Pending");
        assert_eq!(OrderStatus::Shipping.to_string(), "Shipping");
        assert_eq!(OrderStatus::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&OrderStatus::Shipping).unwrap();
        assert_eq!(json, "\"Shipping\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::Shipping);
    }
}
