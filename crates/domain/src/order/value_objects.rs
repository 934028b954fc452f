//! Value objects shared by orders and the catalog.

use common::BookId;
use serde::{Deserialize, Serialize};

/// Amount in minor units (cents). Line and order totals are exact sums.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self::from_cents(dollars.saturating_mul(100))
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Price of `quantity` units, or None if it does not fit.
    pub fn checked_times(&self, quantity: u32) -> Option<Money> {
        self.cents.checked_mul(i64::from(quantity)).map(Self::from_cents)
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.cents.checked_add(rhs.cents).map(Self::from_cents)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

/// A line of an order.
///
/// Title and unit price are snapshots taken when the line was added, so
/// later catalog edits do not change existing orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub book_id: BookId,

    /// Display title of the book.
    pub book_title: String,

    pub quantity: u32,

    pub unit_price: Money,

    /// `quantity * unit_price`.
    pub subtotal: Money,
}

impl OrderLine {
    /// Creates a new line, computing its subtotal.
    ///
    /// An out-of-range subtotal is left at zero; adding such a line to an
    /// order fails with [`OrderError::AmountOverflow`](super::OrderError::AmountOverflow).
    pub fn new(
        book_id: BookId,
        book_title: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            book_id,
            book_title: book_title.into(),
            quantity,
            unit_price,
            subtotal: unit_price.checked_times(quantity).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dollars() {
        assert_eq!(Money::from_dollars(50).cents(), 5000);
        assert!(Money::default().is_zero());
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(Money::from_cents(250).checked_times(3), Some(Money::from_cents(750)));
        assert_eq!(Money::from_cents(i64::MAX).checked_times(2), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(-5).checked_add(Money::from_cents(5)),
            Some(Money::zero())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_serializes_as_cents() {
        assert_eq!(serde_json::to_string(&Money::from_cents(999)).unwrap(), "999");
    }

    #[test]
    fn test_line_subtotal() {
        let line = OrderLine::new(BookId::new(7).unwrap(), "Dune", 3, Money::from_cents(1000));
        assert_eq!(line.subtotal.cents(), 3000);

        let huge = OrderLine::new(BookId::new(7).unwrap(), "Dune", 3, Money::from_cents(i64::MAX));
        assert!(huge.subtotal.is_zero());
    }
}
