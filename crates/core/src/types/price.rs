//! Non-negative monetary amounts using decimal arithmetic.
//!
//! The store runs in a single currency (configured on the payment gateway),
//! so a `Price` is just a validated amount in the currency's standard unit.

use core::fmt;
use core::ops::Add;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Error returned when constructing a [`Price`] from a negative amount.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("amount cannot be negative (got {0})")]
pub struct NegativePrice(pub Decimal);

/// A non-negative amount in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price, rejecting negative amounts.
    ///
    /// # Errors
    ///
    /// Returns [`NegativePrice`] if `amount < 0`.
    pub fn new(amount: Decimal) -> Result<Self, NegativePrice> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(NegativePrice(amount));
        }
        Ok(Self(amount.normalize()))
    }

    /// Create a price from whole units. Convenient for fixtures and seeds.
    #[must_use]
    pub fn from_units(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether this amount is greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Amount in minor units (hundredths), as payment providers expect.
    ///
    /// Returns `None` if the value does not fit in an `i64`.
    #[must_use]
    pub fn to_minor_units(&self) -> Option<i64> {
        (self.0 * Decimal::ONE_HUNDRED).round().to_i64()
    }

    /// Whether the amount fits a `NUMERIC(12,2)` column exactly: at most two
    /// decimal places and below 10^10.
    #[must_use]
    pub fn is_storable(&self) -> bool {
        self.0.scale() <= 2 && self.0 < Decimal::from(10_000_000_000_i64)
    }

    /// Line total for `quantity` units at this price.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl core::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = NegativePrice;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(Price::new(Decimal::new(-1, 2)).is_err());
        assert!(Price::new(Decimal::ZERO).is_ok());
        assert!(serde_json::from_str::<Price>("-5").is_err());
    }

    #[test]
    fn test_minor_units_round_half_even() {
        let price = Price::new(Decimal::new(12_345, 3)).unwrap(); // 12.345
        assert_eq!(price.to_minor_units(), Some(1234));
        assert_eq!(Price::from_units(150).to_minor_units(), Some(15_000));
    }

    #[test]
    fn test_storable_limits_scale_and_magnitude() {
        assert!(Price::new(Decimal::new(1_999, 2)).unwrap().is_storable());
        assert!(Price::new(Decimal::new(1_500, 3)).unwrap().is_storable()); // 1.500
        assert!(!Price::new(Decimal::new(1_005, 3)).unwrap().is_storable());
        assert!(Price::new(Decimal::new(999_999_999_999, 2)).unwrap().is_storable());
        assert!(!Price::new(Decimal::from(10_000_000_000_i64)).unwrap().is_storable());
    }

    #[test]
    fn test_line_totals_and_sum() {
        let total: Price = [Price::from_units(50).times(2), Price::from_units(40)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_units(140));
        assert_eq!(total.to_string(), "140.00");
    }

    #[test]
    fn test_deserializes_numbers_and_strings() {
        let from_number: Price = serde_json::from_str("19.5").unwrap();
        let from_string: Price = serde_json::from_str("\"19.50\"").unwrap();
        assert_eq!(from_number, from_string);
    }
}
