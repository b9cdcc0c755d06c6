//! # Money Module
//!
//! The `Money` type for TP rates, MRP, invoice totals and payments.
//!
//! ## Integer Minor Units
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount is stored in the smallest currency unit (paisa / cents). │
//! │                                                                         │
//! │  TP rate 12.50  →  1250                                                 │
//! │  3 units × 1250 →  3750                                                 │
//! │  10% off 3750   →  3375  (discount 375, rounded half up)                │
//! │                                                                         │
//! │  No floating point anywhere between the invoice line and the ledger.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

/// Basis points in one whole (100%).
pub const BPS_PER_WHOLE: i64 = 10_000;

/// A monetary value in minor units.
///
/// Signed so that credit notes and reversals can be expressed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use pharmadist_core::money::Money;
    ///
    /// let tp_rate = Money::from_cents(1250); // 12.50
    /// assert_eq!(tp_rate.cents(), 1250);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion (truncated toward zero).
    #[inline]
    pub const fn whole(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the fractional portion (always 0-99).
    #[inline]
    pub const fn fraction(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit rate by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use pharmadist_core::money::Money;
    ///
    /// let line = Money::from_cents(1250).multiply_quantity(3);
    /// assert_eq!(line.cents(), 3750);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `bps` basis points of this amount, rounded half up.
    ///
    /// ## Example
    /// ```rust
    /// use pharmadist_core::money::Money;
    ///
    /// let discount = Money::from_cents(3750).percentage(1000); // 10%
    /// assert_eq!(discount.cents(), 375);
    /// ```
    pub fn percentage(&self, bps: i64) -> Money {
        // i128 so a large invoice times a large rate cannot overflow
        let raw = self.0 as i128 * bps as i128;
        let half = BPS_PER_WHOLE as i128 / 2;
        let rounded = if raw >= 0 {
            (raw + half) / BPS_PER_WHOLE as i128
        } else {
            (raw - half) / BPS_PER_WHOLE as i128
        };
        Money(rounded as i64)
    }

    /// Subtracts, flooring the result at zero.
    ///
    /// Used for `due = max(0, due - amount)`.
    #[inline]
    pub fn saturating_sub_floor(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

/// Debug-oriented display (`1250` → `12.50`). The UI layer owns localized
/// currency formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.whole().abs(), self.fraction())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let money = Money::from_cents(1250);
        assert_eq!(money.whole(), 12);
        assert_eq!(money.fraction(), 50);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1250).to_string(), "12.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 12.5% of 1.01 = 0.12625 -> 0.13
        assert_eq!(Money::from_cents(101).percentage(1250).cents(), 13);
        // 10% of 0.05 = 0.005 -> 0.01
        assert_eq!(Money::from_cents(5).percentage(1000).cents(), 1);
        assert_eq!(Money::from_cents(-5).percentage(1000).cents(), -1);
    }

    #[test]
    fn test_saturating_sub_floor() {
        let due = Money::from_cents(10_000);
        assert_eq!(due.saturating_sub_floor(Money::from_cents(4_000)).cents(), 6_000);
        assert_eq!(due.saturating_sub_floor(Money::from_cents(12_000)).cents(), 0);
    }

    #[test]
    fn test_sum_of_lines() {
        let total: Money = [1250, 3750, 100]
            .into_iter()
            .map(Money::from_cents)
            .sum();
        assert_eq!(total.cents(), 5100);
    }
}
