//! # Money Module
//!
//! Provides the `Money` type used for every price, subtotal, tax amount and
//! payment milestone in the engine.
//!
//! ## Minor Units Only
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount is an i64 count of cents.                                 │
//! │                                                                         │
//! │    Line item:   150 guests × $12.00  = 150 × 1200 = 180000 cents        │
//! │    Tax (9%):    180000 × 900 / 10000 = 16200 cents                      │
//! │    Deposit 30%: 196200 × 30 / 100    = 58860 cents                      │
//! │                                                                         │
//! │  Rounding happens in exactly two places (rates and percentages) and     │
//! │  both round half away from zero. Any remainder a split leaves behind    │
//! │  is assigned explicitly by the caller (see `schedule`).                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use catering_core::money::Money;
//!
//! let per_guest = Money::from_cents(1200);
//! let line_total = per_guest.multiply_quantity(150);
//! assert_eq!(line_total.cents(), 180_000);
//! assert_eq!(line_total.to_string(), "$1800.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::tax::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// Signed so that cost deltas between two estimates can be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole dollars.
    ///
    /// ```rust
    /// use catering_core::money::Money;
    ///
    /// assert_eq!(Money::from_dollars(150).cents(), 15_000);
    /// ```
    #[inline]
    pub const fn from_dollars(dollars: i64) -> Self {
        Money(dollars * 100)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    ///
    /// Used when a fixed discount exceeds the subtotal: the taxable amount
    /// floors at zero instead of going negative.
    #[inline]
    pub const fn floor_at_zero(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            Money(self.0)
        }
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ```rust
    /// use catering_core::money::Money;
    ///
    /// let staff = Money::from_cents(20_000);
    /// assert_eq!(staff.multiply_quantity(3).cents(), 60_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a basis-point rate, rounding half away from zero.
    ///
    /// ```rust
    /// use catering_core::money::Money;
    /// use catering_core::tax::TaxRate;
    ///
    /// // $10.00 at 8.25% = $0.825 → $0.83
    /// let tax = Money::from_cents(1000).apply_rate(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn apply_rate(&self, rate: TaxRate) -> Money {
        Money(round_div(self.0 as i128 * rate.bps() as i128, 10_000))
    }

    /// Returns `percentage`% of this amount, rounding half away from zero.
    ///
    /// Each payment milestone is rounded independently with this function;
    /// the schedule then assigns the remainder to its final milestone.
    ///
    /// ```rust
    /// use catering_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(100_000).percent(30).cents(), 30_000);
    /// assert_eq!(Money::from_cents(1001).percent(50).cents(), 501);
    /// ```
    pub fn percent(&self, percentage: u32) -> Money {
        Money(round_div(self.0 as i128 * percentage as i128, 100))
    }
}

/// Integer division rounding half away from zero.
fn round_div(numerator: i128, denominator: i128) -> i64 {
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    rounded as i64
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly dollar formatting. Customer-facing formatting belongs to
/// the template layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
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
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(180_000).to_string(), "$1800.00");
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // 9% of $10.50 = 94.5 cents → 95
        let tax = Money::from_cents(1050).apply_rate(TaxRate::from_bps(900));
        assert_eq!(tax.cents(), 95);
    }

    #[test]
    fn test_apply_rate_negative_rounds_away_from_zero() {
        let delta = Money::from_cents(-1050).apply_rate(TaxRate::from_bps(900));
        assert_eq!(delta.cents(), -95);
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(Money::from_cents(99_999).percent(30).cents(), 30_000);
        assert_eq!(Money::from_cents(99_999).percent(70).cents(), 69_999);
        assert_eq!(Money::from_cents(1).percent(50).cents(), 1);
    }

    #[test]
    fn test_floor_at_zero() {
        assert_eq!(Money::from_cents(-10).floor_at_zero(), Money::zero());
        assert_eq!(Money::from_cents(10).floor_at_zero().cents(), 10);
    }

    #[test]
    fn test_sum() {
        let items = [Money::from_cents(100), Money::from_cents(250), Money::from_cents(-50)];
        let total: Money = items.iter().sum();
        assert_eq!(total.cents(), 300);
    }

    #[test]
    fn test_large_amount_does_not_overflow_rate() {
        let big = Money::from_cents(i64::MAX / 2);
        let tax = big.apply_rate(TaxRate::from_bps(10_000));
        assert_eq!(tax, big);
    }
}
