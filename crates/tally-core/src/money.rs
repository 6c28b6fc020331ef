//! # Money Module
//!
//! Provides the `Money` type and the rounding rules every ledger value
//! passes through.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Re-rounding floats after every step drifts:                            │
//! │    16.5 - 16.499999999 = 0.000000001  → "still owes money"             │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Values are rounded ONCE when they enter (round2 semantics)          │
//! │    and all further arithmetic is exact.                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding Policy
//! - `round2`: multiply by 100, round half AWAY from zero, divide by 100
//! - `is_zero`: anything strictly below one cent in magnitude is zero
//!
//! Plain-number callers use [`round2`] / [`is_zero`]; the ledger itself only
//! ever sees [`Money`].
//!
//! ## Usage
//! ```rust
//! use tally_core::money::{round2, Money};
//!
//! let price = Money::from_amount(6.50);
//! assert_eq!(price.cents(), 650);
//!
//! let line = Money::from_cents(500).multiply_quantity(2.0);
//! assert_eq!(line.cents(), 1000);
//!
//! assert_eq!(round2(10.125), 10.13);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

/// Balances whose magnitude is below this are treated as settled.
pub const MONEY_EPSILON: f64 = 0.01;

/// Basis points in 100%.
pub const FULL_BPS: u32 = 10_000;

// =============================================================================
// Plain-number helpers
// =============================================================================

/// Rounds a currency amount to 2 decimal places, half away from zero.
///
/// ## Example
/// ```rust
/// use tally_core::money::round2;
///
/// assert_eq!(round2(16.5), 16.5);
/// assert_eq!(round2(10.125), 10.13);
/// assert_eq!(round2(-10.125), -10.13);
/// ```
#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Returns true when `x` is within the settlement epsilon of zero.
#[inline]
pub fn is_zero(x: f64) -> bool {
    x.abs() < MONEY_EPSILON
}

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate balances may go negative before clamping
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.price_cents ──► line unit price ──► line subtotal             │
/// │                                                  │                      │
/// │                                                  ▼                      │
/// │  Σ subtotals ──► tab/sale total ──► discount ──► amount remaining      │
/// │                                                  ▲                      │
/// │  partial payments / paid lines ──► amount paid ──┘                     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from a plain currency amount, applying
    /// [`round2`] semantics.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_amount(16.50).cents(), 1650);
    /// assert_eq!(Money::from_amount(0.125).cents(), 13);
    /// ```
    #[inline]
    pub fn from_amount(amount: f64) -> Self {
        Money((amount * 100.0).round() as i64)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value as a plain currency amount (for display / export).
    #[inline]
    pub fn amount(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is exactly zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if a balance counts as settled (within the epsilon of zero).
    ///
    /// Every "paid in full" / "no remaining balance" / "no discount"
    /// decision goes through here.
    #[inline]
    pub fn is_settled(&self) -> bool {
        is_zero(self.amount())
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the value, or zero if it is negative.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Normalizes an outstanding balance: negatives and settled values
    /// become exactly zero.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(-30).settle(), Money::zero());
    /// assert_eq!(Money::from_cents(1650).settle().cents(), 1650);
    /// ```
    #[inline]
    pub fn settle(&self) -> Self {
        if self.is_negative() || self.is_settled() {
            Money::zero()
        } else {
            *self
        }
    }

    /// Multiplies money by a (possibly fractional) quantity.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let per_kg = Money::from_cents(1999);
    /// assert_eq!(per_kg.multiply_quantity(0.3).cents(), 600); // 599.7 → 600
    /// assert_eq!(Money::from_cents(500).multiply_quantity(2.0).cents(), 1000);
    /// ```
    #[inline]
    pub fn multiply_quantity(&self, qty: f64) -> Self {
        Money((self.0 as f64 * qty).round() as i64)
    }

    /// Returns `bps` basis points of this amount, rounded half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(1200);
    /// assert_eq!(subtotal.percentage(1000).cents(), 120); // 10%
    /// assert_eq!(Money::from_cents(1005).percentage(5000).cents(), 503); // 502.5 → 503
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        // i128 so large amounts times bps cannot overflow
        let numerator = self.0 as i128 * bps as i128;
        let divisor = FULL_BPS as i128;
        let quotient = numerator / divisor;
        let remainder = numerator % divisor;
        let rounded = if remainder.abs() * 2 >= divisor {
            quotient + numerator.signum()
        } else {
            quotient
        };
        Money::from_cents(rounded as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for messages and logs. The front end formats currency itself.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
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

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
