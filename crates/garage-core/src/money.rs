//! # Money Module
//!
//! Provides the `Money` type for handling rupee amounts safely.
//!
//! ## Why Integer Paise?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  On a GST invoice that is a legal problem, not a cosmetic one:          │
//! │    CGST + SGST must equal the tax amount to the paisa.                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise                                            │
//! │    ₹1,180.00 is stored as 118000 paise                                  │
//! │    Every rounding step is explicit and happens exactly once             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use garage_core::money::Money;
//!
//! let labour = Money::from_paise(100_000); // ₹1,000.00
//! let parts = Money::from_rupees(180);     // ₹180.00
//! assert_eq!((labour + parts).paise(), 118_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{Quantity, TaxRate};

/// Paise per rupee.
pub const PAISE_PER_RUPEE: i64 = 100;

// =============================================================================
// Rounding
// =============================================================================

/// Divides and rounds half away from zero ("half-up" on magnitudes).
///
/// This is the one rounding primitive of the ledger. Every monetary field is
/// produced by exactly one call to it, never by re-rounding a rounded value.
///
/// ## Example
/// ```rust
/// use garage_core::money::div_round_half_up;
///
/// assert_eq!(div_round_half_up(25, 10), 3);   // 2.5 → 3
/// assert_eq!(div_round_half_up(24, 10), 2);   // 2.4 → 2
/// assert_eq!(div_round_half_up(-25, 10), -3); // -2.5 → -3
/// ```
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0, "denominator must be positive");
    let magnitude = (numerator.abs() * 2 + denominator) / (denominator * 2);
    if numerator < 0 {
        -magnitude
    } else {
        magnitude
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in paise (1/100 rupee).
///
/// ## Design Decisions
/// - **i64 (signed)**: reversal rows carry negative amounts
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **sqlx transparent**: stored as a plain INTEGER column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise.
    ///
    /// ## Example
    /// ```rust
    /// use garage_core::money::Money;
    ///
    /// let amount = Money::from_paise(48_000); // ₹480.00
    /// assert_eq!(amount.paise(), 48_000);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * PAISE_PER_RUPEE)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion (truncated toward zero).
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / PAISE_PER_RUPEE
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % PAISE_PER_RUPEE).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
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

    /// Clamps negative values to zero.
    ///
    /// Used for outstanding balances, which never go below zero.
    #[inline]
    pub fn non_negative(self) -> Self {
        Money(self.0.max(0))
    }

    /// Returns true when the value is a whole number of rupees.
    #[inline]
    pub const fn is_whole_rupees(&self) -> bool {
        self.0 % PAISE_PER_RUPEE == 0
    }

    /// Applies a percentage rate, rounding half-up to the paisa.
    ///
    /// ## Example
    /// ```rust
    /// use garage_core::money::Money;
    /// use garage_core::types::TaxRate;
    ///
    /// let taxable = Money::from_rupees(1000);
    /// let gst = taxable.percent(TaxRate::from_bps(1800)); // 18%
    /// assert_eq!(gst.map(|m| m.paise()), Some(18_000));
    /// ```
    ///
    /// Returns `None` when the result does not fit in an `i64` of paise.
    pub fn percent(&self, rate: TaxRate) -> Option<Money> {
        // bps: 1800 = 18.00%, so divide by 10_000
        let paise = div_round_half_up(i128::from(self.0) * i128::from(rate.bps()), 10_000);
        i64::try_from(paise).ok().map(Money)
    }

    /// Multiplies a unit price by a quantity, rounding half-up to the paisa.
    ///
    /// ## Example
    /// ```rust
    /// use garage_core::money::Money;
    /// use garage_core::types::Quantity;
    ///
    /// let rate = Money::from_paise(33_333);          // ₹333.33 per hour
    /// let hours = Quantity::from_thousandths(1_500); // 1.5 hours
    /// assert_eq!(rate.times(hours).map(|m| m.paise()), Some(50_000)); // 499.995 → ₹500.00
    /// ```
    ///
    /// Returns `None` when the result does not fit in an `i64` of paise.
    pub fn times(&self, quantity: Quantity) -> Option<Money> {
        let paise = div_round_half_up(
            i128::from(self.0) * i128::from(quantity.thousandths()),
            i128::from(Quantity::SCALE),
        );
        i64::try_from(paise).ok().map(Money)
    }

    /// Splits the value in two, rounding the first half half-up.
    ///
    /// Returns `(first, rest)` where `first + rest == self` always holds.
    /// This is how CGST/SGST are split: the remainder lands in the second part.
    pub fn split_half(&self) -> (Money, Money) {
        // half away from zero, same as div_round_half_up(x, 2)
        let first = Money(self.0 / 2 + self.0 % 2);
        (first, *self - first)
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Rounds to the nearest whole rupee, half-up.
    ///
    /// ## Example
    /// ```rust
    /// use garage_core::money::Money;
    ///
    /// assert_eq!(Money::from_paise(118_049).round_to_rupee().paise(), 118_000);
    /// assert_eq!(Money::from_paise(118_050).round_to_rupee().paise(), 118_100);
    /// ```
    ///
    /// Works on the paise remainder, so even `i64::MAX` rounds in range.
    pub fn round_to_rupee(&self) -> Money {
        let rest = self.0 % PAISE_PER_RUPEE;
        let whole = self.0 - rest;
        if rest.abs() * 2 >= PAISE_PER_RUPEE {
            Money(whole + rest.signum() * PAISE_PER_RUPEE)
        } else {
            Money(whole)
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation for logs and error messages.
///
/// ## Note
/// UI layers do their own (localized) formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}₹{}.{:02}",
            sign,
            self.rupees().abs(),
            self.paise_part()
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

/// Negation, used to build REVERSAL rows.
impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
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
    fn test_from_paise() {
        let money = Money::from_paise(118_099);
        assert_eq!(money.paise(), 118_099);
        assert_eq!(money.rupees(), 1180);
        assert_eq!(money.paise_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_paise(118_000)), "₹1180.00");
        assert_eq!(format!("{}", Money::from_paise(-70_000)), "-₹700.00");
        assert_eq!(format!("{}", Money::from_paise(5)), "₹0.05");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_paise(1000);
        let b = Money::from_paise(500);

        assert_eq!((a + b).paise(), 1500);
        assert_eq!((a - b).paise(), 500);
        assert_eq!((-a).paise(), -1000);
        assert_eq!(vec![a, b, -b].into_iter().sum::<Money>(), a);
    }

    #[test]
    fn test_half_up_rounding() {
        assert_eq!(div_round_half_up(5, 10), 1);
        assert_eq!(div_round_half_up(4, 10), 0);
        assert_eq!(div_round_half_up(15, 10), 2);
        assert_eq!(div_round_half_up(25, 10), 3); // not bankers rounding
        assert_eq!(div_round_half_up(-15, 10), -2);
    }

    #[test]
    fn test_percent_rounds_once() {
        // ₹10.05 at 18% = 180.9 paise → 181
        assert_eq!(Money::from_paise(1005).percent(TaxRate::from_bps(1800)), Some(Money::from_paise(181)));
        // ₹0.25 at 2.5% (CGST half of 5%) = 0.625 paise → 1
        assert_eq!(Money::from_paise(25).percent(TaxRate::from_bps(250)), Some(Money::from_paise(1)));
    }

    #[test]
    fn test_times_quantity() {
        let price = Money::from_paise(299);
        assert_eq!(price.times(Quantity::from_units(3)), Some(Money::from_paise(897)));
        // 0.333 × ₹1.50 = 49.95 paise → 50
        assert_eq!(Money::from_paise(150).times(Quantity::from_thousandths(333)), Some(Money::from_paise(50)));
    }

    #[test]
    fn test_overflow_is_reported_not_truncated() {
        let huge = Money::from_paise(i64::MAX / 2);
        assert_eq!(huge.times(Quantity::from_units(3)), None);
        assert_eq!(Money::from_paise(i64::MAX).percent(TaxRate::from_bps(20_000)), None);
        assert_eq!(huge.checked_add(huge), Some(Money::from_paise(i64::MAX - 1)));
        assert_eq!(Money::from_paise(i64::MAX).checked_add(Money::from_paise(1)), None);
    }

    #[test]
    fn test_split_half_absorbs_remainder() {
        let (first, rest) = Money::from_paise(181).split_half();
        assert_eq!(first.paise(), 91); // 90.5 → 91
        assert_eq!(rest.paise(), 90);
        assert_eq!(first + rest, Money::from_paise(181));

        let (first, rest) = Money::from_paise(-181).split_half();
        assert_eq!(first.paise(), -91);
        assert_eq!(rest.paise(), -90);
    }

    #[test]
    fn test_round_to_rupee() {
        assert_eq!(Money::from_paise(118_049).round_to_rupee().paise(), 118_000);
        assert_eq!(Money::from_paise(118_050).round_to_rupee().paise(), 118_100);
        assert_eq!(Money::from_paise(-118_050).round_to_rupee().paise(), -118_100);
        assert_eq!(Money::from_paise(i64::MAX).round_to_rupee().paise(), i64::MAX - 7);
        assert!(Money::from_paise(118_100).is_whole_rupees());
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(Money::from_paise(-1).non_negative(), Money::zero());
        assert_eq!(Money::from_paise(7).non_negative().paise(), 7);
    }
}
