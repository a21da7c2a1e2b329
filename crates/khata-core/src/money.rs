//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A ledger that is off by a paisa does not balance, and an              │
//! │  unbalanced ledger is rejected.                                         │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise                                            │
//! │    ₹10.00 split three ways = 334 + 333 + 333 paise                      │
//! │    Every split is explicit and sums back exactly                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use khata_core::money::Money;
//!
//! let price = Money::from_paise(109_900); // ₹1099.00
//! let doubled = price * 2;
//! let total = price + Money::from_paise(500);
//! assert_eq!(doubled.paise(), 219_800);
//! assert_eq!(total.paise(), 110_400);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// Basis points in one whole (100%).
pub const BPS_SCALE: i64 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in paise (1/100 rupee).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for round-off and reversals
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support; serializes as a plain integer
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Item.sale_price ──► LineInput.unit_price ──► ComputedLine.taxable      │
/// │                                                     │                   │
/// │                                     GstBreakup ◄────┘                   │
/// │                                         │                               │
/// │  DocumentTotals.grand_total ◄───────────┘                               │
/// │         │                                                               │
/// │         ▼                                                               │
/// │  JournalDraft (Dr party / Cr sales, Cr output GST)                      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
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
    /// use khata_core::money::Money;
    ///
    /// let price = Money::from_paise(1099); // ₹10.99
    /// assert_eq!(price.paise(), 1099);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from rupees and paise.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// assert_eq!(Money::from_rupees_paise(10, 99).paise(), 1099);
    /// assert_eq!(Money::from_rupees_paise(-5, 50).paise(), -550);
    /// ```
    ///
    /// ## Note
    /// For negative amounts, only the rupee part should be negative.
    #[inline]
    pub const fn from_rupees_paise(rupees: i64, paise: i64) -> Self {
        if rupees < 0 {
            Money(rupees * 100 - paise)
        } else {
            Money(rupees * 100 + paise)
        }
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion.
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
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

    /// Calculates tax at the given rate, rounding half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    /// use khata_core::types::TaxRate;
    ///
    /// // ₹10.00 at 12.5% = ₹1.25
    /// let tax = Money::from_paise(1000).calculate_tax(TaxRate::from_bps(1250));
    /// assert_eq!(tax.paise(), 125);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.percentage(i64::from(rate.bps()), BPS_SCALE)
    }

    /// Returns `self × numerator / denominator`, rounded half away from zero.
    ///
    /// ## Usage
    /// GST halves use a denominator of 20000 so that a 0.25% rate splits
    /// into two exact 0.125% halves without first rounding the rate.
    pub fn percentage(&self, numerator: i64, denominator: i64) -> Money {
        Money(div_round(
            i128::from(self.0) * i128::from(numerator),
            i128::from(denominator),
        ) as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Multiplies by a quantity, or `None` if the product leaves `i64`.
    #[inline]
    pub const fn checked_mul_quantity(&self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(paise) => Some(Money(paise)),
            None => None,
        }
    }

    /// Adds two amounts, or `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(paise) => Some(Money(paise)),
            None => None,
        }
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// let subtotal = Money::from_paise(10_000);
    /// assert_eq!(subtotal.apply_percentage_discount(1000).paise(), 9_000);
    /// ```
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        *self - self.percentage(i64::from(discount_bps), BPS_SCALE)
    }

    /// Rounds to the nearest whole rupee (half up) and returns the rounded
    /// amount together with the round-off that was added.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// let (rounded, round_off) = Money::from_paise(123_450).round_to_rupee();
    /// assert_eq!(rounded.paise(), 123_500);
    /// assert_eq!(round_off.paise(), 50);
    ///
    /// let (rounded, round_off) = Money::from_paise(123_449).round_to_rupee();
    /// assert_eq!(rounded.paise(), 123_400);
    /// assert_eq!(round_off.paise(), -49);
    /// ```
    pub fn round_to_rupee(&self) -> (Money, Money) {
        let rounded = div_round(i128::from(self.0), 100) as i64 * 100;
        (Money(rounded), Money(rounded - self.0))
    }

    /// Splits the amount across `weights` in proportion, using the
    /// largest-remainder method. The parts always sum to `self`.
    ///
    /// Returns all zeros when every weight is zero.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// let parts = Money::from_paise(1000).allocate(&[1, 1, 1]);
    /// let paise: Vec<i64> = parts.iter().map(|m| m.paise()).collect();
    /// assert_eq!(paise, vec![334, 333, 333]);
    /// ```
    pub fn allocate(&self, weights: &[i64]) -> Vec<Money> {
        let total_weight: i128 = weights.iter().map(|w| i128::from((*w).max(0))).sum();
        if total_weight == 0 {
            return vec![Money::zero(); weights.len()];
        }

        let amount = i128::from(self.0);
        let mut parts = Vec::with_capacity(weights.len());
        let mut remainders = Vec::with_capacity(weights.len());
        let mut assigned: i128 = 0;

        for (idx, weight) in weights.iter().enumerate() {
            let product = amount * i128::from((*weight).max(0));
            let share = product / total_weight;
            parts.push(share);
            remainders.push((product % total_weight, idx));
            assigned += share;
        }

        // Hand out the leftover paise to the largest remainders first;
        // ties go to the earliest index.
        let mut leftover = amount - assigned;
        let step: i128 = if leftover < 0 { -1 } else { 1 };
        remainders.sort_by(|a, b| b.0.abs().cmp(&a.0.abs()).then(a.1.cmp(&b.1)));
        for (_, idx) in remainders.iter().cycle() {
            if leftover == 0 {
                break;
            }
            parts[*idx] += step;
            leftover -= step;
        }

        parts.into_iter().map(|p| Money(p as i64)).collect()
    }
}

/// Integer division rounding half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if (numerator < 0) != (denominator < 0) {
        (numerator - half) / denominator
    } else {
        (numerator + half) / denominator
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation for logs and error messages.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by quantity.
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
        let money = Money::from_paise(1099);
        assert_eq!(money.paise(), 1099);
        assert_eq!(money.rupees(), 10);
        assert_eq!(money.paise_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_paise(1099)), "₹10.99");
        assert_eq!(format!("{}", Money::from_paise(500)), "₹5.00");
        assert_eq!(format!("{}", Money::from_paise(-550)), "-₹5.50");
        assert_eq!(format!("{}", Money::zero()), "₹0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_paise(1000);
        let b = Money::from_paise(500);

        assert_eq!((a + b).paise(), 1500);
        assert_eq!((a - b).paise(), 500);
        assert_eq!((a * 3).paise(), 3000);
        assert_eq!((-a).paise(), -1000);
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.paise(), 2000);
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // ₹10.05 at 5% = 50.25 paise → 50
        assert_eq!(Money::from_paise(1005).calculate_tax(TaxRate::from_bps(500)).paise(), 50);
        // ₹0.10 at 5% = 0.5 paise → 1
        assert_eq!(Money::from_paise(10).calculate_tax(TaxRate::from_bps(500)).paise(), 1);
        // Negative amounts mirror positive ones
        assert_eq!(Money::from_paise(-10).calculate_tax(TaxRate::from_bps(500)).paise(), -1);
    }

    #[test]
    fn test_percentage_half_rate() {
        // ₹100.00 at 0.125% = 12.5 paise → 13
        assert_eq!(Money::from_paise(10_000).percentage(25, 20_000).paise(), 13);
    }

    #[test]
    fn test_round_to_rupee_negative() {
        let (rounded, off) = Money::from_paise(-150).round_to_rupee();
        assert_eq!(rounded.paise(), -200);
        assert_eq!(off.paise(), -50);
    }

    #[test]
    fn test_allocate_sums_exactly() {
        let amount = Money::from_paise(1001);
        let parts = amount.allocate(&[500, 300, 200]);
        let sum: Money = parts.iter().sum();
        assert_eq!(sum, amount);
        assert_eq!(parts[0].paise(), 501);
        assert_eq!(parts[1].paise(), 300);
        assert_eq!(parts[2].paise(), 200);
    }

    #[test]
    fn test_allocate_zero_weights() {
        let parts = Money::from_paise(100).allocate(&[0, 0]);
        assert!(parts.iter().all(|p| p.is_zero()));
    }

    #[test]
    fn test_allocate_negative_amount() {
        let parts = Money::from_paise(-100).allocate(&[1, 1, 1]);
        let sum: Money = parts.iter().sum();
        assert_eq!(sum.paise(), -100);
    }
}
