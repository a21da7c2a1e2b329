//! # Discount Module
//!
//! Discount rules and coupon codes.
//!
//! A rule produces a discount amount for an order total. The amount is
//! always capped by the rule's `max_discount` and by the order total
//! itself, so a discount never takes a price below zero.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, BPS_SCALE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is in basis points.
    Percentage,
    /// `value` is in paise.
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DiscountRule {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub kind: DiscountKind,
    pub value: i64,
    /// Order total below which the rule does not apply.
    pub min_order: Money,
    pub max_discount: Option<Money>,
    #[ts(as = "Option<String>")]
    pub valid_from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub valid_until: Option<NaiveDate>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Checks the numeric fields of a rule before it is stored.
pub fn validate_rule(
    kind: DiscountKind,
    value: i64,
    min_order: Money,
    max_discount: Option<Money>,
    valid_from: Option<NaiveDate>,
    valid_until: Option<NaiveDate>,
) -> CoreResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "value".to_string(),
        }
        .into());
    }
    if kind == DiscountKind::Percentage && value > BPS_SCALE {
        return Err(ValidationError::OutOfRange {
            field: "value".to_string(),
            min: 1,
            max: BPS_SCALE,
        }
        .into());
    }
    if min_order.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "min_order".to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }
    if matches!(max_discount, Some(cap) if !cap.is_positive()) {
        return Err(ValidationError::MustBePositive {
            field: "max_discount".to_string(),
        }
        .into());
    }
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if from > until {
            return Err(ValidationError::invalid_format("valid_until", "must not be before valid_from").into());
        }
    }
    Ok(())
}

impl DiscountRule {
    /// Discount this rule gives on `order_total` on `date`.
    ///
    /// ## Example
    /// ```rust
    /// # use chrono::{NaiveDate, Utc};
    /// # use khata_core::discount::{DiscountKind, DiscountRule};
    /// # use khata_core::money::Money;
    /// let rule = DiscountRule {
    ///     id: "r1".into(), company_id: "co".into(), name: "Diwali 10%".into(),
    ///     kind: DiscountKind::Percentage, value: 1000,
    ///     min_order: Money::from_paise(50_000),
    ///     max_discount: Some(Money::from_paise(20_000)),
    ///     valid_from: None, valid_until: None, is_active: true,
    ///     created_at: Utc::now(),
    /// };
    /// let today = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
    /// assert_eq!(rule.discount_for(Money::from_paise(100_000), today).unwrap().paise(), 10_000);
    /// assert_eq!(rule.discount_for(Money::from_paise(500_000), today).unwrap().paise(), 20_000);
    /// assert!(rule.discount_for(Money::from_paise(10_000), today).is_err());
    /// ```
    pub fn discount_for(&self, order_total: Money, date: NaiveDate) -> CoreResult<Money> {
        if !self.is_active {
            return Err(self.not_applicable("rule is inactive"));
        }
        if matches!(self.valid_from, Some(from) if date < from) {
            return Err(self.not_applicable("rule has not started"));
        }
        if matches!(self.valid_until, Some(until) if date > until) {
            return Err(self.not_applicable("rule has expired"));
        }
        if order_total < self.min_order {
            return Err(CoreError::DiscountNotApplicable {
                reason: format!("{}: minimum order is {}", self.name, self.min_order),
            });
        }

        let raw = match self.kind {
            DiscountKind::Percentage => order_total.percentage(self.value, BPS_SCALE),
            DiscountKind::Flat => Money::from_paise(self.value),
        };

        let capped = match self.max_discount {
            Some(cap) => raw.min(cap),
            None => raw,
        };
        Ok(capped.min(order_total).max(Money::zero()))
    }

    fn not_applicable(&self, reason: &str) -> CoreError {
        CoreError::DiscountNotApplicable {
            reason: format!("{}: {}", self.name, reason),
        }
    }
}

/// The rule giving the largest discount, if any applies.
pub fn best_discount<'a>(
    rules: &'a [DiscountRule],
    order_total: Money,
    date: NaiveDate,
) -> Option<(&'a DiscountRule, Money)> {
    rules
        .iter()
        .filter_map(|r| r.discount_for(order_total, date).ok().map(|d| (r, d)))
        .filter(|(_, d)| d.is_positive())
        .max_by_key(|(_, d)| *d)
}

// =============================================================================
// Coupons
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    pub company_id: String,
    /// Stored upper-case.
    pub code: String,
    pub rule_id: String,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub per_customer_limit: Option<i64>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Coupon codes are case-insensitive: 4 to 20 letters or digits.
pub fn normalize_code(code: &str) -> CoreResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() < 4 || code.len() > 20 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::invalid_format("code", "must be 4-20 letters or digits").into());
    }
    Ok(code)
}

impl Coupon {
    /// Checks usage limits. `customer_uses` is how often the redeeming
    /// customer already used this coupon (0 for walk-in sales).
    pub fn check_redeemable(&self, customer_uses: i64) -> CoreResult<()> {
        if !self.is_active {
            return Err(CoreError::DiscountNotApplicable {
                reason: format!("coupon {} is inactive", self.code),
            });
        }
        if matches!(self.usage_limit, Some(limit) if self.used_count >= limit) {
            return Err(CoreError::DiscountNotApplicable {
                reason: format!("coupon {} has been fully used", self.code),
            });
        }
        if matches!(self.per_customer_limit, Some(limit) if customer_uses >= limit) {
            return Err(CoreError::DiscountNotApplicable {
                reason: format!("coupon {} already used by this customer", self.code),
            });
        }
        Ok(())
    }
}

/// Result of validating a coupon against an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CouponQuote {
    pub code: String,
    pub rule_name: String,
    pub discount: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================
