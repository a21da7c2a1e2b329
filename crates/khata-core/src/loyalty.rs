//! # Loyalty Module
//!
//! Points earned on purchases and redeemed against later bills.
//!
//! ## Earning and Redeeming
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Earn:   floor(bill / ₹100 × earn_points_per_100 × tier multiplier)     │
//! │                                                                         │
//! │  Redeem: value = points × point_value_paise                             │
//! │          points ≥ min_redeem_points                                     │
//! │          points ≤ balance                                               │
//! │          value  ≤ bill × max_redeem_bps / 10000                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tiers are decided by lifetime points, so redeeming never demotes a
//! customer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, BPS_SCALE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyTier {
    pub name: String,
    pub min_lifetime_points: i64,
    /// 10000 = 1×, 15000 = 1.5×.
    pub multiplier_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoyaltyProgram {
    pub earn_points_per_100: i64,
    pub point_value_paise: i64,
    pub min_redeem_points: i64,
    /// Largest share of a bill that points may pay for.
    pub max_redeem_bps: u32,
    pub is_active: bool,
    pub tiers: Vec<LoyaltyTier>,
}

impl Default for LoyaltyProgram {
    fn default() -> Self {
        LoyaltyProgram {
            earn_points_per_100: 1,
            point_value_paise: 100,
            min_redeem_points: 100,
            max_redeem_bps: 5_000,
            is_active: false,
            tiers: Vec::new(),
        }
    }
}

/// A redemption the program has approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RedemptionPlan {
    pub points: i64,
    pub value: Money,
}

impl LoyaltyProgram {
    pub fn validate(&self) -> CoreResult<()> {
        if self.earn_points_per_100 < 0 {
            return Err(ValidationError::OutOfRange {
                field: "earn_points_per_100".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
        if self.point_value_paise <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "point_value_paise".to_string(),
            }
            .into());
        }
        if self.min_redeem_points < 0 {
            return Err(ValidationError::OutOfRange {
                field: "min_redeem_points".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
        crate::validation::validate_bps("max_redeem_bps", self.max_redeem_bps)?;

        for tier in &self.tiers {
            if tier.name.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: "tier name".to_string(),
                }
                .into());
            }
            if tier.multiplier_bps == 0 || tier.min_lifetime_points < 0 {
                return Err(ValidationError::invalid_format(
                    "tiers",
                    format!("tier {} has an invalid threshold or multiplier", tier.name),
                )
                .into());
            }
        }
        let mut thresholds: Vec<i64> = self.tiers.iter().map(|t| t.min_lifetime_points).collect();
        thresholds.sort_unstable();
        thresholds.dedup();
        if thresholds.len() != self.tiers.len() {
            return Err(ValidationError::invalid_format("tiers", "thresholds must be unique").into());
        }
        Ok(())
    }

    /// Highest tier whose threshold `lifetime_points` has reached.
    pub fn tier_for(&self, lifetime_points: i64) -> Option<&LoyaltyTier> {
        self.tiers
            .iter()
            .filter(|t| t.min_lifetime_points <= lifetime_points)
            .max_by_key(|t| t.min_lifetime_points)
    }

    /// Points earned on a bill, rounded down.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::loyalty::{LoyaltyProgram, LoyaltyTier};
    /// use khata_core::money::Money;
    ///
    /// let program = LoyaltyProgram {
    ///     earn_points_per_100: 2,
    ///     tiers: vec![LoyaltyTier { name: "Gold".into(), min_lifetime_points: 1000, multiplier_bps: 15_000 }],
    ///     is_active: true,
    ///     ..Default::default()
    /// };
    /// // ₹1,250 → 25 points; Gold members earn 1.5× → 37
    /// assert_eq!(program.points_earned(Money::from_paise(125_000), 0), 25);
    /// assert_eq!(program.points_earned(Money::from_paise(125_000), 5_000), 37);
    /// ```
    pub fn points_earned(&self, amount: Money, lifetime_points: i64) -> i64 {
        if !self.is_active || !amount.is_positive() {
            return 0;
        }
        let multiplier = self
            .tier_for(lifetime_points)
            .map(|t| i128::from(t.multiplier_bps))
            .unwrap_or(i128::from(BPS_SCALE));

        let points = i128::from(amount.paise()) * i128::from(self.earn_points_per_100) * multiplier
            / (10_000 * i128::from(BPS_SCALE));
        points as i64
    }

    pub fn redemption_value(&self, points: i64) -> Money {
        Money::from_paise(points * self.point_value_paise)
    }

    /// Most points that may be spent on a bill of `bill`.
    pub fn max_redeemable_points(&self, balance: i64, bill: Money) -> i64 {
        if bill.is_negative() {
            return 0;
        }
        let cap_value = bill.paise() as i128 * i128::from(self.max_redeem_bps) / i128::from(BPS_SCALE);
        let by_value = (cap_value / i128::from(self.point_value_paise)) as i64;
        balance.max(0).min(by_value)
    }

    /// Approves or rejects a redemption of `requested` points.
    pub fn plan_redemption(&self, requested: i64, balance: i64, bill: Money) -> CoreResult<RedemptionPlan> {
        let reject = |reason: String| Err(CoreError::LoyaltyRedemption { reason });

        if !self.is_active {
            return reject("loyalty program is not active".to_string());
        }
        if requested <= 0 {
            return reject("points to redeem must be positive".to_string());
        }
        if requested < self.min_redeem_points {
            return reject(format!("at least {} points must be redeemed", self.min_redeem_points));
        }
        if requested > balance {
            return reject(format!("balance is only {} points", balance));
        }
        let max = self.max_redeemable_points(balance, bill);
        if requested > max {
            return reject(format!("at most {} points can be used on this bill", max));
        }

        Ok(RedemptionPlan {
            points: requested,
            value: self.redemption_value(requested),
        })
    }
}

// =============================================================================
// Accounts and Ledger
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTxnKind {
    Earn,
    Redeem,
    /// Manual correction or reversal of a voided sale.
    Adjust,
}

/// A customer's points balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyAccount {
    pub company_id: String,
    pub party_id: String,
    pub balance: i64,
    pub lifetime_earned: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyAccount {
    /// Applies a signed movement. Only `Earn` counts toward lifetime
    /// points; the balance may never go negative.
    pub fn apply(&mut self, kind: LoyaltyTxnKind, points: i64) -> CoreResult<()> {
        let balance = self.balance + points;
        if balance < 0 {
            return Err(CoreError::LoyaltyRedemption {
                reason: format!("balance {} cannot cover {} points", self.balance, -points),
            });
        }
        self.balance = balance;
        if kind == LoyaltyTxnKind::Earn && points > 0 {
            self.lifetime_earned += points;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyTransaction {
    pub id: String,
    pub company_id: String,
    pub party_id: String,
    pub kind: LoyaltyTxnKind,
    /// Positive adds points, negative removes them.
    pub points: i64,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> LoyaltyProgram {
        LoyaltyProgram {
            earn_points_per_100: 1,
            point_value_paise: 50,
            min_redeem_points: 100,
            max_redeem_bps: 2_000,
            is_active: true,
            tiers: vec![
                LoyaltyTier {
                    name: "Silver".to_string(),
                    min_lifetime_points: 500,
                    multiplier_bps: 12_500,
                },
                LoyaltyTier {
                    name: "Gold".to_string(),
                    min_lifetime_points: 2_000,
                    multiplier_bps: 20_000,
                },
            ],
        }
    }

    #[test]
    fn test_tier_for() {
        let p = program();
        assert!(p.tier_for(499).is_none());
        assert_eq!(p.tier_for(500).unwrap().name, "Silver");
        assert_eq!(p.tier_for(10_000).unwrap().name, "Gold");
    }

    #[test]
    fn test_points_round_down() {
        let p = program();
        assert_eq!(p.points_earned(Money::from_paise(19_999), 0), 1);
        assert_eq!(p.points_earned(Money::from_paise(100_000), 2_000), 20);
        assert_eq!(p.points_earned(Money::from_paise(-5_000), 0), 0);
    }

    #[test]
    fn test_inactive_program_earns_nothing() {
        let mut p = program();
        p.is_active = false;
        assert_eq!(p.points_earned(Money::from_paise(100_000), 0), 0);
        assert!(p.plan_redemption(100, 1_000, Money::from_paise(100_000)).is_err());
    }

    #[test]
    fn test_plan_redemption_limits() {
        let p = program();
        let bill = Money::from_paise(100_000); // 20% cap = ₹200 = 400 points
        assert_eq!(p.max_redeemable_points(10_000, bill), 400);

        let plan = p.plan_redemption(300, 1_000, bill).unwrap();
        assert_eq!(plan.value.paise(), 15_000);

        assert!(p.plan_redemption(50, 1_000, bill).is_err()); // below minimum
        assert!(p.plan_redemption(300, 200, bill).is_err()); // over balance
        assert!(p.plan_redemption(500, 1_000, bill).is_err()); // over bill cap
    }

    #[test]
    fn test_account_never_negative() {
        let mut acct = LoyaltyAccount {
            company_id: "co".to_string(),
            party_id: "p".to_string(),
            balance: 0,
            lifetime_earned: 0,
            updated_at: Utc::now(),
        };
        acct.apply(LoyaltyTxnKind::Earn, 120).unwrap();
        acct.apply(LoyaltyTxnKind::Redeem, -100).unwrap();
        assert_eq!(acct.balance, 20);
        assert_eq!(acct.lifetime_earned, 120);
        assert!(acct.apply(LoyaltyTxnKind::Redeem, -21).is_err());
        assert_eq!(acct.balance, 20);
    }

    #[test]
    fn test_validate_rejects_duplicate_thresholds() {
        let mut p = program();
        p.tiers[1].min_lifetime_points = 500;
        assert!(p.validate().is_err());
        assert!(program().validate().is_ok());
    }
}
