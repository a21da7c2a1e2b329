//! # POS Module
//!
//! Counter sessions, tender settlement and the live event feed payloads.
//!
//! ## Tender Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Bill ₹1,180.00                                                         │
//! │                                                                         │
//! │  Card  ₹500.00   ✓ non-cash, ≤ bill                                     │
//! │  UPI   ₹180.00   ✓ non-cash total ₹680.00 ≤ bill                        │
//! │  Cash  ₹600.00   ✓ cash may overpay                                     │
//! │  ──────────────                                                         │
//! │  Paid  ₹1,280.00 → change ₹100.00 (from cash only)                      │
//! │                                                                         │
//! │  Card ₹1,200.00  ✗ card/UPI/bank cannot overpay: no change for them     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::PaymentMethod;

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PosSessionStatus {
    Open,
    Closed,
}

/// A cashier's shift on one terminal.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PosSession {
    pub id: String,
    pub company_id: String,
    pub terminal_id: String,
    pub opened_by: String,
    pub opening_float: Money,
    pub status: PosSessionStatus,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    pub closed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub expected_cash: Option<Money>,
    pub counted_cash: Option<Money>,
    pub variance: Option<Money>,
}

impl PosSession {
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.status != PosSessionStatus::Open {
            return Err(CoreError::SessionNotOpen(self.id.clone()));
        }
        Ok(())
    }
}

/// Drawer count at close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashReconciliation {
    pub expected_cash: Money,
    pub counted_cash: Money,
    /// Counted minus expected: negative means the drawer is short.
    pub variance: Money,
}

/// Expected drawer cash = opening float + cash kept from completed sales.
pub fn reconcile_cash(opening_float: Money, net_cash_sales: Money, counted_cash: Money) -> CashReconciliation {
    let expected_cash = opening_float + net_cash_sales;
    CashReconciliation {
        expected_cash,
        counted_cash,
        variance: counted_cash - expected_cash,
    }
}

// =============================================================================
// Tenders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tender {
    pub method: PaymentMethod,
    pub amount: Money,
}

/// Accepted tenders for a bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    pub tenders: Vec<Tender>,
    pub paid: Money,
    pub change: Money,
}

impl Settlement {
    /// Amount kept per method, with change taken out of cash.
    pub fn kept_by_method(&self) -> Vec<(PaymentMethod, Money)> {
        let mut change_left = self.change;
        let mut kept = Vec::with_capacity(self.tenders.len());
        for tender in &self.tenders {
            let mut amount = tender.amount;
            if tender.method.is_cash() && change_left.is_positive() {
                let taken = amount.min(change_left);
                amount -= taken;
                change_left -= taken;
            }
            if amount.is_positive() {
                kept.push((tender.method, amount));
            }
        }
        kept
    }

    pub fn net_cash(&self) -> Money {
        self.kept_by_method()
            .iter()
            .filter(|(m, _)| m.is_cash())
            .map(|(_, a)| *a)
            .sum()
    }
}

/// Validates tenders against a bill total.
///
/// ## Example
/// ```rust
/// use khata_core::money::Money;
/// use khata_core::pos::{settle_tenders, Tender};
/// use khata_core::types::PaymentMethod;
///
/// let s = settle_tenders(Money::from_paise(118_000), &[
///     Tender { method: PaymentMethod::Card, amount: Money::from_paise(50_000) },
///     Tender { method: PaymentMethod::Cash, amount: Money::from_paise(78_000) },
/// ]).unwrap();
/// assert_eq!(s.change.paise(), 10_000);
/// ```
fn sum_tenders<'a>(mut tenders: impl Iterator<Item = &'a Tender>) -> CoreResult<Money> {
    tenders.try_fold(Money::zero(), |acc, t| {
        acc.checked_add(t.amount).ok_or_else(|| CoreError::InvalidTender {
            reason: "tender amounts are too large".to_string(),
        })
    })
}

pub fn settle_tenders(total: Money, tenders: &[Tender]) -> CoreResult<Settlement> {
    if total.is_negative() {
        return Err(CoreError::InvalidTender {
            reason: "bill total cannot be negative".to_string(),
        });
    }
    if tenders.is_empty() && total.is_positive() {
        return Err(CoreError::InvalidTender {
            reason: "at least one tender is required".to_string(),
        });
    }
    if let Some(bad) = tenders.iter().find(|t| !t.amount.is_positive()) {
        return Err(CoreError::InvalidTender {
            reason: format!("{:?} tender must be positive, got {}", bad.method, bad.amount),
        });
    }

    let non_cash = sum_tenders(tenders.iter().filter(|t| !t.method.is_cash()))?;
    if non_cash > total {
        return Err(CoreError::InvalidTender {
            reason: format!("non-cash tenders {} exceed bill {}", non_cash, total),
        });
    }

    let paid = sum_tenders(tenders.iter())?;
    if paid < total {
        return Err(CoreError::InvalidTender {
            reason: format!("paid {} does not cover bill {}", paid, total),
        });
    }

    Ok(Settlement {
        tenders: tenders.to_vec(),
        paid,
        change: paid - total,
    })
}

// =============================================================================
// Transactions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PosTransactionStatus {
    Completed,
    Voided,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PosTransaction {
    pub id: String,
    pub company_id: String,
    pub session_id: String,
    pub number: String,
    pub customer_id: Option<String>,
    pub coupon_code: Option<String>,
    pub coupon_discount: Money,
    pub points_redeemed: i64,
    pub points_discount: Money,
    pub points_earned: i64,
    pub gross: Money,
    pub discount: Money,
    pub taxable: Money,
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
    pub round_off: Money,
    pub grand_total: Money,
    pub paid: Money,
    pub change: Money,
    /// Cash kept after change; used for drawer reconciliation.
    pub net_cash: Money,
    pub status: PosTransactionStatus,
    /// `None` for a nil bill, which moves stock but posts nothing.
    pub journal_entry_id: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl PosTransaction {
    pub fn ensure_voidable(&self) -> CoreResult<()> {
        if self.status != PosTransactionStatus::Completed {
            return Err(CoreError::invalid_status("POS sale", &self.number, self.status, "void"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PosTenderRow {
    pub id: String,
    pub transaction_id: String,
    pub method: PaymentMethod,
    pub amount: Money,
}

// =============================================================================
// Live Feed
// =============================================================================

/// Events pushed to `/pos/live` subscribers of the same company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PosEvent {
    SessionOpened {
        company_id: String,
        session_id: String,
        terminal_id: String,
    },
    SessionClosed {
        company_id: String,
        session_id: String,
        terminal_id: String,
        variance: Money,
    },
    SaleCompleted {
        company_id: String,
        session_id: String,
        transaction_id: String,
        number: String,
        grand_total: Money,
    },
    SaleVoided {
        company_id: String,
        session_id: String,
        transaction_id: String,
        number: String,
    },
}

impl PosEvent {
    pub fn company_id(&self) -> &str {
        match self {
            PosEvent::SessionOpened { company_id, .. }
            | PosEvent::SessionClosed { company_id, .. }
            | PosEvent::SaleCompleted { company_id, .. }
            | PosEvent::SaleVoided { company_id, .. } => company_id,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(method: PaymentMethod, paise: i64) -> Tender {
        Tender {
            method,
            amount: Money::from_paise(paise),
        }
    }

    #[test]
    fn test_exact_card_payment() {
        let s = settle_tenders(Money::from_paise(1_000), &[t(PaymentMethod::Card, 1_000)]).unwrap();
        assert!(s.change.is_zero());
        assert!(s.net_cash().is_zero());
    }

    #[test]
    fn test_card_cannot_overpay() {
        let result = settle_tenders(Money::from_paise(1_000), &[t(PaymentMethod::Card, 1_200)]);
        assert!(matches!(result, Err(CoreError::InvalidTender { .. })));
    }

    #[test]
    fn test_huge_tenders_do_not_wrap() {
        let result = settle_tenders(
            Money::from_paise(1_000),
            &[t(PaymentMethod::Cash, i64::MAX), t(PaymentMethod::Cash, i64::MAX)],
        );
        assert!(matches!(result, Err(CoreError::InvalidTender { .. })));
    }

    #[test]
    fn test_nil_bill_needs_no_tender() {
        let s = settle_tenders(Money::zero(), &[]).unwrap();
        assert!(s.paid.is_zero());
        assert!(s.change.is_zero());
    }

    #[test]
    fn test_short_payment_rejected() {
        let result = settle_tenders(
            Money::from_paise(1_000),
            &[t(PaymentMethod::Upi, 400), t(PaymentMethod::Cash, 500)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_tender_rejected() {
        let result = settle_tenders(Money::from_paise(1_000), &[t(PaymentMethod::Cash, 0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_change_comes_out_of_cash() {
        let s = settle_tenders(
            Money::from_paise(118_000),
            &[t(PaymentMethod::Card, 50_000), t(PaymentMethod::Upi, 18_000), t(PaymentMethod::Cash, 60_000)],
        )
        .unwrap();
        assert_eq!(s.change.paise(), 10_000);
        let kept = s.kept_by_method();
        assert_eq!(kept.len(), 3);
        assert_eq!(s.net_cash().paise(), 50_000);
        let kept_total: Money = kept.iter().map(|(_, a)| *a).sum();
        assert_eq!(kept_total.paise(), 118_000);
    }

    #[test]
    fn test_reconcile_cash() {
        let r = reconcile_cash(Money::from_paise(200_000), Money::from_paise(550_000), Money::from_paise(749_500));
        assert_eq!(r.expected_cash.paise(), 750_000);
        assert_eq!(r.variance.paise(), -500);
    }

    #[test]
    fn test_event_serialization() {
        let event = PosEvent::SaleVoided {
            company_id: "co".to_string(),
            session_id: "s".to_string(),
            transaction_id: "t".to_string(),
            number: "POS/2025-26/000001".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sale_voided");
        assert_eq!(event.company_id(), "co");
    }
}
