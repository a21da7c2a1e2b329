//! # Posting Module
//!
//! Turns business documents into balanced journal entries.
//!
//! ## Entries Produced
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sales invoice            Dr Customer        grand total                │
//! │                           Cr Sales           taxable                    │
//! │                           Cr Output C/S/IGST tax                        │
//! │                           Cr/Dr Round Off    round-off                  │
//! │                                                                         │
//! │  POS sale                 Dr Cash / Bank     per tender, net of change  │
//! │                           Cr Sales, Output GST, Round Off (as above)    │
//! │                                                                         │
//! │  Purchase bill            Dr Purchases       taxable                    │
//! │                           Dr Input C/S/IGST  tax                        │
//! │                           Cr Supplier        grand total                │
//! │                           Dr/Cr Round Off    round-off                  │
//! │                                                                         │
//! │  Receipt (customer pays)  Dr Cash / Bank     Cr Customer                │
//! │  Payment (pay supplier)   Dr Supplier        Cr Cash / Bank             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Zero-amount lines are left out. Every function ends in
//! [`JournalDraft::validate`], so a rounding slip surfaces as
//! `UnbalancedEntry` instead of a skewed ledger.

use chrono::NaiveDate;

use crate::document::DocumentTotals;
use crate::error::CoreResult;
use crate::journal::{BalancedEntry, JournalDraft, VoucherType};
use crate::ledger::{find_system_account, Account, SystemAccount};
use crate::money::Money;
use crate::types::PaymentMethod;

/// Ids of the system accounts the posting rules need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingAccounts {
    pub cash: String,
    pub bank: String,
    pub sales: String,
    pub purchases: String,
    pub output_cgst: String,
    pub output_sgst: String,
    pub output_igst: String,
    pub input_cgst: String,
    pub input_sgst: String,
    pub input_igst: String,
    pub round_off: String,
    pub inventory_adjustment: String,
}

impl PostingAccounts {
    /// Resolves every tag from a company's chart.
    pub fn resolve(accounts: &[Account]) -> CoreResult<Self> {
        let id = |tag| find_system_account(accounts, tag).map(|a| a.id.clone());
        Ok(PostingAccounts {
            cash: id(SystemAccount::Cash)?,
            bank: id(SystemAccount::Bank)?,
            sales: id(SystemAccount::Sales)?,
            purchases: id(SystemAccount::Purchases)?,
            output_cgst: id(SystemAccount::OutputCgst)?,
            output_sgst: id(SystemAccount::OutputSgst)?,
            output_igst: id(SystemAccount::OutputIgst)?,
            input_cgst: id(SystemAccount::InputCgst)?,
            input_sgst: id(SystemAccount::InputSgst)?,
            input_igst: id(SystemAccount::InputIgst)?,
            round_off: id(SystemAccount::RoundOff)?,
            inventory_adjustment: id(SystemAccount::InventoryAdjustment)?,
        })
    }

    /// Cash goes to the cash account; every other method to the bank.
    pub fn for_method(&self, method: PaymentMethod) -> &str {
        if method.is_cash() {
            &self.cash
        } else {
            &self.bank
        }
    }
}

/// Adds the sales, output tax and round-off side shared by invoices and
/// POS bills.
fn credit_sales_side(draft: JournalDraft, totals: &DocumentTotals, acc: &PostingAccounts) -> JournalDraft {
    let draft = draft
        .credit_nonzero(&acc.sales, totals.taxable)
        .credit_nonzero(&acc.output_cgst, totals.cgst)
        .credit_nonzero(&acc.output_sgst, totals.sgst)
        .credit_nonzero(&acc.output_igst, totals.igst);

    if totals.round_off.is_negative() {
        draft.debit(&acc.round_off, -totals.round_off)
    } else {
        draft.credit_nonzero(&acc.round_off, totals.round_off)
    }
}

/// Sales invoice posting.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use khata_core::document::DocumentTotals;
/// use khata_core::money::Money;
/// use khata_core::posting::{sales_entry, PostingAccounts};
///
/// let acc = PostingAccounts {
///     cash: "cash".into(), bank: "bank".into(), sales: "sales".into(),
///     purchases: "purch".into(), output_cgst: "ocgst".into(),
///     output_sgst: "osgst".into(), output_igst: "oigst".into(),
///     input_cgst: "icgst".into(), input_sgst: "isgst".into(),
///     input_igst: "iigst".into(), round_off: "ro".into(),
///     inventory_adjustment: "adj".into(),
/// };
/// let totals = DocumentTotals {
///     taxable: Money::from_paise(10_000),
///     cgst: Money::from_paise(900),
///     sgst: Money::from_paise(900),
///     grand_total: Money::from_paise(11_800),
///     ..Default::default()
/// };
/// let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
/// let entry = sales_entry(date, "INV/2025-26/0001", "cust", &totals, &acc).unwrap();
/// assert_eq!(entry.total().paise(), 11_800);
/// assert_eq!(entry.lines().len(), 4); // no IGST, no round-off
/// ```
pub fn sales_entry(
    date: NaiveDate,
    number: &str,
    customer_account: &str,
    totals: &DocumentTotals,
    acc: &PostingAccounts,
) -> CoreResult<BalancedEntry> {
    let draft = JournalDraft::new(date, VoucherType::Sales)
        .narration(format!("Sales invoice {}", number))
        .reference(number)
        .debit_nonzero(customer_account, totals.grand_total);

    credit_sales_side(draft, totals, acc).validate()
}

/// POS sale posting. `tenders` are amounts actually kept per method, i.e.
/// cash already net of change.
pub fn pos_sale_entry(
    date: NaiveDate,
    number: &str,
    tenders: &[(PaymentMethod, Money)],
    totals: &DocumentTotals,
    acc: &PostingAccounts,
) -> CoreResult<BalancedEntry> {
    let mut draft = JournalDraft::new(date, VoucherType::Pos)
        .narration(format!("POS sale {}", number))
        .reference(number);

    let cash: Money = tenders.iter().filter(|(m, _)| m.is_cash()).map(|(_, a)| *a).sum();
    let bank: Money = tenders.iter().filter(|(m, _)| !m.is_cash()).map(|(_, a)| *a).sum();
    draft = draft.debit_nonzero(&acc.cash, cash).debit_nonzero(&acc.bank, bank);

    credit_sales_side(draft, totals, acc).validate()
}

/// Purchase bill posting.
pub fn purchase_entry(
    date: NaiveDate,
    number: &str,
    supplier_account: &str,
    totals: &DocumentTotals,
    acc: &PostingAccounts,
) -> CoreResult<BalancedEntry> {
    let draft = JournalDraft::new(date, VoucherType::Purchase)
        .narration(format!("Purchase bill {}", number))
        .reference(number)
        .debit_nonzero(&acc.purchases, totals.taxable)
        .debit_nonzero(&acc.input_cgst, totals.cgst)
        .debit_nonzero(&acc.input_sgst, totals.sgst)
        .debit_nonzero(&acc.input_igst, totals.igst)
        .credit_nonzero(supplier_account, totals.grand_total);

    let draft = if totals.round_off.is_negative() {
        draft.credit(&acc.round_off, -totals.round_off)
    } else {
        draft.debit_nonzero(&acc.round_off, totals.round_off)
    };

    draft.validate()
}

/// Money received from a customer against an invoice.
pub fn receipt_entry(
    date: NaiveDate,
    reference: &str,
    customer_account: &str,
    method: PaymentMethod,
    amount: Money,
    acc: &PostingAccounts,
) -> CoreResult<BalancedEntry> {
    JournalDraft::new(date, VoucherType::Receipt)
        .narration(format!("Receipt against {}", reference))
        .reference(reference)
        .debit(acc.for_method(method), amount)
        .credit(customer_account, amount)
        .validate()
}

/// Money paid to a supplier against a bill.
pub fn payment_entry(
    date: NaiveDate,
    reference: &str,
    supplier_account: &str,
    method: PaymentMethod,
    amount: Money,
    acc: &PostingAccounts,
) -> CoreResult<BalancedEntry> {
    JournalDraft::new(date, VoucherType::Payment)
        .narration(format!("Payment against {}", reference))
        .reference(reference)
        .debit(supplier_account, amount)
        .credit(acc.for_method(method), amount)
        .validate()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::ledger::{default_chart, Account};
    use chrono::Utc;

    fn accounts() -> PostingAccounts {
        let chart: Vec<Account> = default_chart()
            .iter()
            .map(|c| Account {
                id: format!("acc-{}", c.code),
                company_id: "co".to_string(),
                code: c.code.to_string(),
                name: c.name.to_string(),
                account_type: c.account_type,
                system_tag: c.system,
                party_id: None,
                is_active: true,
                created_at: Utc::now(),
            })
            .collect();
        PostingAccounts::resolve(&chart).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
    }

    fn totals(taxable: i64, cgst: i64, sgst: i64, igst: i64, round_off: i64) -> DocumentTotals {
        DocumentTotals {
            gross: Money::from_paise(taxable),
            discount: Money::zero(),
            taxable: Money::from_paise(taxable),
            cgst: Money::from_paise(cgst),
            sgst: Money::from_paise(sgst),
            igst: Money::from_paise(igst),
            round_off: Money::from_paise(round_off),
            grand_total: Money::from_paise(taxable + cgst + sgst + igst + round_off),
        }
    }

    #[test]
    fn test_resolve_from_default_chart() {
        let acc = accounts();
        assert_eq!(acc.cash, "acc-1000");
        assert_eq!(acc.for_method(PaymentMethod::Upi), "acc-1010");
    }

    #[test]
    fn test_sales_with_negative_round_off() {
        let acc = accounts();
        let entry = sales_entry(date(), "INV/1", "cust", &totals(99_950, 0, 0, 17_991, -41), &acc).unwrap();
        let ro = entry.lines().iter().find(|l| l.account_id == acc.round_off).unwrap();
        assert_eq!(ro.debit.paise(), 41);
        assert_eq!(entry.total().paise(), 117_941);
    }

    #[test]
    fn test_sales_with_positive_round_off() {
        let acc = accounts();
        let entry = sales_entry(date(), "INV/2", "cust", &totals(10_000, 625, 625, 0, 50), &acc).unwrap();
        let ro = entry.lines().iter().find(|l| l.account_id == acc.round_off).unwrap();
        assert_eq!(ro.credit.paise(), 50);
    }

    #[test]
    fn test_purchase_entry_balances() {
        let acc = accounts();
        let entry = purchase_entry(date(), "BILL/1", "supp", &totals(50_000, 4_500, 4_500, 0, 0), &acc).unwrap();
        assert_eq!(entry.voucher_type(), VoucherType::Purchase);
        assert_eq!(entry.total().paise(), 59_000);
        let supplier = entry.lines().iter().find(|l| l.account_id == "supp").unwrap();
        assert_eq!(supplier.credit.paise(), 59_000);
    }

    #[test]
    fn test_pos_sale_split_tenders() {
        let acc = accounts();
        let tenders = [
            (PaymentMethod::Cash, Money::from_paise(5_000)),
            (PaymentMethod::Card, Money::from_paise(3_000)),
            (PaymentMethod::Upi, Money::from_paise(2_500)),
        ];
        let entry = pos_sale_entry(date(), "POS/1", &tenders, &totals(10_000, 250, 250, 0, 0), &acc).unwrap();
        let bank = entry.lines().iter().find(|l| l.account_id == acc.bank).unwrap();
        assert_eq!(bank.debit.paise(), 5_500);
    }

    #[test]
    fn test_pos_sale_short_tender_unbalanced() {
        let acc = accounts();
        let tenders = [(PaymentMethod::Cash, Money::from_paise(100))];
        let result = pos_sale_entry(date(), "POS/2", &tenders, &totals(10_000, 250, 250, 0, 0), &acc);
        assert!(matches!(result, Err(CoreError::UnbalancedEntry { .. })));
    }

    #[test]
    fn test_receipt_and_payment() {
        let acc = accounts();
        let r = receipt_entry(date(), "INV/1", "cust", PaymentMethod::Cash, Money::from_paise(500), &acc).unwrap();
        assert_eq!(r.lines()[0].account_id, acc.cash);
        let p = payment_entry(date(), "BILL/1", "supp", PaymentMethod::BankTransfer, Money::from_paise(500), &acc).unwrap();
        assert_eq!(p.lines()[1].account_id, acc.bank);
        assert!(receipt_entry(date(), "x", "cust", PaymentMethod::Cash, Money::zero(), &acc).is_err());
    }
}
