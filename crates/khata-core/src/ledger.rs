//! # Ledger Module
//!
//! Chart of accounts and the statements built from account balances.
//!
//! ## Normal Balances
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Account type    Normal side    Increases with    Shown on              │
//! │  ────────────    ───────────    ──────────────    ────────              │
//! │  Asset           Debit          Dr                Balance sheet         │
//! │  Expense         Debit          Dr                Profit & loss         │
//! │  Liability       Credit         Cr                Balance sheet         │
//! │  Equity          Credit         Cr                Balance sheet         │
//! │  Income          Credit         Cr                Profit & loss         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::PartyKind;

// =============================================================================
// Account Type
// =============================================================================

/// Which side of a journal line increases an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl AccountType {
    pub const fn normal_side(&self) -> Side {
        match self {
            AccountType::Asset | AccountType::Expense => Side::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Income => Side::Credit,
        }
    }

    /// Income and expense accounts feed profit & loss.
    pub const fn is_nominal(&self) -> bool {
        matches!(self, AccountType::Income | AccountType::Expense)
    }
}

// =============================================================================
// System Accounts
// =============================================================================

/// Accounts the posting rules look up by tag rather than by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SystemAccount {
    Cash,
    Bank,
    Capital,
    Sales,
    Purchases,
    OutputCgst,
    OutputSgst,
    OutputIgst,
    InputCgst,
    InputSgst,
    InputIgst,
    RoundOff,
    InventoryAdjustment,
}

impl SystemAccount {
    /// Name used in `MissingSystemAccount` errors and logs.
    pub fn label(&self) -> &'static str {
        match self {
            SystemAccount::Cash => "cash",
            SystemAccount::Bank => "bank",
            SystemAccount::Capital => "capital",
            SystemAccount::Sales => "sales",
            SystemAccount::Purchases => "purchases",
            SystemAccount::OutputCgst => "output_cgst",
            SystemAccount::OutputSgst => "output_sgst",
            SystemAccount::OutputIgst => "output_igst",
            SystemAccount::InputCgst => "input_cgst",
            SystemAccount::InputSgst => "input_sgst",
            SystemAccount::InputIgst => "input_igst",
            SystemAccount::RoundOff => "round_off",
            SystemAccount::InventoryAdjustment => "inventory_adjustment",
        }
    }
}

/// One entry of the chart seeded for every new company.
#[derive(Debug, Clone, Copy)]
pub struct ChartEntry {
    pub code: &'static str,
    pub name: &'static str,
    pub account_type: AccountType,
    pub system: Option<SystemAccount>,
}

const fn chart(
    code: &'static str,
    name: &'static str,
    account_type: AccountType,
    system: Option<SystemAccount>,
) -> ChartEntry {
    ChartEntry {
        code,
        name,
        account_type,
        system,
    }
}

/// The default chart of accounts.
///
/// ```text
/// 1xxx Assets       1000 Cash  1010 Bank  1300-1320 Input GST
/// 2xxx Liabilities  2200-2220 Output GST
/// 3xxx Equity       3000 Capital
/// 4xxx Income       4000 Sales  4900 Round Off
/// 5xxx Expenses     5000 Purchases  5100 Inventory Adjustment
/// ```
pub fn default_chart() -> &'static [ChartEntry] {
    use AccountType::*;
    use SystemAccount as S;

    const CHART: &[ChartEntry] = &[
        chart("1000", "Cash in Hand", Asset, Some(S::Cash)),
        chart("1010", "Bank Account", Asset, Some(S::Bank)),
        chart("1300", "Input CGST", Asset, Some(S::InputCgst)),
        chart("1310", "Input SGST", Asset, Some(S::InputSgst)),
        chart("1320", "Input IGST", Asset, Some(S::InputIgst)),
        chart("2200", "Output CGST", Liability, Some(S::OutputCgst)),
        chart("2210", "Output SGST", Liability, Some(S::OutputSgst)),
        chart("2220", "Output IGST", Liability, Some(S::OutputIgst)),
        chart("3000", "Capital Account", Equity, Some(S::Capital)),
        chart("4000", "Sales", Income, Some(S::Sales)),
        chart("4900", "Round Off", Income, Some(S::RoundOff)),
        chart("5000", "Purchases", Expense, Some(S::Purchases)),
        chart("5100", "Inventory Adjustment", Expense, Some(S::InventoryAdjustment)),
        chart("5200", "Rent", Expense, None),
        chart("5300", "Salaries", Expense, None),
    ];
    CHART
}

/// Party ledgers get codes in these ranges: receivables are assets,
/// payables are liabilities.
pub fn party_account_type(kind: PartyKind) -> (AccountType, &'static str) {
    match kind {
        PartyKind::Customer => (AccountType::Asset, "1200"),
        PartyKind::Supplier => (AccountType::Liability, "2100"),
    }
}

// =============================================================================
// Account
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Account {
    pub id: String,
    pub company_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub system_tag: Option<SystemAccount>,
    /// Set when this is a customer's or supplier's ledger.
    pub party_id: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Finds the account carrying a system tag.
pub fn find_system_account(accounts: &[Account], tag: SystemAccount) -> CoreResult<&Account> {
    accounts
        .iter()
        .find(|a| a.system_tag == Some(tag))
        .ok_or_else(|| CoreError::MissingSystemAccount(tag.label().to_string()))
}

// =============================================================================
// Balances and Statements
// =============================================================================

/// Debit and credit totals of one account over a period.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AccountBalance {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_total: Money,
    pub credit_total: Money,
}

impl AccountBalance {
    /// Balance on the account's normal side: positive when the account
    /// carries its usual balance, negative when it is contra.
    pub fn closing(&self) -> Money {
        match self.account_type.normal_side() {
            Side::Debit => self.debit_total - self.credit_total,
            Side::Credit => self.credit_total - self.debit_total,
        }
    }

    /// Net balance expressed as (debit column, credit column).
    pub fn trial_columns(&self) -> (Money, Money) {
        let net = self.debit_total - self.credit_total;
        if net.is_negative() {
            (Money::zero(), -net)
        } else {
            (net, Money::zero())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrialBalanceRow {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit: Money,
    pub credit: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrialBalance {
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Money,
    pub total_credit: Money,
}

impl TrialBalance {
    /// Builds the trial balance, dropping accounts with no net balance.
    pub fn build(balances: &[AccountBalance]) -> Self {
        let rows: Vec<TrialBalanceRow> = balances
            .iter()
            .filter_map(|b| {
                let (debit, credit) = b.trial_columns();
                if debit.is_zero() && credit.is_zero() {
                    return None;
                }
                Some(TrialBalanceRow {
                    account_id: b.account_id.clone(),
                    code: b.code.clone(),
                    name: b.name.clone(),
                    account_type: b.account_type,
                    debit,
                    credit,
                })
            })
            .collect();

        let total_debit = rows.iter().map(|r| r.debit).sum();
        let total_credit = rows.iter().map(|r| r.credit).sum();

        TrialBalance {
            rows,
            total_debit,
            total_credit,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProfitAndLossRow {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProfitAndLoss {
    pub income: Vec<ProfitAndLossRow>,
    pub expenses: Vec<ProfitAndLossRow>,
    pub total_income: Money,
    pub total_expense: Money,
    /// Negative for a loss.
    pub net_profit: Money,
}

impl ProfitAndLoss {
    pub fn build(balances: &[AccountBalance]) -> Self {
        let rows_for = |ty: AccountType| -> Vec<ProfitAndLossRow> {
            balances
                .iter()
                .filter(|b| b.account_type == ty && !b.closing().is_zero())
                .map(|b| ProfitAndLossRow {
                    account_id: b.account_id.clone(),
                    code: b.code.clone(),
                    name: b.name.clone(),
                    amount: b.closing(),
                })
                .collect()
        };

        let income = rows_for(AccountType::Income);
        let expenses = rows_for(AccountType::Expense);
        let total_income: Money = income.iter().map(|r| r.amount).sum();
        let total_expense: Money = expenses.iter().map(|r| r.amount).sum();

        ProfitAndLoss {
            income,
            expenses,
            total_income,
            total_expense,
            net_profit: total_income - total_expense,
        }
    }
}

/// One posted line touching an account, as read for a ledger statement.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerMovement {
    pub entry_id: String,
    pub entry_number: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub narration: Option<String>,
    pub debit: Money,
    pub credit: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatementLine {
    #[serde(flatten)]
    pub movement: LedgerMovement,
    /// Running balance on the account's normal side.
    pub balance: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerStatement {
    pub account_id: String,
    pub account_name: String,
    pub opening_balance: Money,
    pub lines: Vec<StatementLine>,
    pub closing_balance: Money,
}

impl LedgerStatement {
    /// Builds a statement from the opening balance (normal side) and the
    /// movements in date order.
    pub fn build(account: &Account, opening_balance: Money, movements: Vec<LedgerMovement>) -> Self {
        let side = account.account_type.normal_side();
        let mut running = opening_balance;

        let lines = movements
            .into_iter()
            .map(|movement| {
                running += match side {
                    Side::Debit => movement.debit - movement.credit,
                    Side::Credit => movement.credit - movement.debit,
                };
                StatementLine {
                    movement,
                    balance: running,
                }
            })
            .collect();

        LedgerStatement {
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            opening_balance,
            lines,
            closing_balance: running,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(code: &str, ty: AccountType, dr: i64, cr: i64) -> AccountBalance {
        AccountBalance {
            account_id: format!("acc-{code}"),
            code: code.to_string(),
            name: code.to_string(),
            account_type: ty,
            debit_total: Money::from_paise(dr),
            credit_total: Money::from_paise(cr),
        }
    }

    #[test]
    fn test_normal_sides() {
        assert_eq!(AccountType::Asset.normal_side(), Side::Debit);
        assert_eq!(AccountType::Expense.normal_side(), Side::Debit);
        assert_eq!(AccountType::Income.normal_side(), Side::Credit);
        assert_eq!(AccountType::Liability.normal_side(), Side::Credit);
    }

    #[test]
    fn test_default_chart_covers_posting_tags() {
        let chart = default_chart();
        for tag in [
            SystemAccount::Cash,
            SystemAccount::Bank,
            SystemAccount::Sales,
            SystemAccount::Purchases,
            SystemAccount::OutputCgst,
            SystemAccount::OutputSgst,
            SystemAccount::OutputIgst,
            SystemAccount::InputCgst,
            SystemAccount::InputSgst,
            SystemAccount::InputIgst,
            SystemAccount::RoundOff,
        ] {
            assert_eq!(chart.iter().filter(|c| c.system == Some(tag)).count(), 1, "{tag:?}");
        }
        let mut codes: Vec<_> = chart.iter().map(|c| c.code).collect();
        codes.dedup();
        assert_eq!(codes.len(), chart.len());
    }

    #[test]
    fn test_closing_signed_by_normal_side() {
        assert_eq!(balance("1000", AccountType::Asset, 500, 200).closing().paise(), 300);
        assert_eq!(balance("4000", AccountType::Income, 0, 900).closing().paise(), 900);
        assert_eq!(balance("1010", AccountType::Asset, 100, 300).closing().paise(), -200);
    }

    #[test]
    fn test_trial_balance_from_balanced_postings() {
        let rows = vec![
            balance("1000", AccountType::Asset, 11_800, 0),
            balance("4000", AccountType::Income, 0, 10_000),
            balance("2200", AccountType::Liability, 0, 900),
            balance("2210", AccountType::Liability, 0, 900),
            balance("5200", AccountType::Expense, 0, 0),
        ];
        let tb = TrialBalance::build(&rows);
        assert_eq!(tb.rows.len(), 4);
        assert!(tb.is_balanced());
        assert_eq!(tb.total_debit.paise(), 11_800);
    }

    #[test]
    fn test_profit_and_loss() {
        let rows = vec![
            balance("4000", AccountType::Income, 0, 50_000),
            balance("5000", AccountType::Expense, 30_000, 0),
            balance("5200", AccountType::Expense, 25_000, 0),
            balance("1000", AccountType::Asset, 90_000, 0),
        ];
        let pnl = ProfitAndLoss::build(&rows);
        assert_eq!(pnl.total_income.paise(), 50_000);
        assert_eq!(pnl.total_expense.paise(), 55_000);
        assert_eq!(pnl.net_profit.paise(), -5_000);
        assert_eq!(pnl.expenses.len(), 2);
    }

    #[test]
    fn test_ledger_statement_running_balance() {
        let account = Account {
            id: "acc-cust".to_string(),
            company_id: "co".to_string(),
            code: "1200-0001".to_string(),
            name: "Sharma Traders".to_string(),
            account_type: AccountType::Asset,
            system_tag: None,
            party_id: Some("party-1".to_string()),
            is_active: true,
            created_at: Utc::now(),
        };
        let d = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let mv = |dr, cr| LedgerMovement {
            entry_id: "e".to_string(),
            entry_number: "SV".to_string(),
            entry_date: d,
            narration: None,
            debit: Money::from_paise(dr),
            credit: Money::from_paise(cr),
        };
        let stmt = LedgerStatement::build(&account, Money::from_paise(1_000), vec![mv(5_000, 0), mv(0, 2_000)]);
        assert_eq!(stmt.lines[0].balance.paise(), 6_000);
        assert_eq!(stmt.closing_balance.paise(), 4_000);
    }

    #[test]
    fn test_find_system_account_missing() {
        let err = find_system_account(&[], SystemAccount::Cash).unwrap_err();
        assert!(matches!(err, CoreError::MissingSystemAccount(ref s) if s == "cash"));
    }
}
