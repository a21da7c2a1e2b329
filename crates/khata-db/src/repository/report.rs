//! # Report Repository
//!
//! Read-only views over posted journals and documents. Every report takes
//! an inclusive date range.
//!
//! | report            | source                                       |
//! |-------------------|----------------------------------------------|
//! | trial balance     | journal lines per account                    |
//! | profit and loss   | trial balance, income and expense accounts   |
//! | ledger statement  | one account, with balance brought forward    |
//! | day book          | journal entries in date order                |
//! | GST summary       | movements on the GST system accounts         |
//! | HSN summary       | posted document lines and completed POS lines |
//!
//! Reversed entries stay in the figures beside their reversals, so they
//! cancel out.

use chrono::NaiveDate;
use khata_core::gst::{summarize_by_hsn, GstBreakup, HsnLine, HsnSummaryRow};
use khata_core::journal::JournalEntryWithLines;
use khata_core::ledger::{AccountBalance, LedgerMovement, LedgerStatement, ProfitAndLoss, SystemAccount, TrialBalance};
use khata_core::{Money, TaxRate, ValidationError};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, error};

use super::{account, journal};
use crate::error::DbResult;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReportPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ReportPeriod {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.from > self.to {
            return Err(ValidationError::invalid_format("from", "after the end of the period"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GstComponents {
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
}

impl GstComponents {
    pub fn total(&self) -> Money {
        self.cgst + self.sgst + self.igst
    }
}

/// Output tax collected against input tax paid. A negative net means
/// input credit carries forward.
#[derive(Debug, Clone, Serialize)]
pub struct GstSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub output: GstComponents,
    pub input: GstComponents,
    pub net_payable: GstComponents,
    pub total_payable: Money,
}

/// Outward is sales (invoices and POS), inward is purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HsnDirection {
    #[default]
    Outward,
    Inward,
}

#[derive(Debug, FromRow)]
struct HsnRow {
    hsn_code: Option<String>,
    tax_rate: TaxRate,
    quantity: i64,
    taxable: Money,
    cgst: Money,
    sgst: Money,
    igst: Money,
}

#[derive(Debug, FromRow)]
struct TagMovement {
    system_tag: SystemAccount,
    debit_total: Money,
    credit_total: Money,
}

async fn balances_in(conn: &mut SqliteConnection, company_id: &str, period: &ReportPeriod) -> DbResult<Vec<AccountBalance>> {
    let balances = sqlx::query_as::<_, AccountBalance>(
        r#"
        SELECT a.id AS account_id, a.code, a.name, a.account_type,
               COALESCE(SUM(l.debit), 0) AS debit_total,
               COALESCE(SUM(l.credit), 0) AS credit_total
        FROM accounts a
        LEFT JOIN journal_lines l ON l.account_id = a.id
             AND l.entry_id IN (
                 SELECT id FROM journal_entries
                 WHERE company_id = ?1 AND entry_date >= ?2 AND entry_date <= ?3)
        WHERE a.company_id = ?1
        GROUP BY a.id, a.code, a.name, a.account_type
        ORDER BY a.code
        "#,
    )
    .bind(company_id)
    .bind(period.from)
    .bind(period.to)
    .fetch_all(&mut *conn)
    .await?;
    Ok(balances)
}

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    pub async fn trial_balance(&self, company_id: &str, period: &ReportPeriod) -> DbResult<TrialBalance> {
        period.validate()?;
        let mut conn = self.pool.acquire().await?;
        let balances = balances_in(&mut conn, company_id, period).await?;
        let report = TrialBalance::build(&balances);
        if !report.is_balanced() {
            error!(
                company_id = %company_id,
                debit = %report.total_debit,
                credit = %report.total_credit,
                "Trial balance does not agree"
            );
        }
        Ok(report)
    }

    pub async fn profit_and_loss(&self, company_id: &str, period: &ReportPeriod) -> DbResult<ProfitAndLoss> {
        period.validate()?;
        let mut conn = self.pool.acquire().await?;
        let balances = balances_in(&mut conn, company_id, period).await?;
        Ok(ProfitAndLoss::build(&balances))
    }

    /// Movements on one account with the balance brought forward from
    /// everything posted before `from`.
    pub async fn ledger_statement(&self, company_id: &str, account_id: &str, period: &ReportPeriod) -> DbResult<LedgerStatement> {
        period.validate()?;
        let mut conn = self.pool.acquire().await?;
        let account = account::get_in(&mut conn, company_id, account_id).await?;

        let (debit, credit): (Money, Money) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(l.debit), 0), COALESCE(SUM(l.credit), 0)
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE e.company_id = ?1 AND l.account_id = ?2 AND e.entry_date < ?3
            "#,
        )
        .bind(company_id)
        .bind(account_id)
        .bind(period.from)
        .fetch_one(&mut *conn)
        .await?;
        let opening = AccountBalance {
            account_id: account.id.clone(),
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            debit_total: debit,
            credit_total: credit,
        }
        .closing();

        let movements = sqlx::query_as::<_, LedgerMovement>(
            r#"
            SELECT e.id AS entry_id, e.entry_number, e.entry_date, COALESCE(l.description, e.narration) AS narration,
                   l.debit, l.credit
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE e.company_id = ?1 AND l.account_id = ?2 AND e.entry_date >= ?3 AND e.entry_date <= ?4
            ORDER BY e.entry_date, e.created_at, l.line_no
            "#,
        )
        .bind(company_id)
        .bind(account_id)
        .bind(period.from)
        .bind(period.to)
        .fetch_all(&mut *conn)
        .await?;

        Ok(LedgerStatement::build(&account, opening, movements))
    }

    /// Every entry in the period with its lines, oldest first.
    pub async fn day_book(&self, company_id: &str, period: &ReportPeriod) -> DbResult<Vec<JournalEntryWithLines>> {
        period.validate()?;
        let mut conn = self.pool.acquire().await?;
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM journal_entries
            WHERE company_id = ?1 AND entry_date >= ?2 AND entry_date <= ?3
            ORDER BY entry_date, created_at
            "#,
        )
        .bind(company_id)
        .bind(period.from)
        .bind(period.to)
        .fetch_all(&mut *conn)
        .await?;

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            entries.push(journal::load_in(&mut conn, company_id, &id).await?);
        }
        debug!(company_id = %company_id, entries = entries.len(), "Day book read");
        Ok(entries)
    }

    /// Read off the GST system accounts, so manual journals on them count
    /// too.
    pub async fn gst_summary(&self, company_id: &str, period: &ReportPeriod) -> DbResult<GstSummary> {
        period.validate()?;
        let rows = sqlx::query_as::<_, TagMovement>(
            r#"
            SELECT a.system_tag,
                   COALESCE(SUM(l.debit), 0) AS debit_total,
                   COALESCE(SUM(l.credit), 0) AS credit_total
            FROM accounts a
            JOIN journal_lines l ON l.account_id = a.id
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE a.company_id = ?1 AND a.system_tag IS NOT NULL
              AND e.entry_date >= ?2 AND e.entry_date <= ?3
            GROUP BY a.system_tag
            "#,
        )
        .bind(company_id)
        .bind(period.from)
        .bind(period.to)
        .fetch_all(&self.pool)
        .await?;

        let mut output = GstComponents::default();
        let mut input = GstComponents::default();
        for row in rows {
            let credit_net = row.credit_total - row.debit_total;
            let debit_net = row.debit_total - row.credit_total;
            match row.system_tag {
                SystemAccount::OutputCgst => output.cgst = credit_net,
                SystemAccount::OutputSgst => output.sgst = credit_net,
                SystemAccount::OutputIgst => output.igst = credit_net,
                SystemAccount::InputCgst => input.cgst = debit_net,
                SystemAccount::InputSgst => input.sgst = debit_net,
                SystemAccount::InputIgst => input.igst = debit_net,
                _ => {}
            }
        }

        let net_payable = GstComponents {
            cgst: output.cgst - input.cgst,
            sgst: output.sgst - input.sgst,
            igst: output.igst - input.igst,
        };
        Ok(GstSummary {
            from: period.from,
            to: period.to,
            output,
            input,
            total_payable: net_payable.total(),
            net_payable,
        })
    }

    /// HSN-wise quantities and tax, as filed with the GST return.
    pub async fn hsn_summary(
        &self,
        company_id: &str,
        period: &ReportPeriod,
        direction: HsnDirection,
    ) -> DbResult<Vec<HsnSummaryRow>> {
        period.validate()?;

        let document_lines = r#"
            SELECT l.hsn_code, l.tax_rate, l.quantity, l.taxable, l.cgst, l.sgst, l.igst
            FROM document_lines l
            JOIN documents d ON d.id = l.document_id
            WHERE d.company_id = ?1 AND d.kind = ?4 AND d.status = 'posted'
              AND d.document_date >= ?2 AND d.document_date <= ?3
        "#;
        // POS sales carry no document date; the journal entry holds it.
        let pos_lines = r#"
            SELECT l.hsn_code, l.tax_rate, l.quantity, l.taxable, l.cgst, l.sgst, l.igst
            FROM pos_transaction_lines l
            JOIN pos_transactions t ON t.id = l.transaction_id
            JOIN journal_entries e ON e.id = t.journal_entry_id
            WHERE t.company_id = ?1 AND t.status = 'completed'
              AND e.entry_date >= ?2 AND e.entry_date <= ?3
        "#;

        let sql = match direction {
            HsnDirection::Outward => format!("{} UNION ALL {}", document_lines, pos_lines),
            HsnDirection::Inward => document_lines.to_string(),
        };
        let kind = match direction {
            HsnDirection::Outward => "sales_invoice",
            HsnDirection::Inward => "purchase_bill",
        };

        let rows = sqlx::query_as::<_, HsnRow>(&sql)
            .bind(company_id)
            .bind(period.from)
            .bind(period.to)
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;

        Ok(summarize_by_hsn(rows.iter().map(|r| HsnLine {
            hsn_code: r.hsn_code.as_deref(),
            tax_rate: r.tax_rate,
            quantity: r.quantity,
            gst: GstBreakup {
                taxable: r.taxable,
                cgst: r.cgst,
                sgst: r.sgst,
                igst: r.igst,
            },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::document::NewDocument;
    use crate::repository::pos::{NewPosSale, OpenSession, PosLine};
    use crate::repository::testing::{date, party, setup, stocked_item};
    use crate::{Database, DbError};
    use khata_core::document::{DocumentKind, LineInput};
    use khata_core::journal::{JournalDraft, VoucherType};
    use khata_core::ledger::AccountType;
    use khata_core::pos::Tender;
    use khata_core::rbac::User;
    use khata_core::{Company, Item, PartyKind, PaymentMethod, TaxMode};

    fn july() -> ReportPeriod {
        ReportPeriod {
            from: date(2025, 7, 1),
            to: date(2025, 7, 31),
        }
    }

    fn document(party_id: &str, item: &Item, qty: i64, rate: i64) -> NewDocument {
        NewDocument {
            party_id: party_id.to_string(),
            party_reference: None,
            document_date: date(2025, 7, 5),
            due_date: None,
            place_of_supply: None,
            tax_mode: TaxMode::Exclusive,
            extra_discount: Money::zero(),
            round_off: false,
            notes: None,
            lines: vec![LineInput {
                item_id: Some(item.id.clone()),
                description: item.name.clone(),
                hsn_code: None,
                quantity: qty,
                unit_price: Money::from_paise(rate),
                discount_bps: 0,
                tax_rate: item.tax_rate,
            }],
        }
    }

    /// Buys 10 bags at ₹520 + 5%, sells 4 on invoice at ₹650 + 5% and 1 at
    /// the counter for ₹650 inclusive.
    async fn trade(db: &Database, company: &Company, admin: &User) -> Item {
        let item = stocked_item(db, company, admin, 0).await;
        let supplier = party(db, company, admin, PartyKind::Supplier, None).await;
        let customer = party(db, company, admin, PartyKind::Customer, None).await;

        for (kind, party_id, qty, rate) in [
            (DocumentKind::PurchaseBill, &supplier.id, 10, 52_000),
            (DocumentKind::SalesInvoice, &customer.id, 4, 65_000),
        ] {
            let draft = db
                .documents()
                .create_draft(&company.id, &admin.id, kind, &document(party_id, &item, qty, rate))
                .await
                .unwrap();
            db.documents().post(&company.id, &admin.id, kind, &draft.document.id).await.unwrap();
        }

        let session = db
            .pos()
            .open_session(
                &company.id,
                &admin.id,
                &OpenSession {
                    terminal_id: "COUNTER-1".to_string(),
                    opening_float: Money::zero(),
                },
            )
            .await
            .unwrap();
        db.pos()
            .create_sale(
                &company.id,
                &admin.id,
                &NewPosSale {
                    session_id: session.id,
                    customer_id: None,
                    lines: vec![PosLine {
                        item_id: item.id.clone(),
                        quantity: 1,
                        unit_price: None,
                        discount_bps: 0,
                    }],
                    coupon_code: None,
                    redeem_points: 0,
                    tenders: vec![Tender {
                        method: PaymentMethod::Upi,
                        amount: Money::from_paise(65_000),
                    }],
                },
                date(2025, 7, 20),
            )
            .await
            .unwrap();
        item
    }

    #[tokio::test]
    async fn test_trial_balance_agrees() {
        let (db, company, admin) = setup().await;
        trade(&db, &company, &admin).await;

        let tb = db.reports().trial_balance(&company.id, &july()).await.unwrap();
        assert!(tb.is_balanced());
        assert!(tb.total_debit.is_positive());

        let august = ReportPeriod {
            from: date(2025, 8, 1),
            to: date(2025, 8, 31),
        };
        let empty = db.reports().trial_balance(&company.id, &august).await.unwrap();
        assert!(empty.total_debit.is_zero());
    }

    #[tokio::test]
    async fn test_profit_and_loss() {
        let (db, company, admin) = setup().await;
        trade(&db, &company, &admin).await;

        let pnl = db.reports().profit_and_loss(&company.id, &july()).await.unwrap();
        let counter = db.pos().list_transactions(&company.id, &Default::default()).await.unwrap();
        // Invoice taxable ₹2,600 plus the counter sale net of GST.
        assert_eq!(pnl.total_income, Money::from_paise(260_000) + counter[0].taxable);
        assert_eq!(pnl.total_expense.paise(), 520_000);
        assert_eq!(pnl.net_profit, pnl.total_income - pnl.total_expense);
    }

    #[tokio::test]
    async fn test_gst_summary_nets_input_credit() {
        let (db, company, admin) = setup().await;
        trade(&db, &company, &admin).await;

        let gst = db.reports().gst_summary(&company.id, &july()).await.unwrap();
        // Purchase ₹5,200 at 5% intra-state.
        assert_eq!(gst.input.cgst.paise(), 13_000);
        assert_eq!(gst.input.sgst.paise(), 13_000);
        assert!(gst.output.igst.is_zero());
        assert_eq!(gst.net_payable.cgst, gst.output.cgst - gst.input.cgst);
        assert_eq!(gst.total_payable, gst.output.total() - gst.input.total());
    }

    #[tokio::test]
    async fn test_hsn_summary_includes_counter_sales() {
        let (db, company, admin) = setup().await;
        trade(&db, &company, &admin).await;

        let outward = db
            .reports()
            .hsn_summary(&company.id, &july(), HsnDirection::Outward)
            .await
            .unwrap();
        assert_eq!(outward.len(), 1);
        assert_eq!(outward[0].hsn_code, "1006");
        assert_eq!(outward[0].quantity, 5);

        let inward = db
            .reports()
            .hsn_summary(&company.id, &july(), HsnDirection::Inward)
            .await
            .unwrap();
        assert_eq!(inward[0].quantity, 10);
        assert_eq!(inward[0].gst.taxable.paise(), 520_000);
    }

    #[tokio::test]
    async fn test_ledger_statement_brings_balance_forward() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();
        let cash = accounts.iter().find(|a| a.code == "1000").unwrap();
        let capital = accounts.iter().find(|a| a.account_type == AccountType::Equity).unwrap();

        for (day, amount) in [(10, 500_000), (20, 200_000)] {
            db.journals()
                .create(
                    &company.id,
                    &admin.id,
                    JournalDraft::new(date(2025, 7, day), VoucherType::Journal)
                        .narration("Capital introduced")
                        .debit(&cash.id, Money::from_paise(amount))
                        .credit(&capital.id, Money::from_paise(amount)),
                )
                .await
                .unwrap();
        }

        let period = ReportPeriod {
            from: date(2025, 7, 15),
            to: date(2025, 7, 31),
        };
        let statement = db.reports().ledger_statement(&company.id, &cash.id, &period).await.unwrap();
        assert_eq!(statement.opening_balance.paise(), 500_000);
        assert_eq!(statement.lines.len(), 1);
        assert_eq!(statement.closing_balance.paise(), 700_000);

        let day_book = db.reports().day_book(&company.id, &july()).await.unwrap();
        assert_eq!(day_book.len(), 2);
    }

    #[tokio::test]
    async fn test_inverted_period_rejected() {
        let (db, company, _) = setup().await;
        let period = ReportPeriod {
            from: date(2025, 7, 31),
            to: date(2025, 7, 1),
        };
        assert!(matches!(
            db.reports().trial_balance(&company.id, &period).await,
            Err(DbError::Domain(_))
        ));
    }
}
