//! # Journal Repository
//!
//! The only way rows reach `journal_entries` / `journal_lines`.
//!
//! ## Posting Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  JournalDraft ──validate()──► BalancedEntry   (khata-core, Σdr == Σcr)  │
//! │                                    │                                    │
//! │  post_in(conn, …)  ◄───────────────┘   (caller's transaction)           │
//! │       │                                                                 │
//! │       ├── resolve financial year for entry_date; closed → rejected      │
//! │       ├── every account belongs to the company and is active           │
//! │       ├── numbering::next_number(JV / …)                                │
//! │       ├── INSERT journal_entries + journal_lines                        │
//! │       └── audit::record("journal.post")                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are never updated except to link a reversal. Reversing posts
//! the mirror image and marks the original `reversed`.

use chrono::{NaiveDate, Utc};
use khata_core::document::NumberSeries;
use khata_core::financial_year::resolve_for_posting;
use khata_core::journal::{
    BalancedEntry, DraftLine, JournalDraft, JournalEntry, JournalEntryWithLines, JournalLine, JournalStatus,
    VoucherType,
};
use khata_core::{CoreError, ValidationError};
use serde::Deserialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{audit, begin_write, financial_year, new_id, numbering, page_limit};
use crate::error::{DbError, DbResult};

const SELECT_ENTRY: &str = r#"
    SELECT id, company_id, entry_number, financial_year_id, entry_date, voucher_type, narration,
           reference, total_amount, status, reversal_of, reversed_by, created_by, created_at
    FROM journal_entries
"#;

/// Writes a validated entry on the caller's transaction.
pub async fn post_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    actor: &str,
    entry: &BalancedEntry,
) -> DbResult<JournalEntry> {
    let years = financial_year::list_in(conn, company_id).await?;
    let fy = resolve_for_posting(&years, entry.entry_date())?.clone();

    for (idx, line) in entry.lines().iter().enumerate() {
        let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM accounts WHERE company_id = ?1 AND id = ?2")
            .bind(company_id)
            .bind(&line.account_id)
            .fetch_optional(&mut *conn)
            .await?;
        let reason = match active {
            Some(true) => continue,
            Some(false) => "account is inactive",
            None => "account does not exist",
        };
        return Err(CoreError::InvalidJournalLine {
            line: idx + 1,
            reason: reason.to_string(),
        }
        .into());
    }

    let number = numbering::next_number(conn, company_id, &fy, NumberSeries::Journal).await?;

    let header = JournalEntry {
        id: new_id(),
        company_id: company_id.to_string(),
        entry_number: number,
        financial_year_id: fy.id.clone(),
        entry_date: entry.entry_date(),
        voucher_type: entry.voucher_type(),
        narration: entry.narration().map(str::to_string),
        reference: entry.reference().map(str::to_string),
        total_amount: entry.total(),
        status: JournalStatus::Posted,
        reversal_of: None,
        reversed_by: None,
        created_by: actor.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO journal_entries (
            id, company_id, entry_number, financial_year_id, entry_date, voucher_type, narration,
            reference, total_amount, status, reversal_of, reversed_by, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL, ?11, ?12)
        "#,
    )
    .bind(&header.id)
    .bind(&header.company_id)
    .bind(&header.entry_number)
    .bind(&header.financial_year_id)
    .bind(header.entry_date)
    .bind(header.voucher_type)
    .bind(&header.narration)
    .bind(&header.reference)
    .bind(header.total_amount)
    .bind(header.status)
    .bind(&header.created_by)
    .bind(header.created_at)
    .execute(&mut *conn)
    .await?;

    for (idx, line) in entry.lines().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO journal_lines (id, entry_id, line_no, account_id, debit, credit, description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(new_id())
        .bind(&header.id)
        .bind(idx as i64 + 1)
        .bind(&line.account_id)
        .bind(line.debit)
        .bind(line.credit)
        .bind(&line.description)
        .execute(&mut *conn)
        .await?;
    }

    audit::record(
        conn,
        company_id,
        actor,
        "journal.post",
        "journal_entry",
        &header.id,
        &json!({
            "entry_number": header.entry_number,
            "voucher_type": header.voucher_type,
            "total": header.total_amount,
            "lines": entry.lines(),
        }),
    )
    .await?;

    debug!(entry_number = %header.entry_number, total = %header.total_amount, "Journal entry posted");
    Ok(header)
}

pub async fn load_in(conn: &mut SqliteConnection, company_id: &str, id: &str) -> DbResult<JournalEntryWithLines> {
    let entry = sqlx::query_as::<_, JournalEntry>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_ENTRY))
        .bind(company_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Journal entry", id))?;

    let lines = sqlx::query_as::<_, JournalLine>(
        r#"
        SELECT id, entry_id, line_no, account_id, debit, credit, description
        FROM journal_lines
        WHERE entry_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(JournalEntryWithLines { entry, lines })
}

/// Posts the mirror image of `entry_id` dated `date` (default: the
/// original date) and links the two entries.
pub async fn reverse_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    actor: &str,
    entry_id: &str,
    date: Option<NaiveDate>,
) -> DbResult<JournalEntry> {
    let original = load_in(conn, company_id, entry_id).await?;
    original.entry.ensure_reversible()?;

    let draft = JournalDraft {
        entry_date: original.entry.entry_date,
        voucher_type: original.entry.voucher_type,
        narration: original.entry.narration.clone(),
        reference: original.entry.reference.clone(),
        lines: original
            .lines
            .iter()
            .map(|l| DraftLine {
                account_id: l.account_id.clone(),
                debit: l.debit,
                credit: l.credit,
                description: l.description.clone(),
            })
            .collect(),
    };
    let mirror = draft.validate()?.reversal(date.unwrap_or(original.entry.entry_date));

    let mut reversal = post_in(conn, company_id, actor, &mirror).await?;

    sqlx::query("UPDATE journal_entries SET reversal_of = ?1 WHERE id = ?2")
        .bind(entry_id)
        .bind(&reversal.id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE journal_entries SET status = ?1, reversed_by = ?2 WHERE id = ?3")
        .bind(JournalStatus::Reversed)
        .bind(&reversal.id)
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;
    reversal.reversal_of = Some(entry_id.to_string());

    audit::record(
        conn,
        company_id,
        actor,
        "journal.reverse",
        "journal_entry",
        entry_id,
        &json!({ "reversed_by": reversal.entry_number }),
    )
    .await?;

    info!(
        entry = %original.entry.entry_number,
        reversal = %reversal.entry_number,
        "Journal entry reversed"
    );
    Ok(reversal)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JournalFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub voucher_type: Option<VoucherType>,
    pub account_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct JournalRepository {
    pool: SqlitePool,
}

impl JournalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        JournalRepository { pool }
    }

    /// Posts a manual journal or contra voucher. Sales, purchase, receipt,
    /// payment and POS entries come from their documents.
    pub async fn create(&self, company_id: &str, actor: &str, draft: JournalDraft) -> DbResult<JournalEntryWithLines> {
        if !matches!(draft.voucher_type, VoucherType::Journal | VoucherType::Contra) {
            return Err(ValidationError::NotAllowed {
                field: "voucher_type".to_string(),
                allowed: vec!["journal".to_string(), "contra".to_string()],
            }
            .into());
        }
        let entry = draft.validate()?;

        let mut tx = begin_write(&self.pool).await?;
        let header = post_in(&mut tx, company_id, actor, &entry).await?;
        let posted = load_in(&mut tx, company_id, &header.id).await?;
        tx.commit().await?;

        info!(company_id = %company_id, entry_number = %header.entry_number, "Manual journal posted");
        Ok(posted)
    }

    pub async fn get(&self, company_id: &str, id: &str) -> DbResult<JournalEntryWithLines> {
        let mut conn = self.pool.acquire().await?;
        load_in(&mut conn, company_id, id).await
    }

    /// Headers, newest first.
    pub async fn list(&self, company_id: &str, filter: &JournalFilter) -> DbResult<Vec<JournalEntry>> {
        let entries = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"{}
            WHERE company_id = ?1
              AND (?2 IS NULL OR entry_date >= ?2)
              AND (?3 IS NULL OR entry_date <= ?3)
              AND (?4 IS NULL OR voucher_type = ?4)
              AND (?5 IS NULL OR EXISTS (
                    SELECT 1 FROM journal_lines l WHERE l.entry_id = journal_entries.id AND l.account_id = ?5))
            ORDER BY entry_date DESC, created_at DESC
            LIMIT ?6 OFFSET ?7
            "#,
            SELECT_ENTRY
        ))
        .bind(company_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.voucher_type)
        .bind(&filter.account_id)
        .bind(page_limit(filter.limit))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Reverses a manual entry. Document entries are reversed by
    /// cancelling or voiding the document.
    pub async fn reverse(
        &self,
        company_id: &str,
        actor: &str,
        id: &str,
        date: Option<NaiveDate>,
    ) -> DbResult<JournalEntryWithLines> {
        let mut tx = begin_write(&self.pool).await?;

        let original = load_in(&mut tx, company_id, id).await?;
        if !matches!(original.entry.voucher_type, VoucherType::Journal | VoucherType::Contra) {
            return Err(CoreError::InvalidStatus {
                entity: "Journal entry".to_string(),
                id: original.entry.entry_number,
                status: "owned by a document".to_string(),
                operation: "reverse".to_string(),
            }
            .into());
        }

        let reversal = reverse_in(&mut tx, company_id, actor, id, date).await?;
        let posted = load_in(&mut tx, company_id, &reversal.id).await?;
        tx.commit().await?;
        Ok(posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{date, setup};
    use khata_core::ledger::Account;
    use khata_core::Money;

    fn by_code<'a>(accounts: &'a [Account], code: &str) -> &'a str {
        &accounts.iter().find(|a| a.code == code).unwrap().id
    }

    #[tokio::test]
    async fn test_post_balanced_entry() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();

        let draft = JournalDraft::new(date(2025, 6, 20), VoucherType::Journal)
            .narration("Owner's capital")
            .debit(by_code(&accounts, "1010"), Money::from_paise(10_000_000))
            .credit(by_code(&accounts, "3000"), Money::from_paise(10_000_000));

        let posted = db.journals().create(&company.id, &admin.id, draft).await.unwrap();
        assert_eq!(posted.entry.entry_number, "JV/2025-26/000001");
        assert_eq!(posted.lines.len(), 2);
        assert_eq!(posted.entry.total_amount.paise(), 10_000_000);
    }

    #[tokio::test]
    async fn test_unbalanced_entry_writes_nothing() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();

        let draft = JournalDraft::new(date(2025, 6, 20), VoucherType::Journal)
            .debit(by_code(&accounts, "1000"), Money::from_paise(100_000))
            .credit(by_code(&accounts, "4000"), Money::from_paise(90_000));

        let result = db.journals().create(&company.id, &admin.id, draft).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::UnbalancedEntry { .. }))));
        let listed = db.journals().list(&company.id, &JournalFilter::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_account_rejected() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();

        let draft = JournalDraft::new(date(2025, 6, 20), VoucherType::Journal)
            .debit(by_code(&accounts, "1000"), Money::from_paise(100))
            .credit("not-an-account", Money::from_paise(100));

        let result = db.journals().create(&company.id, &admin.id, draft).await;
        assert!(matches!(
            result,
            Err(DbError::Domain(CoreError::InvalidJournalLine { line: 2, .. }))
        ));
    }

    #[tokio::test]
    async fn test_closed_year_rejects_posting() {
        let (db, company, admin) = setup().await;
        let fy = db.financial_years().list(&company.id).await.unwrap().remove(0);
        db.financial_years().close(&company.id, &admin.id, &fy.id).await.unwrap();
        let accounts = db.accounts().list(&company.id).await.unwrap();

        let draft = JournalDraft::new(date(2025, 6, 20), VoucherType::Journal)
            .debit(by_code(&accounts, "5200"), Money::from_paise(2_500_000))
            .credit(by_code(&accounts, "1010"), Money::from_paise(2_500_000));

        let result = db.journals().create(&company.id, &admin.id, draft).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::FinancialYearClosed { .. }))));
    }

    #[tokio::test]
    async fn test_date_outside_any_year_rejected() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();

        let draft = JournalDraft::new(date(2027, 1, 5), VoucherType::Journal)
            .debit(by_code(&accounts, "5200"), Money::from_paise(100))
            .credit(by_code(&accounts, "1010"), Money::from_paise(100));

        let result = db.journals().create(&company.id, &admin.id, draft).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::DateOutsideFinancialYear { .. }))));
    }

    #[tokio::test]
    async fn test_reverse_links_entries() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();

        let draft = JournalDraft::new(date(2025, 7, 1), VoucherType::Journal)
            .narration("Rent for July")
            .debit(by_code(&accounts, "5200"), Money::from_paise(2_500_000))
            .credit(by_code(&accounts, "1010"), Money::from_paise(2_500_000));
        let posted = db.journals().create(&company.id, &admin.id, draft).await.unwrap();

        let reversal = db
            .journals()
            .reverse(&company.id, &admin.id, &posted.entry.id, None)
            .await
            .unwrap();
        assert_eq!(reversal.entry.voucher_type, VoucherType::Reversal);
        assert_eq!(reversal.entry.reversal_of.as_deref(), Some(posted.entry.id.as_str()));
        assert_eq!(reversal.lines[0].credit.paise(), 2_500_000);
        assert_eq!(reversal.entry.narration.as_deref(), Some("Reversal of: Rent for July"));

        let original = db.journals().get(&company.id, &posted.entry.id).await.unwrap();
        assert_eq!(original.entry.status, JournalStatus::Reversed);
        assert_eq!(original.entry.reversed_by.as_deref(), Some(reversal.entry.id.as_str()));

        // Neither side can be reversed again.
        assert!(db.journals().reverse(&company.id, &admin.id, &posted.entry.id, None).await.is_err());
        assert!(db.journals().reverse(&company.id, &admin.id, &reversal.entry.id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_sales_voucher_not_accepted_manually() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();

        let draft = JournalDraft::new(date(2025, 7, 1), VoucherType::Sales)
            .debit(by_code(&accounts, "1000"), Money::from_paise(100))
            .credit(by_code(&accounts, "4000"), Money::from_paise(100));
        assert!(db.journals().create(&company.id, &admin.id, draft).await.is_err());
    }
}
