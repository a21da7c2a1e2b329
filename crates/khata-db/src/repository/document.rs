//! # Document Repository
//!
//! Sales invoices and purchase bills.
//!
//! ## Lifecycle
//! ```text
//! create_draft ──► Draft ──post──► Posted ──settle──► Posted (amount_paid ↑)
//!                    │               │
//!                    └───cancel──────┴──cancel (unpaid only)──► Cancelled
//! ```
//!
//! Posting assigns the number, posts the journal entry and moves stock in
//! one transaction. Cancelling a posted document reverses its journal and
//! its stock movements. Settling posts a receipt or payment voucher and
//! records it against the document.
//!
//! Supply type follows the seller's state and the place of supply:
//!
//! | kind           | seller          | place of supply            |
//! |----------------|-----------------|----------------------------|
//! | sales invoice  | company         | customer state (override)  |
//! | purchase bill  | supplier        | company state (override)   |

use chrono::{DateTime, NaiveDate, Utc};
use khata_core::document::{
    compute_document, DocumentKind, DocumentLine, DocumentOptions, DocumentStatus, LineInput, TradeDocument,
    TradeDocumentWithLines,
};
use khata_core::financial_year::resolve_for_posting;
use khata_core::gst::{StateCode, SupplyType};
use khata_core::posting::{payment_entry, purchase_entry, receipt_entry, sales_entry};
use khata_core::{Money, Party, PartyKind, PaymentMethod, StockReason, TaxMode, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::info;

use super::{
    account, audit, begin_write, company, financial_year, item, journal, new_id, numbering, page_limit, party,
    refused,
};
use crate::error::{DbError, DbResult};

const SELECT_DOCUMENT: &str = r#"
    SELECT id, company_id, kind, number, party_id, party_reference, document_date, due_date,
           place_of_supply, supply_type, tax_mode, status, gross, discount, taxable, cgst, sgst, igst,
           round_off, grand_total, amount_paid, journal_entry_id, notes, created_by, created_at, updated_at
    FROM documents
"#;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub party_id: String,
    /// Supplier's own bill number.
    #[serde(default)]
    pub party_reference: Option<String>,
    pub document_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Overrides the default place of supply.
    #[serde(default)]
    pub place_of_supply: Option<u8>,
    #[serde(default)]
    pub tax_mode: TaxMode,
    /// Document-level discount spread over the lines.
    #[serde(default)]
    pub extra_discount: Money,
    #[serde(default = "default_true")]
    pub round_off: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<LineInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    pub status: Option<DocumentStatus>,
    pub party_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSettlement {
    pub amount: Money,
    pub method: PaymentMethod,
    /// Defaults to the business date.
    #[serde(default)]
    pub settled_on: Option<NaiveDate>,
}

/// A receipt or payment recorded against a document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentSettlement {
    pub id: String,
    pub company_id: String,
    pub document_id: String,
    pub journal_entry_id: String,
    pub method: PaymentMethod,
    pub amount: Money,
    pub settled_on: NaiveDate,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

fn party_kind_for(kind: DocumentKind) -> PartyKind {
    match kind {
        DocumentKind::SalesInvoice => PartyKind::Customer,
        DocumentKind::PurchaseBill => PartyKind::Supplier,
    }
}

/// Sales reduce stock, purchases add to it.
fn stock_sign(kind: DocumentKind) -> (i64, StockReason) {
    match kind {
        DocumentKind::SalesInvoice => (-1, StockReason::Sale),
        DocumentKind::PurchaseBill => (1, StockReason::Purchase),
    }
}

pub async fn get_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    kind: DocumentKind,
    id: &str,
) -> DbResult<TradeDocumentWithLines> {
    let document = sqlx::query_as::<_, TradeDocument>(&format!(
        "{} WHERE company_id = ?1 AND kind = ?2 AND id = ?3",
        SELECT_DOCUMENT
    ))
    .bind(company_id)
    .bind(kind)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found(kind.label(), id))?;

    let lines = sqlx::query_as::<_, DocumentLine>(
        r#"
        SELECT id, document_id, line_no, item_id, description, hsn_code, quantity, unit_price, discount_bps,
               tax_rate, gross, discount, taxable, cgst, sgst, igst, total
        FROM document_lines
        WHERE document_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(TradeDocumentWithLines { document, lines })
}

async fn load_party(conn: &mut SqliteConnection, company_id: &str, kind: DocumentKind, party_id: &str) -> DbResult<Party> {
    let party = party::get_in(conn, company_id, party_id).await?;
    if party.kind != party_kind_for(kind) {
        return Err(ValidationError::NotAllowed {
            field: "party_id".to_string(),
            allowed: vec![format!("{:?}", party_kind_for(kind)).to_lowercase()],
        }
        .into());
    }
    if !party.is_active {
        return Err(refused("Party", &party.name, "inactive", "bill"));
    }
    Ok(party)
}

async fn write_status(
    conn: &mut SqliteConnection,
    company_id: &str,
    id: &str,
    status: DocumentStatus,
) -> DbResult<()> {
    sqlx::query("UPDATE documents SET status = ?1, updated_at = ?2 WHERE company_id = ?3 AND id = ?4")
        .bind(status)
        .bind(Utc::now())
        .bind(company_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    /// Computes and stores a draft. Nothing reaches the ledger or stock
    /// until it is posted.
    pub async fn create_draft(
        &self,
        company_id: &str,
        actor: &str,
        kind: DocumentKind,
        input: &NewDocument,
    ) -> DbResult<TradeDocumentWithLines> {
        let mut tx = begin_write(&self.pool).await?;

        let company = company::get_in(&mut tx, company_id).await?;
        let party = load_party(&mut tx, company_id, kind, &input.party_id).await?;

        let (seller, default_pos) = match kind {
            DocumentKind::SalesInvoice => (company.state_code, party.state_code),
            DocumentKind::PurchaseBill => (party.state_code, company.state_code),
        };
        let place_of_supply = match input.place_of_supply {
            Some(code) => StateCode::new(code)?.value(),
            None => default_pos,
        };
        let supply = SupplyType::between(seller, place_of_supply);

        if let Some(due) = input.due_date {
            if due < input.document_date {
                return Err(ValidationError::invalid_format("due_date", "before the document date").into());
            }
        }

        // Item lines take their HSN code from the item when none is given.
        let mut lines = input.lines.clone();
        for line in lines.iter_mut() {
            if let Some(item_id) = &line.item_id {
                let item = item::get_in(&mut tx, company_id, item_id).await?;
                if !item.is_active {
                    return Err(refused("Item", &item.sku, "inactive", "bill"));
                }
                if line.hsn_code.is_none() {
                    line.hsn_code = item.hsn_code.clone();
                }
            }
        }

        let options = DocumentOptions {
            supply,
            tax_mode: input.tax_mode,
            extra_discount: input.extra_discount,
            round_off: input.round_off,
        };
        let computed = compute_document(&lines, &options)?;
        let totals = computed.totals;

        let now = Utc::now();
        let document = TradeDocument {
            id: new_id(),
            company_id: company_id.to_string(),
            kind,
            number: None,
            party_id: party.id.clone(),
            party_reference: input.party_reference.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
            document_date: input.document_date,
            due_date: input.due_date,
            place_of_supply,
            supply_type: supply,
            tax_mode: input.tax_mode,
            status: DocumentStatus::Draft,
            gross: totals.gross,
            discount: totals.discount,
            taxable: totals.taxable,
            cgst: totals.cgst,
            sgst: totals.sgst,
            igst: totals.igst,
            round_off: totals.round_off,
            grand_total: totals.grand_total,
            amount_paid: Money::zero(),
            journal_entry_id: None,
            notes: input.notes.clone(),
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO documents (
                id, company_id, kind, number, party_id, party_reference, document_date, due_date,
                place_of_supply, supply_type, tax_mode, status, gross, discount, taxable, cgst, sgst, igst,
                round_off, grand_total, amount_paid, journal_entry_id, notes, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                      ?18, ?19, 0, NULL, ?20, ?21, ?22, ?22)
            "#,
        )
        .bind(&document.id)
        .bind(&document.company_id)
        .bind(document.kind)
        .bind(&document.party_id)
        .bind(&document.party_reference)
        .bind(document.document_date)
        .bind(document.due_date)
        .bind(document.place_of_supply)
        .bind(document.supply_type)
        .bind(document.tax_mode)
        .bind(document.status)
        .bind(document.gross)
        .bind(document.discount)
        .bind(document.taxable)
        .bind(document.cgst)
        .bind(document.sgst)
        .bind(document.igst)
        .bind(document.round_off)
        .bind(document.grand_total)
        .bind(&document.notes)
        .bind(&document.created_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(computed.lines.len());
        for line in computed.lines {
            let row = DocumentLine {
                id: new_id(),
                document_id: document.id.clone(),
                line_no: line.line_no,
                item_id: line.item_id,
                description: line.description,
                hsn_code: line.hsn_code,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount_bps: line.discount_bps,
                tax_rate: line.tax_rate,
                gross: line.gross,
                discount: line.discount,
                taxable: line.gst.taxable,
                cgst: line.gst.cgst,
                sgst: line.gst.sgst,
                igst: line.gst.igst,
                total: line.total,
            };
            sqlx::query(
                r#"
                INSERT INTO document_lines (
                    id, document_id, line_no, item_id, description, hsn_code, quantity, unit_price,
                    discount_bps, tax_rate, gross, discount, taxable, cgst, sgst, igst, total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
            )
            .bind(&row.id)
            .bind(&row.document_id)
            .bind(row.line_no)
            .bind(&row.item_id)
            .bind(&row.description)
            .bind(&row.hsn_code)
            .bind(row.quantity)
            .bind(row.unit_price)
            .bind(row.discount_bps)
            .bind(row.tax_rate)
            .bind(row.gross)
            .bind(row.discount)
            .bind(row.taxable)
            .bind(row.cgst)
            .bind(row.sgst)
            .bind(row.igst)
            .bind(row.total)
            .execute(&mut *tx)
            .await?;
            stored.push(row);
        }

        audit::record(
            &mut tx,
            company_id,
            actor,
            "document.create",
            "document",
            &document.id,
            &json!({ "kind": kind, "party": party.name, "totals": totals }),
        )
        .await?;
        tx.commit().await?;

        info!(company_id = %company_id, ?kind, total = %document.grand_total, "Draft created");
        Ok(TradeDocumentWithLines {
            document,
            lines: stored,
        })
    }

    pub async fn get(&self, company_id: &str, kind: DocumentKind, id: &str) -> DbResult<TradeDocumentWithLines> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, company_id, kind, id).await
    }

    /// Newest first.
    pub async fn list(&self, company_id: &str, kind: DocumentKind, filter: &DocumentFilter) -> DbResult<Vec<TradeDocument>> {
        let documents = sqlx::query_as::<_, TradeDocument>(&format!(
            r#"{}
            WHERE company_id = ?1 AND kind = ?2
              AND (?3 IS NULL OR status = ?3)
              AND (?4 IS NULL OR party_id = ?4)
              AND (?5 IS NULL OR document_date >= ?5)
              AND (?6 IS NULL OR document_date <= ?6)
            ORDER BY document_date DESC, created_at DESC
            LIMIT ?7 OFFSET ?8
            "#,
            SELECT_DOCUMENT
        ))
        .bind(company_id)
        .bind(kind)
        .bind(filter.status)
        .bind(&filter.party_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(page_limit(filter.limit))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }

    /// Numbers the draft, posts its journal entry and moves stock.
    pub async fn post(&self, company_id: &str, actor: &str, kind: DocumentKind, id: &str) -> DbResult<TradeDocumentWithLines> {
        let mut tx = begin_write(&self.pool).await?;

        let current = get_in(&mut tx, company_id, kind, id).await?;
        let doc = &current.document;
        doc.ensure_can_post()?;
        let party = load_party(&mut tx, company_id, kind, &doc.party_id).await?;

        let years = financial_year::list_in(&mut tx, company_id).await?;
        let fy = resolve_for_posting(&years, doc.document_date)?.clone();
        let number = numbering::next_number(&mut tx, company_id, &fy, kind.series()).await?;

        let totals = doc.totals();
        let posted = if totals.is_nil() {
            None
        } else {
            let accounts = account::posting_accounts(&mut tx, company_id).await?;
            let entry = match kind {
                DocumentKind::SalesInvoice => {
                    sales_entry(doc.document_date, &number, &party.account_id, &totals, &accounts)?
                }
                DocumentKind::PurchaseBill => {
                    purchase_entry(doc.document_date, &number, &party.account_id, &totals, &accounts)?
                }
            };
            Some(journal::post_in(&mut tx, company_id, actor, &entry).await?)
        };

        let (sign, reason) = stock_sign(kind);
        for line in &current.lines {
            if let Some(item_id) = &line.item_id {
                item::apply_movement(&mut tx, company_id, item_id, sign * line.quantity, reason, Some(id), Some(&number))
                    .await?;
            }
        }

        sqlx::query(
            r#"
            UPDATE documents SET number = ?1, status = ?2, journal_entry_id = ?3, updated_at = ?4
            WHERE company_id = ?5 AND id = ?6
            "#,
        )
        .bind(&number)
        .bind(DocumentStatus::Posted)
        .bind(posted.as_ref().map(|p| p.id.as_str()))
        .bind(Utc::now())
        .bind(company_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            company_id,
            actor,
            "document.post",
            "document",
            id,
            &json!({
                "number": number,
                "journal_entry": posted.as_ref().map(|p| p.entry_number.as_str()),
                "grand_total": doc.grand_total,
            }),
        )
        .await?;
        let result = get_in(&mut tx, company_id, kind, id).await?;
        tx.commit().await?;

        info!(company_id = %company_id, number = %number, "Document posted");
        Ok(result)
    }

    /// Cancels a draft, or a posted document with nothing settled. Posted
    /// documents get their journal reversed on the original date and their
    /// stock movements undone.
    pub async fn cancel(&self, company_id: &str, actor: &str, kind: DocumentKind, id: &str) -> DbResult<TradeDocumentWithLines> {
        let mut tx = begin_write(&self.pool).await?;

        let current = get_in(&mut tx, company_id, kind, id).await?;
        let doc = &current.document;
        doc.ensure_can_cancel()?;

        if doc.status == DocumentStatus::Posted {
            if let Some(entry_id) = &doc.journal_entry_id {
                journal::reverse_in(&mut tx, company_id, actor, entry_id, None).await?;
            }
            let (sign, _) = stock_sign(kind);
            for line in &current.lines {
                if let Some(item_id) = &line.item_id {
                    item::apply_movement(
                        &mut tx,
                        company_id,
                        item_id,
                        -sign * line.quantity,
                        StockReason::Cancellation,
                        Some(id),
                        doc.number.as_deref(),
                    )
                    .await?;
                }
            }
        }

        write_status(&mut tx, company_id, id, DocumentStatus::Cancelled).await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "document.cancel",
            "document",
            id,
            &json!({ "number": doc.number, "was": doc.status }),
        )
        .await?;
        let result = get_in(&mut tx, company_id, kind, id).await?;
        tx.commit().await?;

        info!(company_id = %company_id, id = %id, "Document cancelled");
        Ok(result)
    }

    /// Records money received (invoices) or paid (bills) against a posted
    /// document. `today` is used when the settlement carries no date.
    pub async fn settle(
        &self,
        company_id: &str,
        actor: &str,
        kind: DocumentKind,
        id: &str,
        input: &NewSettlement,
        today: NaiveDate,
    ) -> DbResult<DocumentSettlement> {
        let mut tx = begin_write(&self.pool).await?;

        let current = get_in(&mut tx, company_id, kind, id).await?;
        let doc = current.document;
        doc.ensure_can_settle(input.amount)?;

        let settled_on = input.settled_on.unwrap_or(today);
        if settled_on < doc.document_date {
            return Err(ValidationError::invalid_format("settled_on", "before the document date").into());
        }

        let party = party::get_in(&mut tx, company_id, &doc.party_id).await?;
        let accounts = account::posting_accounts(&mut tx, company_id).await?;
        let reference = doc.number.clone().unwrap_or_else(|| doc.id.clone());
        let entry = match kind {
            DocumentKind::SalesInvoice => {
                receipt_entry(settled_on, &reference, &party.account_id, input.method, input.amount, &accounts)?
            }
            DocumentKind::PurchaseBill => {
                payment_entry(settled_on, &reference, &party.account_id, input.method, input.amount, &accounts)?
            }
        };
        let posted = journal::post_in(&mut tx, company_id, actor, &entry).await?;

        let settlement = DocumentSettlement {
            id: new_id(),
            company_id: company_id.to_string(),
            document_id: doc.id.clone(),
            journal_entry_id: posted.id,
            method: input.method,
            amount: input.amount,
            settled_on,
            created_by: actor.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO settlements (id, company_id, document_id, journal_entry_id, method, amount, settled_on, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&settlement.id)
        .bind(&settlement.company_id)
        .bind(&settlement.document_id)
        .bind(&settlement.journal_entry_id)
        .bind(settlement.method)
        .bind(settlement.amount)
        .bind(settlement.settled_on)
        .bind(&settlement.created_by)
        .bind(settlement.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE documents SET amount_paid = amount_paid + ?1, updated_at = ?2 WHERE company_id = ?3 AND id = ?4")
            .bind(input.amount)
            .bind(Utc::now())
            .bind(company_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            company_id,
            actor,
            "document.settle",
            "document",
            id,
            &json!({
                "number": reference,
                "amount": input.amount,
                "method": input.method,
                "outstanding": doc.outstanding() - input.amount,
            }),
        )
        .await?;
        tx.commit().await?;

        info!(company_id = %company_id, number = %reference, amount = %input.amount, "Document settled");
        Ok(settlement)
    }

    pub async fn settlements(&self, company_id: &str, kind: DocumentKind, id: &str) -> DbResult<Vec<DocumentSettlement>> {
        self.get(company_id, kind, id).await?;
        let rows = sqlx::query_as::<_, DocumentSettlement>(
            r#"
            SELECT id, company_id, document_id, journal_entry_id, method, amount, settled_on, created_by, created_at
            FROM settlements
            WHERE company_id = ?1 AND document_id = ?2
            ORDER BY settled_on, created_at
            "#,
        )
        .bind(company_id)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{date, party, setup, stocked_item};
    use crate::Database;
    use khata_core::journal::{JournalStatus, VoucherType};
    use khata_core::rbac::User;
    use khata_core::{Company, CoreError, Item, TaxRate};

    fn invoice(party_id: &str, item: &Item, qty: i64) -> NewDocument {
        NewDocument {
            party_id: party_id.to_string(),
            party_reference: None,
            document_date: date(2025, 7, 1),
            due_date: Some(date(2025, 7, 31)),
            place_of_supply: None,
            tax_mode: TaxMode::Exclusive,
            extra_discount: Money::zero(),
            round_off: true,
            notes: None,
            lines: vec![LineInput {
                item_id: Some(item.id.clone()),
                description: item.name.clone(),
                hsn_code: None,
                quantity: qty,
                unit_price: Money::from_paise(10_000),
                discount_bps: 0,
                tax_rate: TaxRate::from_percent(18),
            }],
        }
    }

    async fn posted_invoice(db: &Database, company: &Company, admin: &User) -> (TradeDocumentWithLines, Item) {
        let item = stocked_item(db, company, admin, 10).await;
        let customer = party(db, company, admin, PartyKind::Customer, None).await;
        let draft = db
            .documents()
            .create_draft(&company.id, &admin.id, DocumentKind::SalesInvoice, &invoice(&customer.id, &item, 3))
            .await
            .unwrap();
        let posted = db
            .documents()
            .post(&company.id, &admin.id, DocumentKind::SalesInvoice, &draft.document.id)
            .await
            .unwrap();
        (posted, item)
    }

    #[tokio::test]
    async fn test_intra_state_draft() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let customer = party(&db, &company, &admin, PartyKind::Customer, None).await;

        let draft = db
            .documents()
            .create_draft(&company.id, &admin.id, DocumentKind::SalesInvoice, &invoice(&customer.id, &item, 3))
            .await
            .unwrap();
        let doc = &draft.document;
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert!(doc.number.is_none());
        assert_eq!(doc.supply_type, SupplyType::IntraState);
        assert_eq!(doc.taxable.paise(), 30_000);
        assert_eq!(doc.cgst.paise(), 2_700);
        assert_eq!(doc.sgst.paise(), 2_700);
        assert_eq!(doc.grand_total.paise(), 35_400);
        assert_eq!(draft.lines[0].hsn_code.as_deref(), Some("1006"));

        // Drafts do not touch stock.
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 10);
    }

    #[tokio::test]
    async fn test_inter_state_uses_igst() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let customer = party(&db, &company, &admin, PartyKind::Customer, Some("29AAGCB7383J1Z4")).await;

        let draft = db
            .documents()
            .create_draft(&company.id, &admin.id, DocumentKind::SalesInvoice, &invoice(&customer.id, &item, 1))
            .await
            .unwrap();
        assert_eq!(draft.document.supply_type, SupplyType::InterState);
        assert_eq!(draft.document.place_of_supply, 29);
        assert_eq!(draft.document.igst.paise(), 1_800);
        assert!(draft.document.cgst.is_zero());
    }

    #[tokio::test]
    async fn test_supplier_cannot_be_invoiced() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let supplier = party(&db, &company, &admin, PartyKind::Supplier, None).await;
        let result = db
            .documents()
            .create_draft(&company.id, &admin.id, DocumentKind::SalesInvoice, &invoice(&supplier.id, &item, 1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_post_numbers_journals_and_moves_stock() {
        let (db, company, admin) = setup().await;
        let (posted, item) = posted_invoice(&db, &company, &admin).await;
        let doc = &posted.document;

        assert_eq!(doc.status, DocumentStatus::Posted);
        assert_eq!(doc.number.as_deref(), Some("INV/2025-26/0001"));

        let entry = db.journals().get(&company.id, doc.journal_entry_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(entry.entry.voucher_type, VoucherType::Sales);
        assert_eq!(entry.entry.total_amount, doc.grand_total);

        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 7);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_post() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 2).await;
        let customer = party(&db, &company, &admin, PartyKind::Customer, None).await;
        let draft = db
            .documents()
            .create_draft(&company.id, &admin.id, DocumentKind::SalesInvoice, &invoice(&customer.id, &item, 3))
            .await
            .unwrap();

        let result = db.documents().post(&company.id, &admin.id, DocumentKind::SalesInvoice, &draft.document.id).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::InsufficientStock { .. }))));

        let reloaded = db.documents().get(&company.id, DocumentKind::SalesInvoice, &draft.document.id).await.unwrap();
        assert_eq!(reloaded.document.status, DocumentStatus::Draft);
        assert!(db.journals().list(&company.id, &Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fully_discounted_invoice_posts_without_journal() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let customer = party(&db, &company, &admin, PartyKind::Customer, None).await;
        let mut input = invoice(&customer.id, &item, 2);
        input.extra_discount = Money::from_paise(20_000);

        let draft = db
            .documents()
            .create_draft(&company.id, &admin.id, DocumentKind::SalesInvoice, &input)
            .await
            .unwrap();
        assert!(draft.document.grand_total.is_zero());

        let id = draft.document.id.clone();
        let posted = db.documents().post(&company.id, &admin.id, DocumentKind::SalesInvoice, &id).await.unwrap();
        assert_eq!(posted.document.status, DocumentStatus::Posted);
        assert_eq!(posted.document.number.as_deref(), Some("INV/2025-26/0001"));
        assert!(posted.document.journal_entry_id.is_none());
        assert!(db.journals().list(&company.id, &Default::default()).await.unwrap().is_empty());
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 8);

        db.documents().cancel(&company.id, &admin.id, DocumentKind::SalesInvoice, &id).await.unwrap();
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 10);
    }

    #[tokio::test]
    async fn test_cancel_reverses_journal_and_stock() {
        let (db, company, admin) = setup().await;
        let (posted, item) = posted_invoice(&db, &company, &admin).await;
        let id = posted.document.id.clone();

        let cancelled = db.documents().cancel(&company.id, &admin.id, DocumentKind::SalesInvoice, &id).await.unwrap();
        assert_eq!(cancelled.document.status, DocumentStatus::Cancelled);

        let entry = db.journals().get(&company.id, posted.document.journal_entry_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(entry.entry.status, JournalStatus::Reversed);
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 10);

        assert!(db.documents().cancel(&company.id, &admin.id, DocumentKind::SalesInvoice, &id).await.is_err());
    }

    #[tokio::test]
    async fn test_settlement_and_overpayment() {
        let (db, company, admin) = setup().await;
        let (posted, _) = posted_invoice(&db, &company, &admin).await;
        let id = posted.document.id.clone();
        let today = date(2025, 7, 10);

        let partial = NewSettlement {
            amount: Money::from_paise(20_000),
            method: PaymentMethod::Upi,
            settled_on: None,
        };
        let settlement = db
            .documents()
            .settle(&company.id, &admin.id, DocumentKind::SalesInvoice, &id, &partial, today)
            .await
            .unwrap();
        assert_eq!(settlement.settled_on, today);

        let too_much = NewSettlement {
            amount: Money::from_paise(20_000),
            method: PaymentMethod::Cash,
            settled_on: None,
        };
        let result = db
            .documents()
            .settle(&company.id, &admin.id, DocumentKind::SalesInvoice, &id, &too_much, today)
            .await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::Overpayment { .. }))));

        let doc = db.documents().get(&company.id, DocumentKind::SalesInvoice, &id).await.unwrap().document;
        assert_eq!(doc.amount_paid.paise(), 20_000);
        assert_eq!(doc.outstanding().paise(), 15_400);

        // Part-paid invoices cannot be cancelled.
        assert!(db.documents().cancel(&company.id, &admin.id, DocumentKind::SalesInvoice, &id).await.is_err());
        assert_eq!(
            db.documents().settlements(&company.id, DocumentKind::SalesInvoice, &id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_purchase_bill_adds_stock() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 0).await;
        let supplier = party(&db, &company, &admin, PartyKind::Supplier, Some("33AAACH7409R1Z8")).await;

        let mut bill = invoice(&supplier.id, &item, 50);
        bill.party_reference = Some("DRM/881".to_string());
        let draft = db
            .documents()
            .create_draft(&company.id, &admin.id, DocumentKind::PurchaseBill, &bill)
            .await
            .unwrap();
        assert_eq!(draft.document.supply_type, SupplyType::InterState);
        assert_eq!(draft.document.place_of_supply, 27);

        let posted = db
            .documents()
            .post(&company.id, &admin.id, DocumentKind::PurchaseBill, &draft.document.id)
            .await
            .unwrap();
        assert_eq!(posted.document.number.as_deref(), Some("BILL/2025-26/0001"));
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 50);

        // A bill is not visible as an invoice.
        assert!(db
            .documents()
            .get(&company.id, DocumentKind::SalesInvoice, &draft.document.id)
            .await
            .is_err());
    }
}
