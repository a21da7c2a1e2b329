//! # POS Repository
//!
//! Counter sales against an open cashier session.
//!
//! ## Sale Flow
//! ```text
//! create_sale
//!   │  BEGIN
//!   ├── session open?                       SessionNotOpen
//!   ├── coupon quote      (discount::quote_in)
//!   ├── points plan       (LoyaltyProgram::plan_redemption)
//!   ├── compute lines     (inclusive prices, intra-state)
//!   ├── settle tenders    (change out of cash)
//!   ├── POS/2025-26/000001 + journal         Dr cash/bank, Cr sales/GST
//!   ├── stock −qty, points redeem/earn, coupon use
//!   └── audit
//!      COMMIT
//! ```
//!
//! Voiding undoes all of it. A sale can only be voided while its session is
//! still open, so the drawer count at close matches what was kept.

use chrono::{DateTime, NaiveDate, Utc};
use khata_core::document::{compute_document, net_value, DocumentLine, DocumentOptions, LineInput, NumberSeries};
use khata_core::financial_year::resolve_for_posting;
use khata_core::gst::SupplyType;
use khata_core::loyalty::{LoyaltyTxnKind, RedemptionPlan};
use khata_core::pos::{
    reconcile_cash, settle_tenders, PosSession, PosSessionStatus, PosTenderRow, PosTransaction, PosTransactionStatus,
    Tender,
};
use khata_core::posting::pos_sale_entry;
use khata_core::validation::validate_name;
use khata_core::{CoreError, Money, PartyKind, StockReason, TaxMode, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use super::{
    account, audit, begin_write, company, discount, financial_year, item, journal, loyalty, new_id, numbering,
    page_limit, party, refused,
};
use crate::error::{DbError, DbResult};

const SELECT_SESSION: &str = r#"
    SELECT id, company_id, terminal_id, opened_by, opening_float, status, opened_at, closed_by, closed_at,
           expected_cash, counted_cash, variance
    FROM pos_sessions
"#;

const SELECT_TRANSACTION: &str = r#"
    SELECT id, company_id, session_id, number, customer_id, coupon_code, coupon_discount, points_redeemed,
           points_discount, points_earned, gross, discount, taxable, cgst, sgst, igst, round_off, grand_total,
           paid, change, net_cash, status, journal_entry_id, created_by, created_at, voided_at
    FROM pos_transactions
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSession {
    pub terminal_id: String,
    #[serde(default)]
    pub opening_float: Money,
}

/// One scanned item. Price defaults to the item's sale price and includes
/// GST.
#[derive(Debug, Clone, Deserialize)]
pub struct PosLine {
    pub item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub discount_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPosSale {
    pub session_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub lines: Vec<PosLine>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub redeem_points: i64,
    pub tenders: Vec<Tender>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    pub status: Option<PosSessionStatus>,
    pub terminal_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub session_id: Option<String>,
    pub status: Option<PosTransactionStatus>,
    pub customer_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A sale with its lines and tenders, as printed on the receipt.
#[derive(Debug, Clone, Serialize)]
pub struct PosReceipt {
    #[serde(flatten)]
    pub transaction: PosTransaction,
    pub lines: Vec<DocumentLine>,
    pub tenders: Vec<PosTenderRow>,
}

async fn session_in(conn: &mut SqliteConnection, company_id: &str, id: &str) -> DbResult<PosSession> {
    sqlx::query_as::<_, PosSession>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_SESSION))
        .bind(company_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("POS session", id))
}

async fn receipt_in(conn: &mut SqliteConnection, company_id: &str, id: &str) -> DbResult<PosReceipt> {
    let transaction = sqlx::query_as::<_, PosTransaction>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_TRANSACTION))
        .bind(company_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("POS sale", id))?;

    let lines = sqlx::query_as::<_, DocumentLine>(
        r#"
        SELECT id, transaction_id AS document_id, line_no, item_id, description, hsn_code, quantity, unit_price,
               discount_bps, tax_rate, gross, discount, taxable, cgst, sgst, igst, total
        FROM pos_transaction_lines
        WHERE transaction_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let tenders = sqlx::query_as::<_, PosTenderRow>(
        "SELECT id, transaction_id, method, amount FROM pos_tenders WHERE transaction_id = ?1 ORDER BY rowid",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(PosReceipt {
        transaction,
        lines,
        tenders,
    })
}

/// Turns scanned items into priced lines.
async fn price_lines(conn: &mut SqliteConnection, company_id: &str, lines: &[PosLine]) -> DbResult<Vec<LineInput>> {
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let item = item::get_in(conn, company_id, &line.item_id).await?;
        if !item.is_active {
            return Err(refused("Item", &item.sku, "inactive", "sell"));
        }
        priced.push(LineInput {
            item_id: Some(item.id),
            description: item.name,
            hsn_code: item.hsn_code,
            quantity: line.quantity,
            unit_price: line.unit_price.unwrap_or(item.sale_price),
            discount_bps: line.discount_bps,
            tax_rate: item.tax_rate,
        });
    }
    Ok(priced)
}

#[derive(Debug, Clone)]
pub struct PosRepository {
    pool: SqlitePool,
}

impl PosRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PosRepository { pool }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn open_session(&self, company_id: &str, actor: &str, input: &OpenSession) -> DbResult<PosSession> {
        let terminal_id = validate_name("terminal_id", &input.terminal_id, 40)?;
        if input.opening_float.is_negative() {
            return Err(ValidationError::MustBePositive {
                field: "opening_float".to_string(),
            }
            .into());
        }

        let session = PosSession {
            id: new_id(),
            company_id: company_id.to_string(),
            terminal_id,
            opened_by: actor.to_string(),
            opening_float: input.opening_float,
            status: PosSessionStatus::Open,
            opened_at: Utc::now(),
            closed_by: None,
            closed_at: None,
            expected_cash: None,
            counted_cash: None,
            variance: None,
        };

        let mut tx = begin_write(&self.pool).await?;
        sqlx::query(
            r#"
            INSERT INTO pos_sessions (id, company_id, terminal_id, opened_by, opening_float, status, opened_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.id)
        .bind(&session.company_id)
        .bind(&session.terminal_id)
        .bind(&session.opened_by)
        .bind(session.opening_float)
        .bind(session.status)
        .bind(session.opened_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("open session for terminal", &session.terminal_id),
            other => other,
        })?;
        audit::record(&mut tx, company_id, actor, "pos.session.open", "pos_session", &session.id, &session).await?;
        tx.commit().await?;

        info!(company_id = %company_id, terminal = %session.terminal_id, float = %session.opening_float, "POS session opened");
        Ok(session)
    }

    /// Closes the session against the cashier's drawer count.
    pub async fn close_session(&self, company_id: &str, actor: &str, id: &str, counted_cash: Money) -> DbResult<PosSession> {
        if counted_cash.is_negative() {
            return Err(ValidationError::MustBePositive {
                field: "counted_cash".to_string(),
            }
            .into());
        }

        let mut tx = begin_write(&self.pool).await?;
        let session = session_in(&mut tx, company_id, id).await?;
        session.ensure_open()?;

        let net_cash: Money = sqlx::query_scalar(
            "SELECT COALESCE(SUM(net_cash), 0) FROM pos_transactions WHERE company_id = ?1 AND session_id = ?2 AND status = ?3",
        )
        .bind(company_id)
        .bind(id)
        .bind(PosTransactionStatus::Completed)
        .fetch_one(&mut *tx)
        .await?;
        let count = reconcile_cash(session.opening_float, net_cash, counted_cash);

        sqlx::query(
            r#"
            UPDATE pos_sessions
            SET status = ?1, closed_by = ?2, closed_at = ?3, expected_cash = ?4, counted_cash = ?5, variance = ?6
            WHERE company_id = ?7 AND id = ?8
            "#,
        )
        .bind(PosSessionStatus::Closed)
        .bind(actor)
        .bind(Utc::now())
        .bind(count.expected_cash)
        .bind(count.counted_cash)
        .bind(count.variance)
        .bind(company_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        audit::record(&mut tx, company_id, actor, "pos.session.close", "pos_session", id, &count).await?;
        let closed = session_in(&mut tx, company_id, id).await?;
        tx.commit().await?;

        if !count.variance.is_zero() {
            warn!(company_id = %company_id, terminal = %closed.terminal_id, variance = %count.variance, "Drawer variance at close");
        }
        info!(company_id = %company_id, terminal = %closed.terminal_id, expected = %count.expected_cash, "POS session closed");
        Ok(closed)
    }

    pub async fn get_session(&self, company_id: &str, id: &str) -> DbResult<PosSession> {
        let mut conn = self.pool.acquire().await?;
        session_in(&mut conn, company_id, id).await
    }

    pub async fn list_sessions(&self, company_id: &str, filter: &SessionFilter) -> DbResult<Vec<PosSession>> {
        let sessions = sqlx::query_as::<_, PosSession>(&format!(
            r#"{}
            WHERE company_id = ?1
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR terminal_id = ?3)
            ORDER BY opened_at DESC
            LIMIT ?4 OFFSET ?5
            "#,
            SELECT_SESSION
        ))
        .bind(company_id)
        .bind(filter.status)
        .bind(&filter.terminal_id)
        .bind(page_limit(filter.limit))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Rings up a sale. `business_date` dates the journal entry and the
    /// number's financial year.
    pub async fn create_sale(
        &self,
        company_id: &str,
        actor: &str,
        input: &NewPosSale,
        business_date: NaiveDate,
    ) -> DbResult<PosReceipt> {
        let mut tx = begin_write(&self.pool).await?;

        let session = session_in(&mut tx, company_id, &input.session_id).await?;
        session.ensure_open()?;
        company::get_in(&mut tx, company_id).await?;

        let customer = match &input.customer_id {
            Some(id) => {
                let customer = party::get_in(&mut tx, company_id, id).await?;
                if customer.kind != PartyKind::Customer {
                    return Err(ValidationError::NotAllowed {
                        field: "customer_id".to_string(),
                        allowed: vec!["customer".to_string()],
                    }
                    .into());
                }
                if !customer.is_active {
                    return Err(refused("Party", &customer.name, "inactive", "sell"));
                }
                Some(customer)
            }
            None => None,
        };
        let customer_id = customer.as_ref().map(|c| c.id.as_str());

        let lines = price_lines(&mut tx, company_id, &input.lines).await?;
        let base = net_value(&lines)?;

        let coupon = match input.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(discount::quote_in(&mut tx, company_id, code, base, customer_id, business_date).await?),
            None => None,
        };
        let coupon_discount = coupon.as_ref().map(|(_, q)| q.discount).unwrap_or_default();

        let program = loyalty::program_in(&mut tx, company_id).await?;
        let redemption = if input.redeem_points != 0 {
            let Some(party_id) = customer_id else {
                return Err(CoreError::LoyaltyRedemption {
                    reason: "points can only be redeemed by a known customer".to_string(),
                }
                .into());
            };
            let account = loyalty::account_in(&mut tx, company_id, party_id).await?;
            program.plan_redemption(input.redeem_points, account.balance, base - coupon_discount)?
        } else {
            RedemptionPlan {
                points: 0,
                value: Money::zero(),
            }
        };

        // Counter prices include GST and the buyer is at the counter.
        let options = DocumentOptions {
            supply: SupplyType::IntraState,
            tax_mode: TaxMode::Inclusive,
            extra_discount: coupon_discount + redemption.value,
            round_off: true,
        };
        let computed = compute_document(&lines, &options)?;
        let totals = computed.totals;
        let settlement = settle_tenders(totals.grand_total, &input.tenders)?;

        let years = financial_year::list_in(&mut tx, company_id).await?;
        let fy = resolve_for_posting(&years, business_date)?.clone();
        let number = numbering::next_number(&mut tx, company_id, &fy, NumberSeries::Pos).await?;

        let posted = if totals.is_nil() {
            None
        } else {
            let accounts = account::posting_accounts(&mut tx, company_id).await?;
            let entry = pos_sale_entry(business_date, &number, &settlement.kept_by_method(), &totals, &accounts)?;
            Some(journal::post_in(&mut tx, company_id, actor, &entry).await?)
        };

        let lifetime = match customer_id {
            Some(party_id) => loyalty::account_in(&mut tx, company_id, party_id).await?.lifetime_earned,
            None => 0,
        };
        let points_earned = match customer_id {
            Some(_) => program.points_earned(totals.grand_total, lifetime),
            None => 0,
        };

        let transaction = PosTransaction {
            id: new_id(),
            company_id: company_id.to_string(),
            session_id: session.id.clone(),
            number: number.clone(),
            customer_id: customer_id.map(str::to_string),
            coupon_code: coupon.as_ref().map(|(c, _)| c.code.clone()),
            coupon_discount,
            points_redeemed: redemption.points,
            points_discount: redemption.value,
            points_earned,
            gross: totals.gross,
            discount: totals.discount,
            taxable: totals.taxable,
            cgst: totals.cgst,
            sgst: totals.sgst,
            igst: totals.igst,
            round_off: totals.round_off,
            grand_total: totals.grand_total,
            paid: settlement.paid,
            change: settlement.change,
            net_cash: settlement.net_cash(),
            status: PosTransactionStatus::Completed,
            journal_entry_id: posted.map(|p| p.id),
            created_by: actor.to_string(),
            created_at: Utc::now(),
            voided_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO pos_transactions (
                id, company_id, session_id, number, customer_id, coupon_code, coupon_discount, points_redeemed,
                points_discount, points_earned, gross, discount, taxable, cgst, sgst, igst, round_off, grand_total,
                paid, change, net_cash, status, journal_entry_id, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                      ?19, ?20, ?21, ?22, ?23, ?24, ?25)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.company_id)
        .bind(&transaction.session_id)
        .bind(&transaction.number)
        .bind(&transaction.customer_id)
        .bind(&transaction.coupon_code)
        .bind(transaction.coupon_discount)
        .bind(transaction.points_redeemed)
        .bind(transaction.points_discount)
        .bind(transaction.points_earned)
        .bind(transaction.gross)
        .bind(transaction.discount)
        .bind(transaction.taxable)
        .bind(transaction.cgst)
        .bind(transaction.sgst)
        .bind(transaction.igst)
        .bind(transaction.round_off)
        .bind(transaction.grand_total)
        .bind(transaction.paid)
        .bind(transaction.change)
        .bind(transaction.net_cash)
        .bind(transaction.status)
        .bind(&transaction.journal_entry_id)
        .bind(&transaction.created_by)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;

        for line in &computed.lines {
            sqlx::query(
                r#"
                INSERT INTO pos_transaction_lines (
                    id, transaction_id, line_no, item_id, description, hsn_code, quantity, unit_price,
                    discount_bps, tax_rate, gross, discount, taxable, cgst, sgst, igst, total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
            )
            .bind(new_id())
            .bind(&transaction.id)
            .bind(line.line_no)
            .bind(&line.item_id)
            .bind(&line.description)
            .bind(&line.hsn_code)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.discount_bps)
            .bind(line.tax_rate)
            .bind(line.gross)
            .bind(line.discount)
            .bind(line.gst.taxable)
            .bind(line.gst.cgst)
            .bind(line.gst.sgst)
            .bind(line.gst.igst)
            .bind(line.total)
            .execute(&mut *tx)
            .await?;

            if let Some(item_id) = &line.item_id {
                item::apply_movement(
                    &mut tx,
                    company_id,
                    item_id,
                    -line.quantity,
                    StockReason::PosSale,
                    Some(&transaction.id),
                    Some(&number),
                )
                .await?;
            }
        }

        for tender in &settlement.tenders {
            sqlx::query("INSERT INTO pos_tenders (id, transaction_id, method, amount) VALUES (?1, ?2, ?3, ?4)")
                .bind(new_id())
                .bind(&transaction.id)
                .bind(tender.method)
                .bind(tender.amount)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(party_id) = customer_id {
            if redemption.points > 0 {
                loyalty::apply_in(
                    &mut tx,
                    company_id,
                    party_id,
                    LoyaltyTxnKind::Redeem,
                    -redemption.points,
                    Some(&transaction.id),
                    Some(&number),
                )
                .await?;
            }
            if points_earned > 0 {
                loyalty::apply_in(
                    &mut tx,
                    company_id,
                    party_id,
                    LoyaltyTxnKind::Earn,
                    points_earned,
                    Some(&transaction.id),
                    Some(&number),
                )
                .await?;
            }
        }

        if let Some((coupon, _)) = &coupon {
            discount::redeem_in(&mut tx, coupon, customer_id, &transaction.id).await?;
        }

        audit::record(
            &mut tx,
            company_id,
            actor,
            "pos.sale",
            "pos_transaction",
            &transaction.id,
            &json!({
                "number": number,
                "session": session.id,
                "grand_total": transaction.grand_total,
                "coupon": transaction.coupon_code,
                "points_redeemed": transaction.points_redeemed,
                "points_earned": transaction.points_earned,
            }),
        )
        .await?;
        let receipt = receipt_in(&mut tx, company_id, &transaction.id).await?;
        tx.commit().await?;

        info!(company_id = %company_id, number = %number, total = %transaction.grand_total, "POS sale completed");
        Ok(receipt)
    }

    /// Voids a completed sale in an open session.
    pub async fn void(&self, company_id: &str, actor: &str, id: &str) -> DbResult<PosReceipt> {
        let mut tx = begin_write(&self.pool).await?;

        let current = receipt_in(&mut tx, company_id, id).await?;
        let sale = &current.transaction;
        sale.ensure_voidable()?;
        let session = session_in(&mut tx, company_id, &sale.session_id).await?;
        if session.status != PosSessionStatus::Open {
            return Err(refused("POS sale", &sale.number, "in a closed session", "void"));
        }

        if let Some(entry_id) = &sale.journal_entry_id {
            journal::reverse_in(&mut tx, company_id, actor, entry_id, None).await?;
        }

        for line in &current.lines {
            if let Some(item_id) = &line.item_id {
                item::apply_movement(
                    &mut tx,
                    company_id,
                    item_id,
                    line.quantity,
                    StockReason::Cancellation,
                    Some(id),
                    Some(&sale.number),
                )
                .await?;
            }
        }

        loyalty::reverse_reference_in(&mut tx, company_id, id, &format!("void {}", sale.number)).await?;
        discount::release_in(&mut tx, id).await?;

        let voided_at: DateTime<Utc> = Utc::now();
        sqlx::query("UPDATE pos_transactions SET status = ?1, voided_at = ?2 WHERE company_id = ?3 AND id = ?4")
            .bind(PosTransactionStatus::Voided)
            .bind(voided_at)
            .bind(company_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            company_id,
            actor,
            "pos.void",
            "pos_transaction",
            id,
            &json!({ "number": sale.number, "grand_total": sale.grand_total }),
        )
        .await?;
        let receipt = receipt_in(&mut tx, company_id, id).await?;
        tx.commit().await?;

        info!(company_id = %company_id, number = %receipt.transaction.number, "POS sale voided");
        Ok(receipt)
    }

    pub async fn get_transaction(&self, company_id: &str, id: &str) -> DbResult<PosReceipt> {
        let mut conn = self.pool.acquire().await?;
        receipt_in(&mut conn, company_id, id).await
    }

    /// Newest first.
    pub async fn list_transactions(&self, company_id: &str, filter: &TransactionFilter) -> DbResult<Vec<PosTransaction>> {
        let rows = sqlx::query_as::<_, PosTransaction>(&format!(
            r#"{}
            WHERE company_id = ?1
              AND (?2 IS NULL OR session_id = ?2)
              AND (?3 IS NULL OR status = ?3)
              AND (?4 IS NULL OR customer_id = ?4)
            ORDER BY created_at DESC
            LIMIT ?5 OFFSET ?6
            "#,
            SELECT_TRANSACTION
        ))
        .bind(company_id)
        .bind(&filter.session_id)
        .bind(filter.status)
        .bind(&filter.customer_id)
        .bind(page_limit(filter.limit))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::discount::{NewCoupon, NewDiscountRule};
    use crate::repository::loyalty::LoyaltyAdjustment;
    use crate::repository::testing::{date, gold_program, party, setup, setup_on, stocked_item};
    use crate::{Database, DbConfig};
    use khata_core::discount::DiscountKind;
    use khata_core::journal::{JournalStatus, VoucherType};
    use khata_core::rbac::User;
    use khata_core::{Company, PaymentMethod};

    fn sale_day() -> NaiveDate {
        date(2025, 10, 20)
    }

    fn cash(paise: i64) -> Tender {
        Tender {
            method: PaymentMethod::Cash,
            amount: Money::from_paise(paise),
        }
    }

    async fn open(db: &Database, company: &Company, admin: &User) -> PosSession {
        db.pos()
            .open_session(
                &company.id,
                &admin.id,
                &OpenSession {
                    terminal_id: "COUNTER-1".to_string(),
                    opening_float: Money::from_paise(100_000),
                },
            )
            .await
            .unwrap()
    }

    fn sale(session: &PosSession, item_id: &str, qty: i64, tenders: Vec<Tender>) -> NewPosSale {
        NewPosSale {
            session_id: session.id.clone(),
            customer_id: None,
            lines: vec![PosLine {
                item_id: item_id.to_string(),
                quantity: qty,
                unit_price: None,
                discount_bps: 0,
            }],
            coupon_code: None,
            redeem_points: 0,
            tenders,
        }
    }

    /// ₹50 flat coupon and an active program; the customer starts with 50
    /// points.
    async fn promotions(db: &Database, company: &Company, admin: &User, customer_id: &str) {
        let rule = db
            .discounts()
            .create_rule(
                &company.id,
                &admin.id,
                &NewDiscountRule {
                    name: "₹50 off".to_string(),
                    kind: DiscountKind::Flat,
                    value: 5_000,
                    min_order: Money::zero(),
                    max_discount: None,
                    valid_from: None,
                    valid_until: None,
                },
            )
            .await
            .unwrap();
        db.discounts()
            .create_coupon(
                &company.id,
                &admin.id,
                &NewCoupon {
                    code: "FESTIVE50".to_string(),
                    rule_id: rule.id,
                    usage_limit: Some(10),
                    per_customer_limit: Some(1),
                },
            )
            .await
            .unwrap();
        db.loyalty().save_program(&company.id, &admin.id, &gold_program()).await.unwrap();
        db.loyalty()
            .adjust(
                &company.id,
                &admin.id,
                customer_id,
                &LoyaltyAdjustment {
                    points: 50,
                    note: "Opening balance".to_string(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_open_session_per_terminal() {
        let (db, company, admin) = setup().await;
        open(&db, &company, &admin).await;
        let again = db
            .pos()
            .open_session(
                &company.id,
                &admin.id,
                &OpenSession {
                    terminal_id: "COUNTER-1".to_string(),
                    opening_float: Money::zero(),
                },
            )
            .await;
        assert!(matches!(again, Err(DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_cash_sale_posts_and_moves_stock() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let session = open(&db, &company, &admin).await;

        let receipt = db
            .pos()
            .create_sale(&company.id, &admin.id, &sale(&session, &item.id, 2, vec![cash(150_000)]), sale_day())
            .await
            .unwrap();
        let txn = &receipt.transaction;

        assert_eq!(txn.number, "POS/2025-26/000001");
        // Counter prices include GST.
        assert_eq!(txn.grand_total.paise(), 130_000);
        assert_eq!(txn.taxable + txn.cgst + txn.sgst, txn.grand_total);
        assert!(txn.igst.is_zero());
        assert_eq!(txn.change.paise(), 20_000);
        assert_eq!(txn.net_cash.paise(), 130_000);
        assert_eq!(receipt.lines[0].hsn_code.as_deref(), Some("1006"));

        let entry = db.journals().get(&company.id, txn.journal_entry_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(entry.entry.voucher_type, VoucherType::Pos);
        assert_eq!(entry.entry.total_amount, txn.grand_total);
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 8);
    }

    #[tokio::test]
    async fn test_short_tender_rolls_back() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let session = open(&db, &company, &admin).await;

        let result = db
            .pos()
            .create_sale(&company.id, &admin.id, &sale(&session, &item.id, 2, vec![cash(100_000)]), sale_day())
            .await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::InvalidTender { .. }))));
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 10);
        assert!(db.pos().list_transactions(&company.id, &Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_lines_are_rejected() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let session = open(&db, &company, &admin).await;

        let huge = sale(&session, &item.id, i64::MAX / 1000, vec![cash(100)]);
        let result = db.pos().create_sale(&company.id, &admin.id, &huge, sale_day()).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::Validation(_)))));

        let mut input = sale(&session, &item.id, 3, vec![cash(100)]);
        input.lines[0].unit_price = Some(Money::from_paise(i64::MAX / 2));
        let result = db.pos().create_sale(&company.id, &admin.id, &input, sale_day()).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::Validation(_)))));

        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 10);
        assert!(db.pos().list_transactions(&company.id, &Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_free_sale_moves_stock_without_journal() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let rule = db
            .discounts()
            .create_rule(
                &company.id,
                &admin.id,
                &NewDiscountRule {
                    name: "Free rice".to_string(),
                    kind: DiscountKind::Flat,
                    value: 65_000,
                    min_order: Money::zero(),
                    max_discount: None,
                    valid_from: None,
                    valid_until: None,
                },
            )
            .await
            .unwrap();
        db.discounts()
            .create_coupon(
                &company.id,
                &admin.id,
                &NewCoupon {
                    code: "FREERICE".to_string(),
                    rule_id: rule.id,
                    usage_limit: None,
                    per_customer_limit: None,
                },
            )
            .await
            .unwrap();
        let session = open(&db, &company, &admin).await;

        let mut input = sale(&session, &item.id, 1, vec![]);
        input.coupon_code = Some("FREERICE".to_string());
        let receipt = db.pos().create_sale(&company.id, &admin.id, &input, sale_day()).await.unwrap();
        let txn = &receipt.transaction;

        assert!(txn.grand_total.is_zero());
        assert!(txn.paid.is_zero());
        assert_eq!(txn.coupon_discount.paise(), 65_000);
        assert!(txn.journal_entry_id.is_none());
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 9);

        let voided = db.pos().void(&company.id, &admin.id, &txn.id).await.unwrap();
        assert_eq!(voided.transaction.status, PosTransactionStatus::Voided);
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counters_all_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (db, company, admin) = setup_on(DbConfig::new(dir.path().join("khata.db"))).await;
        let item = stocked_item(&db, &company, &admin, 20).await;
        let session = open(&db, &company, &admin).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let input = sale(&session, &item.id, 1, vec![cash(65_000)]);
            let (company_id, actor) = (company.id.clone(), admin.id.clone());
            handles.push(tokio::spawn(async move {
                db.pos().create_sale(&company_id, &actor, &input, sale_day()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 12);
        let sales = db.pos().list_transactions(&company.id, &Default::default()).await.unwrap();
        assert_eq!(sales.len(), 8);
    }

    #[tokio::test]
    async fn test_coupon_and_points_then_void() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let customer = party(&db, &company, &admin, PartyKind::Customer, None).await;
        promotions(&db, &company, &admin, &customer.id).await;
        let session = open(&db, &company, &admin).await;

        let mut input = sale(&session, &item.id, 2, vec![cash(123_000)]);
        input.customer_id = Some(customer.id.clone());
        input.coupon_code = Some("festive50".to_string());
        input.redeem_points = 20;

        let receipt = db.pos().create_sale(&company.id, &admin.id, &input, sale_day()).await.unwrap();
        let txn = &receipt.transaction;
        assert_eq!(txn.coupon_code.as_deref(), Some("FESTIVE50"));
        assert_eq!(txn.coupon_discount.paise(), 5_000);
        assert_eq!(txn.points_discount.paise(), 2_000);
        // ₹1,300 − ₹50 − ₹20
        assert_eq!(txn.grand_total.paise(), 123_000);
        assert_eq!(txn.points_earned, 12);

        let account = db.loyalty().account(&company.id, &customer.id).await.unwrap();
        assert_eq!(account.balance, 50 - 20 + 12);
        assert_eq!(account.lifetime_earned, 12);

        // Per-customer limit of one.
        let again = db.pos().create_sale(&company.id, &admin.id, &input, sale_day()).await;
        assert!(matches!(again, Err(DbError::Domain(CoreError::DiscountNotApplicable { .. }))));

        let voided = db.pos().void(&company.id, &admin.id, &txn.id).await.unwrap();
        assert_eq!(voided.transaction.status, PosTransactionStatus::Voided);
        assert!(voided.transaction.voided_at.is_some());

        let entry = db.journals().get(&company.id, txn.journal_entry_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(entry.entry.status, JournalStatus::Reversed);
        assert_eq!(db.items().get(&company.id, &item.id).await.unwrap().current_stock, 10);

        let account = db.loyalty().account(&company.id, &customer.id).await.unwrap();
        assert_eq!(account.balance, 50);
        assert_eq!(account.lifetime_earned, 0);
        let coupons = db.discounts().list_coupons(&company.id).await.unwrap();
        assert_eq!(coupons[0].used_count, 0);

        assert!(db.pos().void(&company.id, &admin.id, &txn.id).await.is_err());
    }

    #[tokio::test]
    async fn test_walk_in_cannot_redeem_points() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        db.loyalty().save_program(&company.id, &admin.id, &gold_program()).await.unwrap();
        let session = open(&db, &company, &admin).await;

        let mut input = sale(&session, &item.id, 1, vec![cash(65_000)]);
        input.redeem_points = 10;
        let result = db.pos().create_sale(&company.id, &admin.id, &input, sale_day()).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::LoyaltyRedemption { .. }))));
    }

    #[tokio::test]
    async fn test_close_reconciles_drawer() {
        let (db, company, admin) = setup().await;
        let item = stocked_item(&db, &company, &admin, 10).await;
        let session = open(&db, &company, &admin).await;

        let card_and_cash = vec![
            Tender {
                method: PaymentMethod::Card,
                amount: Money::from_paise(30_000),
            },
            cash(50_000),
        ];
        db.pos()
            .create_sale(&company.id, &admin.id, &sale(&session, &item.id, 1, card_and_cash), sale_day())
            .await
            .unwrap();
        let voided = db
            .pos()
            .create_sale(&company.id, &admin.id, &sale(&session, &item.id, 1, vec![cash(65_000)]), sale_day())
            .await
            .unwrap();
        db.pos().void(&company.id, &admin.id, &voided.transaction.id).await.unwrap();

        // Float ₹1,000 + cash kept ₹350 (₹500 less ₹150 change).
        let closed = db
            .pos()
            .close_session(&company.id, &admin.id, &session.id, Money::from_paise(134_000))
            .await
            .unwrap();
        assert_eq!(closed.status, PosSessionStatus::Closed);
        assert_eq!(closed.expected_cash.map(|m| m.paise()), Some(135_000));
        assert_eq!(closed.variance.map(|m| m.paise()), Some(-1_000));

        let after = db
            .pos()
            .create_sale(&company.id, &admin.id, &sale(&session, &item.id, 1, vec![cash(65_000)]), sale_day())
            .await;
        assert!(matches!(after, Err(DbError::Domain(CoreError::SessionNotOpen(_)))));
    }
}
