//! # Loyalty Repository
//!
//! One program per company, one points account per customer. Balances only
//! change through [`apply_in`], which writes the ledger row beside them.

use chrono::Utc;
use khata_core::loyalty::{LoyaltyAccount, LoyaltyProgram, LoyaltyTier, LoyaltyTransaction, LoyaltyTxnKind};
use khata_core::validation::validate_name;
use khata_core::{PartyKind, ValidationError};
use serde::Deserialize;
use serde_json::json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{audit, begin_write, new_id, page_limit, party};
use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct ProgramRow {
    earn_points_per_100: i64,
    point_value_paise: i64,
    min_redeem_points: i64,
    max_redeem_bps: u32,
    is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoyaltyAdjustment {
    /// Signed.
    pub points: i64,
    pub note: String,
}

/// The company's program; an inactive default when none is configured.
pub async fn program_in(conn: &mut SqliteConnection, company_id: &str) -> DbResult<LoyaltyProgram> {
    let row = sqlx::query_as::<_, ProgramRow>(
        r#"
        SELECT earn_points_per_100, point_value_paise, min_redeem_points, max_redeem_bps, is_active
        FROM loyalty_programs WHERE company_id = ?1
        "#,
    )
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(LoyaltyProgram::default());
    };

    let tiers = sqlx::query_as::<_, LoyaltyTier>(
        r#"
        SELECT name, min_lifetime_points, multiplier_bps
        FROM loyalty_tiers WHERE company_id = ?1
        ORDER BY min_lifetime_points
        "#,
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(LoyaltyProgram {
        earn_points_per_100: row.earn_points_per_100,
        point_value_paise: row.point_value_paise,
        min_redeem_points: row.min_redeem_points,
        max_redeem_bps: row.max_redeem_bps,
        is_active: row.is_active,
        tiers,
    })
}

/// A customer's account; zero balance when they never earned.
pub async fn account_in(conn: &mut SqliteConnection, company_id: &str, party_id: &str) -> DbResult<LoyaltyAccount> {
    let account = sqlx::query_as::<_, LoyaltyAccount>(
        r#"
        SELECT company_id, party_id, balance, lifetime_earned, updated_at
        FROM loyalty_accounts WHERE company_id = ?1 AND party_id = ?2
        "#,
    )
    .bind(company_id)
    .bind(party_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account.unwrap_or_else(|| LoyaltyAccount {
        company_id: company_id.to_string(),
        party_id: party_id.to_string(),
        balance: 0,
        lifetime_earned: 0,
        updated_at: Utc::now(),
    }))
}

async fn save_account(conn: &mut SqliteConnection, account: &LoyaltyAccount) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO loyalty_accounts (company_id, party_id, balance, lifetime_earned, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (company_id, party_id)
        DO UPDATE SET balance = excluded.balance, lifetime_earned = excluded.lifetime_earned, updated_at = excluded.updated_at
        "#,
    )
    .bind(&account.company_id)
    .bind(&account.party_id)
    .bind(account.balance)
    .bind(account.lifetime_earned)
    .bind(account.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_txn(
    conn: &mut SqliteConnection,
    company_id: &str,
    party_id: &str,
    kind: LoyaltyTxnKind,
    points: i64,
    reference_id: Option<&str>,
    note: Option<&str>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO loyalty_transactions (id, company_id, party_id, kind, points, reference_id, note, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(new_id())
    .bind(company_id)
    .bind(party_id)
    .bind(kind)
    .bind(points)
    .bind(reference_id)
    .bind(note)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Applies a signed movement and records it. The balance never goes
/// negative.
pub async fn apply_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    party_id: &str,
    kind: LoyaltyTxnKind,
    points: i64,
    reference_id: Option<&str>,
    note: Option<&str>,
) -> DbResult<LoyaltyAccount> {
    let mut account = account_in(conn, company_id, party_id).await?;
    if points == 0 {
        return Ok(account);
    }
    account.apply(kind, points)?;
    save_account(conn, &account).await?;
    insert_txn(conn, company_id, party_id, kind, points, reference_id, note).await?;

    debug!(party_id = %party_id, ?kind, points, balance = account.balance, "Loyalty points moved");
    Ok(account)
}

/// Undoes every movement recorded against `reference_id` with a single
/// adjustment. Points earned come off the lifetime total too.
pub async fn reverse_reference_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    reference_id: &str,
    note: &str,
) -> DbResult<()> {
    let rows: Vec<(String, LoyaltyTxnKind, i64)> = sqlx::query_as(
        "SELECT party_id, kind, points FROM loyalty_transactions WHERE company_id = ?1 AND reference_id = ?2",
    )
    .bind(company_id)
    .bind(reference_id)
    .fetch_all(&mut *conn)
    .await?;

    let Some((party_id, _, _)) = rows.first() else {
        return Ok(());
    };
    let party_id = party_id.clone();
    let net: i64 = rows.iter().map(|(_, _, points)| points).sum();
    let earned: i64 = rows
        .iter()
        .filter(|(_, kind, _)| *kind == LoyaltyTxnKind::Earn)
        .map(|(_, _, points)| points)
        .sum();

    let mut account = account_in(conn, company_id, &party_id).await?;
    account.apply(LoyaltyTxnKind::Adjust, -net)?;
    account.lifetime_earned = (account.lifetime_earned - earned).max(0);
    save_account(conn, &account).await?;
    insert_txn(conn, company_id, &party_id, LoyaltyTxnKind::Adjust, -net, Some(reference_id), Some(note)).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    pub async fn program(&self, company_id: &str) -> DbResult<LoyaltyProgram> {
        let mut conn = self.pool.acquire().await?;
        program_in(&mut conn, company_id).await
    }

    /// Replaces the program settings and tiers.
    pub async fn save_program(&self, company_id: &str, actor: &str, program: &LoyaltyProgram) -> DbResult<LoyaltyProgram> {
        program.validate()?;
        for tier in &program.tiers {
            validate_name("tier name", &tier.name, 40)?;
        }

        let mut tx = begin_write(&self.pool).await?;
        sqlx::query(
            r#"
            INSERT INTO loyalty_programs (company_id, earn_points_per_100, point_value_paise, min_redeem_points, max_redeem_bps, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (company_id) DO UPDATE SET
                earn_points_per_100 = excluded.earn_points_per_100,
                point_value_paise = excluded.point_value_paise,
                min_redeem_points = excluded.min_redeem_points,
                max_redeem_bps = excluded.max_redeem_bps,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(company_id)
        .bind(program.earn_points_per_100)
        .bind(program.point_value_paise)
        .bind(program.min_redeem_points)
        .bind(program.max_redeem_bps)
        .bind(program.is_active)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM loyalty_tiers WHERE company_id = ?1")
            .bind(company_id)
            .execute(&mut *tx)
            .await?;
        for tier in &program.tiers {
            sqlx::query("INSERT INTO loyalty_tiers (company_id, name, min_lifetime_points, multiplier_bps) VALUES (?1, ?2, ?3, ?4)")
                .bind(company_id)
                .bind(tier.name.trim())
                .bind(tier.min_lifetime_points)
                .bind(tier.multiplier_bps)
                .execute(&mut *tx)
                .await?;
        }

        audit::record(&mut tx, company_id, actor, "loyalty.program.save", "loyalty_program", company_id, program).await?;
        let saved = program_in(&mut tx, company_id).await?;
        tx.commit().await?;

        info!(company_id = %company_id, active = saved.is_active, tiers = saved.tiers.len(), "Loyalty program saved");
        Ok(saved)
    }

    pub async fn account(&self, company_id: &str, party_id: &str) -> DbResult<LoyaltyAccount> {
        let mut conn = self.pool.acquire().await?;
        party::get_in(&mut conn, company_id, party_id).await?;
        account_in(&mut conn, company_id, party_id).await
    }

    /// Newest first.
    pub async fn transactions(&self, company_id: &str, party_id: &str, limit: Option<i64>) -> DbResult<Vec<LoyaltyTransaction>> {
        let rows = sqlx::query_as::<_, LoyaltyTransaction>(
            r#"
            SELECT id, company_id, party_id, kind, points, reference_id, note, created_at
            FROM loyalty_transactions
            WHERE company_id = ?1 AND party_id = ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
        )
        .bind(company_id)
        .bind(party_id)
        .bind(page_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Manual correction, e.g. goodwill points or a data-entry fix.
    pub async fn adjust(
        &self,
        company_id: &str,
        actor: &str,
        party_id: &str,
        input: &LoyaltyAdjustment,
    ) -> DbResult<LoyaltyAccount> {
        let note = validate_name("note", &input.note, 200)?;
        if input.points == 0 {
            return Err(ValidationError::MustBePositive {
                field: "points".to_string(),
            }
            .into());
        }

        let mut tx = begin_write(&self.pool).await?;
        let customer = party::get_in(&mut tx, company_id, party_id).await?;
        if customer.kind != PartyKind::Customer {
            return Err(ValidationError::NotAllowed {
                field: "party_id".to_string(),
                allowed: vec!["customer".to_string()],
            }
            .into());
        }

        let account =
            apply_in(&mut tx, company_id, party_id, LoyaltyTxnKind::Adjust, input.points, None, Some(&note)).await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "loyalty.adjust",
            "party",
            party_id,
            &json!({ "points": input.points, "note": note, "balance": account.balance }),
        )
        .await?;
        tx.commit().await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{gold_program, party, setup};
    use crate::DbError;
    use khata_core::CoreError;

    #[tokio::test]
    async fn test_default_program_inactive() {
        let (db, company, _) = setup().await;
        let program = db.loyalty().program(&company.id).await.unwrap();
        assert!(!program.is_active);
        assert!(program.tiers.is_empty());
    }

    #[tokio::test]
    async fn test_save_program_replaces_tiers() {
        let (db, company, admin) = setup().await;
        let saved = db.loyalty().save_program(&company.id, &admin.id, &gold_program()).await.unwrap();
        assert_eq!(saved.tiers.len(), 1);

        let mut bad = gold_program();
        bad.point_value_paise = 0;
        assert!(db.loyalty().save_program(&company.id, &admin.id, &bad).await.is_err());

        let mut no_tiers = gold_program();
        no_tiers.tiers.clear();
        let saved = db.loyalty().save_program(&company.id, &admin.id, &no_tiers).await.unwrap();
        assert!(saved.tiers.is_empty());
    }

    #[tokio::test]
    async fn test_adjust_never_negative() {
        let (db, company, admin) = setup().await;
        let customer = party(&db, &company, &admin, PartyKind::Customer, None).await;

        let account = db
            .loyalty()
            .adjust(
                &company.id,
                &admin.id,
                &customer.id,
                &LoyaltyAdjustment {
                    points: 50,
                    note: "Welcome bonus".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(account.balance, 50);
        assert_eq!(account.lifetime_earned, 0);

        let result = db
            .loyalty()
            .adjust(
                &company.id,
                &admin.id,
                &customer.id,
                &LoyaltyAdjustment {
                    points: -80,
                    note: "Correction".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::LoyaltyRedemption { .. }))));
        assert_eq!(db.loyalty().transactions(&company.id, &customer.id, None).await.unwrap().len(), 1);
    }
}
