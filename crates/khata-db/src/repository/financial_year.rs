//! # Financial Year Repository
//!
//! Creating, closing and reopening fiscal periods. Posting code reads the
//! years through [`list_in`] on its own transaction, so closing a year and
//! posting into it cannot interleave.

use chrono::{NaiveDate, Utc};
use khata_core::financial_year::{label, validate_range, FinancialYear, FinancialYearStatus};
use khata_core::validation::validate_name;
use serde::Deserialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::{audit, begin_write, new_id};
use crate::error::{DbError, DbResult};

const SELECT_YEAR: &str = r#"
    SELECT id, company_id, name, start_date, end_date, status, created_at, closed_at
    FROM financial_years
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct NewFinancialYear {
    /// Defaults to `2025-26` style.
    pub name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// All years of a company, oldest first.
pub async fn list_in(conn: &mut SqliteConnection, company_id: &str) -> DbResult<Vec<FinancialYear>> {
    let years = sqlx::query_as::<_, FinancialYear>(&format!(
        "{} WHERE company_id = ?1 ORDER BY start_date",
        SELECT_YEAR
    ))
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(years)
}

/// Validates against existing years and inserts.
pub async fn insert_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    input: &NewFinancialYear,
) -> DbResult<FinancialYear> {
    let existing = list_in(conn, company_id).await?;
    validate_range(input.start_date, input.end_date, &existing)?;

    let name = match &input.name {
        Some(name) => validate_name("name", name, 40)?,
        None => label(input.start_date, input.end_date),
    };

    let fy = FinancialYear {
        id: new_id(),
        company_id: company_id.to_string(),
        name,
        start_date: input.start_date,
        end_date: input.end_date,
        status: FinancialYearStatus::Open,
        created_at: Utc::now(),
        closed_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO financial_years (id, company_id, name, start_date, end_date, status, created_at, closed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)
        "#,
    )
    .bind(&fy.id)
    .bind(&fy.company_id)
    .bind(&fy.name)
    .bind(fy.start_date)
    .bind(fy.end_date)
    .bind(fy.status)
    .bind(fy.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(fy)
}

#[derive(Debug, Clone)]
pub struct FinancialYearRepository {
    pool: SqlitePool,
}

impl FinancialYearRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FinancialYearRepository { pool }
    }

    pub async fn list(&self, company_id: &str) -> DbResult<Vec<FinancialYear>> {
        let mut conn = self.pool.acquire().await?;
        list_in(&mut conn, company_id).await
    }

    pub async fn get(&self, company_id: &str, id: &str) -> DbResult<FinancialYear> {
        sqlx::query_as::<_, FinancialYear>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_YEAR))
            .bind(company_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Financial year", id))
    }

    /// Creates a year. Overlapping an existing year is rejected.
    pub async fn create(&self, company_id: &str, actor: &str, input: &NewFinancialYear) -> DbResult<FinancialYear> {
        let mut tx = begin_write(&self.pool).await?;

        let fy = insert_in(&mut tx, company_id, input).await?;
        audit::record(&mut tx, company_id, actor, "financial_year.create", "financial_year", &fy.id, &fy).await?;

        tx.commit().await?;
        info!(company_id = %company_id, name = %fy.name, "Financial year created");
        Ok(fy)
    }

    /// Closes a year; later postings dated inside it are rejected.
    pub async fn close(&self, company_id: &str, actor: &str, id: &str) -> DbResult<FinancialYear> {
        self.set_status(company_id, actor, id, FinancialYearStatus::Closed).await
    }

    pub async fn reopen(&self, company_id: &str, actor: &str, id: &str) -> DbResult<FinancialYear> {
        self.set_status(company_id, actor, id, FinancialYearStatus::Open).await
    }

    async fn set_status(
        &self,
        company_id: &str,
        actor: &str,
        id: &str,
        status: FinancialYearStatus,
    ) -> DbResult<FinancialYear> {
        let current = self.get(company_id, id).await?;
        if current.status == status {
            let op = match status {
                FinancialYearStatus::Open => "reopen",
                FinancialYearStatus::Closed => "close",
            };
            return Err(khata_core::CoreError::invalid_status("Financial year", &current.name, current.status, op).into());
        }

        let closed_at = match status {
            FinancialYearStatus::Closed => Some(Utc::now()),
            FinancialYearStatus::Open => None,
        };

        let mut tx = begin_write(&self.pool).await?;
        sqlx::query("UPDATE financial_years SET status = ?1, closed_at = ?2 WHERE company_id = ?3 AND id = ?4")
            .bind(status)
            .bind(closed_at)
            .bind(company_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let action = match status {
            FinancialYearStatus::Open => "financial_year.reopen",
            FinancialYearStatus::Closed => "financial_year.close",
        };
        audit::record(&mut tx, company_id, actor, action, "financial_year", id, &json!({ "name": current.name })).await?;
        tx.commit().await?;

        info!(company_id = %company_id, name = %current.name, ?status, "Financial year status changed");
        self.get(company_id, id).await
    }
}
