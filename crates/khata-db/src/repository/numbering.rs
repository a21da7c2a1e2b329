//! # Document Numbering
//!
//! Gap-free counters per company, financial year and series.
//!
//! ```text
//! number_series
//! ┌────────────┬───────────────────┬───────────────┬────────────┐
//! │ company_id │ financial_year_id │ series        │ last_value │
//! ├────────────┼───────────────────┼───────────────┼────────────┤
//! │ co-1       │ fy-2025-26        │ sales_invoice │ 41         │ → INV/2025-26/0042
//! │ co-1       │ fy-2025-26        │ pos           │ 1207       │ → POS/2025-26/001208
//! └────────────┴───────────────────┴───────────────┴────────────┘
//! ```
//!
//! The counter is bumped by an upsert on the posting transaction, so a
//! rolled back posting gives its number back.

use khata_core::document::NumberSeries;
use khata_core::financial_year::{label, FinancialYear};
use sqlx::SqliteConnection;

use crate::error::DbResult;

/// Reserves the next number of `series` in `fy`.
pub async fn next_number(
    conn: &mut SqliteConnection,
    company_id: &str,
    fy: &FinancialYear,
    series: NumberSeries,
) -> DbResult<String> {
    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO number_series (company_id, financial_year_id, series, last_value)
        VALUES (?1, ?2, ?3, 1)
        ON CONFLICT (company_id, financial_year_id, series)
        DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(company_id)
    .bind(&fy.id)
    .bind(series)
    .fetch_one(&mut *conn)
    .await?;

    Ok(series.format(&label(fy.start_date, fy.end_date), seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::financial_year;
    use crate::repository::testing::{setup, signup_day};

    #[tokio::test]
    async fn test_series_are_independent() {
        let (db, company, _) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let years = financial_year::list_in(&mut conn, &company.id).await.unwrap();
        let fy = khata_core::financial_year::find_for_date(&years, signup_day()).unwrap().clone();

        let a = next_number(&mut conn, &company.id, &fy, NumberSeries::SalesInvoice).await.unwrap();
        let b = next_number(&mut conn, &company.id, &fy, NumberSeries::SalesInvoice).await.unwrap();
        let c = next_number(&mut conn, &company.id, &fy, NumberSeries::PurchaseBill).await.unwrap();

        assert_eq!(a, "INV/2025-26/0001");
        assert_eq!(b, "INV/2025-26/0002");
        assert_eq!(c, "BILL/2025-26/0001");
    }
}
