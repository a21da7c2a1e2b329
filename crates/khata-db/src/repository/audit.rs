//! # Audit Log
//!
//! Append-only record of state changes. Rows are written by [`record`]
//! inside the same transaction as the change they describe, so a rolled
//! back change leaves no audit row behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{new_id, page_limit};
use crate::error::DbResult;

/// One audit log row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditRecord {
    pub id: String,
    pub company_id: String,
    pub actor_id: String,
    /// `entity.verb`, e.g. `sales_invoice.post`.
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    /// JSON document describing the change.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Appends an audit row on the caller's transaction.
pub async fn record<P: Serialize>(
    conn: &mut SqliteConnection,
    company_id: &str,
    actor_id: &str,
    action: &str,
    entity: &str,
    entity_id: &str,
    payload: &P,
) -> DbResult<()> {
    let payload = serde_json::to_string(payload)?;
    debug!(company_id = %company_id, action = %action, entity_id = %entity_id, "Audit");

    sqlx::query(
        r#"
        INSERT INTO audit_log (id, company_id, actor_id, action, entity, entity_id, payload, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(new_id())
    .bind(company_id)
    .bind(actor_id)
    .bind(action)
    .bind(entity)
    .bind(entity_id)
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Newest first.
    pub async fn list(&self, company_id: &str, filter: &AuditFilter) -> DbResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT id, company_id, actor_id, action, entity, entity_id, payload, created_at
            FROM audit_log
            WHERE company_id = ?1
              AND (?2 IS NULL OR entity = ?2)
              AND (?3 IS NULL OR entity_id = ?3)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?4
            "#,
        )
        .bind(company_id)
        .bind(&filter.entity)
        .bind(&filter.entity_id)
        .bind(page_limit(filter.limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::setup;

    #[tokio::test]
    async fn test_signup_is_audited() {
        let (db, company, admin) = setup().await;

        let rows = db
            .audit()
            .list(
                &company.id,
                &AuditFilter {
                    entity: Some("company".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "company.signup");
        assert_eq!(rows[0].actor_id, admin.id);
        let payload: serde_json::Value = serde_json::from_str(&rows[0].payload).unwrap();
        assert_eq!(payload["name"], "Sharma Traders");
    }
}
