//! # Account Repository
//!
//! The chart of accounts. System accounts are seeded at signup; party
//! ledgers are created by [`crate::PartyRepository`]; everything else is
//! added here.

use chrono::Utc;
use khata_core::ledger::{Account, AccountType, SystemAccount};
use khata_core::posting::PostingAccounts;
use khata_core::validation::validate_name;
use khata_core::ValidationError;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{audit, begin_write, new_id, refused};
use crate::error::{DbError, DbResult};

const SELECT_ACCOUNT: &str = r#"
    SELECT id, company_id, code, name, account_type, system_tag, party_id, is_active, created_at
    FROM accounts
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
}

/// Codes are 1-20 letters, digits or hyphens.
fn validate_code(code: &str) -> Result<String, ValidationError> {
    let code = validate_name("code", code, 20)?;
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::invalid_format("code", "only letters, digits and hyphens"));
    }
    Ok(code)
}

pub async fn insert_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    code: &str,
    name: &str,
    account_type: AccountType,
    system_tag: Option<SystemAccount>,
    party_id: Option<&str>,
) -> DbResult<Account> {
    let account = Account {
        id: new_id(),
        company_id: company_id.to_string(),
        code: code.to_string(),
        name: name.to_string(),
        account_type,
        system_tag,
        party_id: party_id.map(str::to_string),
        is_active: true,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO accounts (id, company_id, code, name, account_type, system_tag, party_id, is_active, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
        "#,
    )
    .bind(&account.id)
    .bind(&account.company_id)
    .bind(&account.code)
    .bind(&account.name)
    .bind(account.account_type)
    .bind(account.system_tag)
    .bind(&account.party_id)
    .bind(account.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { .. } => DbError::duplicate("account code", code),
        other => other,
    })?;

    Ok(account)
}

pub async fn list_in(conn: &mut SqliteConnection, company_id: &str) -> DbResult<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>(&format!("{} WHERE company_id = ?1 ORDER BY code", SELECT_ACCOUNT))
        .bind(company_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(accounts)
}

pub async fn get_in(conn: &mut SqliteConnection, company_id: &str, id: &str) -> DbResult<Account> {
    sqlx::query_as::<_, Account>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_ACCOUNT))
        .bind(company_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Account", id))
}

/// Resolves the system accounts the posting rules need.
pub async fn posting_accounts(conn: &mut SqliteConnection, company_id: &str) -> DbResult<PostingAccounts> {
    let accounts = sqlx::query_as::<_, Account>(&format!(
        "{} WHERE company_id = ?1 AND system_tag IS NOT NULL",
        SELECT_ACCOUNT
    ))
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(PostingAccounts::resolve(&accounts)?)
}

/// Next free code in a party range: `1200-0001`, `1200-0002`, ...
pub async fn next_party_code(conn: &mut SqliteConnection, company_id: &str, prefix: &str) -> DbResult<String> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE company_id = ?1 AND code LIKE ?2")
        .bind(company_id)
        .bind(format!("{}-%", prefix))
        .fetch_one(&mut *conn)
        .await?;
    Ok(format!("{}-{:04}", prefix, count + 1))
}

#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    pub async fn list(&self, company_id: &str) -> DbResult<Vec<Account>> {
        debug!(company_id = %company_id, "Listing accounts");
        let mut conn = self.pool.acquire().await?;
        list_in(&mut conn, company_id).await
    }

    pub async fn get(&self, company_id: &str, id: &str) -> DbResult<Account> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, company_id, id).await
    }

    /// Adds a plain (untagged) account.
    pub async fn create(&self, company_id: &str, actor: &str, input: &NewAccount) -> DbResult<Account> {
        let code = validate_code(&input.code)?;
        let name = validate_name("name", &input.name, 120)?;

        let mut tx = begin_write(&self.pool).await?;
        let account = insert_in(&mut tx, company_id, &code, &name, input.account_type, None, None).await?;
        audit::record(&mut tx, company_id, actor, "account.create", "account", &account.id, &account).await?;
        tx.commit().await?;

        info!(company_id = %company_id, code = %account.code, "Account created");
        Ok(account)
    }

    /// Deactivated accounts reject new postings but keep their history.
    pub async fn set_active(&self, company_id: &str, actor: &str, id: &str, active: bool) -> DbResult<Account> {
        let account = self.get(company_id, id).await?;
        if account.system_tag.is_some() && !active {
            return Err(refused("Account", &account.code, "a system account", "deactivate"));
        }

        let mut tx = begin_write(&self.pool).await?;
        sqlx::query("UPDATE accounts SET is_active = ?1 WHERE company_id = ?2 AND id = ?3")
            .bind(active)
            .bind(company_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "account.set_active",
            "account",
            id,
            &serde_json::json!({ "is_active": active }),
        )
        .await?;
        tx.commit().await?;

        self.get(company_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::setup;
    use khata_core::ledger::default_chart;

    #[tokio::test]
    async fn test_signup_seeds_chart() {
        let (db, company, _) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();
        assert_eq!(accounts.len(), default_chart().len());

        let mut conn = db.pool().acquire().await.unwrap();
        let posting = posting_accounts(&mut conn, &company.id).await.unwrap();
        let cash = accounts.iter().find(|a| a.code == "1000").unwrap();
        assert_eq!(posting.cash, cash.id);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let (db, company, admin) = setup().await;
        let input = NewAccount {
            code: "5400".to_string(),
            name: "Electricity".to_string(),
            account_type: AccountType::Expense,
        };
        db.accounts().create(&company.id, &admin.id, &input).await.unwrap();
        let again = db.accounts().create(&company.id, &admin.id, &input).await;
        assert!(matches!(again, Err(DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_other_company_reads_not_found() {
        let (db, company, _) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();
        let result = db.accounts().get("another-company", &accounts[0].id).await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_system_account_cannot_be_deactivated() {
        let (db, company, admin) = setup().await;
        let accounts = db.accounts().list(&company.id).await.unwrap();
        let cash = accounts.iter().find(|a| a.code == "1000").unwrap();
        assert!(db.accounts().set_active(&company.id, &admin.id, &cash.id, false).await.is_err());
    }
}
