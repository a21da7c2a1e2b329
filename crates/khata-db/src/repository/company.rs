//! # Company Repository
//!
//! Signup creates a tenant in one transaction:
//!
//! ```text
//! BEGIN
//!  ├── companies           Sharma Traders, state 27
//!  ├── accounts            default chart (Cash, Bank, GST, Sales, ...)
//!  ├── financial_years     2025-26, open
//!  ├── roles               admin, accountant, sales_manager, cashier, ...
//!  ├── users + user_roles  owner → admin
//!  └── audit_log           company.signup
//! COMMIT
//! ```

use chrono::{NaiveDate, Utc};
use khata_core::financial_year::indian_bounds;
use khata_core::gst::{Gstin, StateCode};
use khata_core::ledger::default_chart;
use khata_core::rbac::{builtin_roles, User, ADMIN_ROLE};
use khata_core::validation::validate_name;
use khata_core::{Company, ValidationError};
use serde::Deserialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::financial_year::{self, NewFinancialYear};
use super::user::{self, NewUser};
use super::{account, audit, begin_write, new_id};
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, Deserialize)]
pub struct CompanySignup {
    pub name: String,
    /// Registered businesses give a GSTIN; the state comes from it.
    #[serde(default)]
    pub gstin: Option<String>,
    /// Required for unregistered businesses.
    #[serde(default)]
    pub state_code: Option<u8>,
    pub admin_username: String,
    pub admin_full_name: String,
    #[serde(default)]
    pub admin_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyUpdate {
    pub name: String,
    #[serde(default)]
    pub gstin: Option<String>,
    #[serde(default)]
    pub state_code: Option<u8>,
}

/// Normalises an optional GSTIN and works out the state code.
///
/// With a GSTIN its first two digits are the state; an explicit state code
/// that disagrees is rejected. Without one the state code is required.
pub(crate) fn gstin_and_state(
    gstin: Option<&str>,
    state_code: Option<u8>,
) -> Result<(Option<String>, u8), ValidationError> {
    match gstin.map(str::trim).filter(|g| !g.is_empty()) {
        Some(raw) => {
            let gstin = Gstin::parse(raw)?;
            let state = gstin.state_code().value();
            if let Some(given) = state_code {
                if given != state {
                    return Err(ValidationError::invalid_format(
                        "state_code",
                        format!("GSTIN is registered in state {:02}", state),
                    ));
                }
            }
            Ok((Some(gstin.as_str().to_string()), state))
        }
        None => {
            let code = state_code.ok_or_else(|| ValidationError::Required {
                field: "state_code".to_string(),
            })?;
            Ok((None, StateCode::new(code)?.value()))
        }
    }
}

pub(crate) async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Company> {
    sqlx::query_as::<_, Company>("SELECT id, name, gstin, state_code, created_at FROM companies WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Company", id))
}

#[derive(Debug, Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CompanyRepository { pool }
    }

    /// Creates a company with its chart, current financial year, built-in
    /// roles and an admin user. `today` picks the financial year.
    pub async fn signup(
        &self,
        input: &CompanySignup,
        admin_password_hash: &str,
        today: NaiveDate,
    ) -> DbResult<(Company, User)> {
        let name = validate_name("name", &input.name, 120)?;
        let (gstin, state_code) = gstin_and_state(input.gstin.as_deref(), input.state_code)?;

        let company = Company {
            id: new_id(),
            name,
            gstin,
            state_code,
            created_at: Utc::now(),
        };

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query("INSERT INTO companies (id, name, gstin, state_code, created_at) VALUES (?1, ?2, ?3, ?4, ?5)")
            .bind(&company.id)
            .bind(&company.name)
            .bind(&company.gstin)
            .bind(company.state_code)
            .bind(company.created_at)
            .execute(&mut *tx)
            .await?;

        for entry in default_chart() {
            account::insert_in(&mut tx, &company.id, entry.code, entry.name, entry.account_type, entry.system, None)
                .await?;
        }

        let (start_date, end_date) = indian_bounds(today);
        financial_year::insert_in(
            &mut tx,
            &company.id,
            &NewFinancialYear {
                name: None,
                start_date,
                end_date,
            },
        )
        .await?;

        for role in builtin_roles() {
            let permissions: Vec<String> = role.permissions.iter().map(|p| p.to_string()).collect();
            user::insert_role_in(&mut tx, &company.id, role.name, Some(role.description), true, &permissions).await?;
        }

        let admin = user::insert_user_in(
            &mut tx,
            &company.id,
            &NewUser {
                username: input.admin_username.clone(),
                full_name: input.admin_full_name.clone(),
                email: input.admin_email.clone(),
                roles: vec![ADMIN_ROLE.to_string()],
            },
            admin_password_hash,
        )
        .await?;
        user::assign_roles_in(&mut tx, &company.id, &admin.id, &[ADMIN_ROLE.to_string()]).await?;

        audit::record(
            &mut tx,
            &company.id,
            &admin.id,
            "company.signup",
            "company",
            &company.id,
            &json!({
                "name": company.name,
                "gstin": company.gstin,
                "state_code": company.state_code,
                "admin": admin.username,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(company_id = %company.id, name = %company.name, "Company signed up");
        Ok((company, admin))
    }

    pub async fn get(&self, id: &str) -> DbResult<Company> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, id).await
    }

    /// Renames the company or changes its registration. Posted documents
    /// keep the place of supply they were computed with.
    pub async fn update(&self, id: &str, actor: &str, input: &CompanyUpdate) -> DbResult<Company> {
        let name = validate_name("name", &input.name, 120)?;
        let (gstin, state_code) = gstin_and_state(input.gstin.as_deref(), input.state_code)?;

        let mut tx = begin_write(&self.pool).await?;
        let before = get_in(&mut tx, id).await?;

        sqlx::query("UPDATE companies SET name = ?1, gstin = ?2, state_code = ?3 WHERE id = ?4")
            .bind(&name)
            .bind(&gstin)
            .bind(state_code)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        audit::record(
            &mut tx,
            id,
            actor,
            "company.update",
            "company",
            id,
            &json!({
                "before": { "name": before.name, "gstin": before.gstin, "state_code": before.state_code },
                "after": { "name": name, "gstin": gstin, "state_code": state_code },
            }),
        )
        .await?;
        let company = get_in(&mut tx, id).await?;
        tx.commit().await?;

        Ok(company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{setup, signup_day};
    use crate::{Database, DbConfig};

    fn unregistered(name: &str, state_code: Option<u8>) -> CompanySignup {
        CompanySignup {
            name: name.to_string(),
            gstin: None,
            state_code,
            admin_username: "admin".to_string(),
            admin_full_name: "Asha Rao".to_string(),
            admin_email: Some("asha@example.in".to_string()),
        }
    }

    #[tokio::test]
    async fn test_signup_takes_state_from_gstin() {
        let (db, company, admin) = setup().await;
        assert_eq!(company.state_code, 27);
        assert_eq!(company.gstin.as_deref(), Some("27AAPFU0939F1ZV"));

        let roles = db.users().get(&company.id, &admin.id).await.unwrap().roles;
        assert_eq!(roles, vec![ADMIN_ROLE.to_string()]);
        assert_eq!(db.roles().list(&company.id).await.unwrap().len(), builtin_roles().len());
    }

    #[tokio::test]
    async fn test_unregistered_company_needs_state() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db.companies().signup(&unregistered("Rao Stores", None), "hash", signup_day()).await;
        assert!(result.is_err());

        let (company, _) = db
            .companies()
            .signup(&unregistered("Rao Stores", Some(29)), "hash", signup_day())
            .await
            .unwrap();
        assert_eq!(company.state_code, 29);
        assert!(company.gstin.is_none());
    }

    #[tokio::test]
    async fn test_state_mismatch_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut input = unregistered("Rao Stores", Some(29));
        input.gstin = Some("27AAPFU0939F1ZV".to_string());
        assert!(db.companies().signup(&input, "hash", signup_day()).await.is_err());
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let (db, first, _) = setup().await;
        let (second, _) = db
            .companies()
            .signup(&unregistered("Rao Stores", Some(29)), "hash", signup_day())
            .await
            .unwrap();

        let first_accounts = db.accounts().list(&first.id).await.unwrap();
        assert!(db.accounts().get(&second.id, &first_accounts[0].id).await.is_err());
        // Same username in another company is fine.
        assert!(db.users().find_for_login(&second.id, "owner").await.unwrap().is_none());
        assert!(db.users().find_for_login(&second.id, "admin").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_changes_registration() {
        let (db, company, admin) = setup().await;
        let updated = db
            .companies()
            .update(
                &company.id,
                &admin.id,
                &CompanyUpdate {
                    name: "Sharma Traders LLP".to_string(),
                    gstin: Some("29AAGCB7383J1Z4".to_string()),
                    state_code: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Sharma Traders LLP");
        assert_eq!(updated.state_code, 29);
    }
}
