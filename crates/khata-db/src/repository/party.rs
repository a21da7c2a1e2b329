//! # Party Repository
//!
//! Customers and suppliers. Creating a party also opens its ledger account
//! (`1200-0001` for the first customer, `2100-0001` for the first supplier)
//! in the same transaction, so a party never exists without one.

use chrono::Utc;
use khata_core::ledger::party_account_type;
use khata_core::validation::{validate_email, validate_name, validate_phone};
use khata_core::{Party, PartyKind, ValidationError};
use serde::Deserialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::company::gstin_and_state;
use super::{account, audit, begin_write, new_id, page_limit};
use crate::error::{DbError, DbResult};

const SELECT_PARTY: &str = r#"
    SELECT id, company_id, kind, name, gstin, state_code, phone, email, account_id, is_active, created_at
    FROM parties
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct NewParty {
    pub kind: PartyKind,
    pub name: String,
    #[serde(default)]
    pub gstin: Option<String>,
    /// Needed when there is no GSTIN.
    #[serde(default)]
    pub state_code: Option<u8>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Kind is fixed once created; everything else may change.
#[derive(Debug, Clone, Deserialize)]
pub struct PartyUpdate {
    pub name: String,
    #[serde(default)]
    pub gstin: Option<String>,
    #[serde(default)]
    pub state_code: Option<u8>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartyFilter {
    pub kind: Option<PartyKind>,
    /// Case-insensitive match on name, GSTIN or phone.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

struct Contact {
    phone: Option<String>,
    email: Option<String>,
}

fn contact(phone: &Option<String>, email: &Option<String>) -> Result<Contact, ValidationError> {
    let phone = match phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => {
            validate_phone(p)?;
            Some(p.to_string())
        }
        None => None,
    };
    let email = match email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) => {
            validate_email(e)?;
            Some(e.to_string())
        }
        None => None,
    };
    Ok(Contact { phone, email })
}

pub async fn get_in(conn: &mut SqliteConnection, company_id: &str, id: &str) -> DbResult<Party> {
    sqlx::query_as::<_, Party>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_PARTY))
        .bind(company_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Party", id))
}

#[derive(Debug, Clone)]
pub struct PartyRepository {
    pool: SqlitePool,
}

impl PartyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PartyRepository { pool }
    }

    pub async fn create(&self, company_id: &str, actor: &str, input: &NewParty) -> DbResult<Party> {
        let name = validate_name("name", &input.name, 120)?;
        let (gstin, state_code) = gstin_and_state(input.gstin.as_deref(), input.state_code)?;
        let contact = contact(&input.phone, &input.email)?;

        let party_id = new_id();
        let (account_type, prefix) = party_account_type(input.kind);

        let mut tx = begin_write(&self.pool).await?;

        let code = account::next_party_code(&mut tx, company_id, prefix).await?;
        let ledger = account::insert_in(&mut tx, company_id, &code, &name, account_type, None, Some(&party_id)).await?;

        let party = Party {
            id: party_id,
            company_id: company_id.to_string(),
            kind: input.kind,
            name,
            gstin,
            state_code,
            phone: contact.phone,
            email: contact.email,
            account_id: ledger.id,
            is_active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO parties (id, company_id, kind, name, gstin, state_code, phone, email, account_id, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)
            "#,
        )
        .bind(&party.id)
        .bind(&party.company_id)
        .bind(party.kind)
        .bind(&party.name)
        .bind(&party.gstin)
        .bind(party.state_code)
        .bind(&party.phone)
        .bind(&party.email)
        .bind(&party.account_id)
        .bind(party.created_at)
        .execute(&mut *tx)
        .await?;

        audit::record(&mut tx, company_id, actor, "party.create", "party", &party.id, &party).await?;
        tx.commit().await?;

        info!(company_id = %company_id, party = %party.name, account = %code, "Party created");
        Ok(party)
    }

    pub async fn get(&self, company_id: &str, id: &str) -> DbResult<Party> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, company_id, id).await
    }

    pub async fn list(&self, company_id: &str, filter: &PartyFilter) -> DbResult<Vec<Party>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let parties = sqlx::query_as::<_, Party>(&format!(
            r#"{}
            WHERE company_id = ?1
              AND (?2 IS NULL OR kind = ?2)
              AND (?3 IS NULL OR lower(name) LIKE ?3 OR lower(gstin) LIKE ?3 OR phone LIKE ?3)
            ORDER BY name
            LIMIT ?4 OFFSET ?5
            "#,
            SELECT_PARTY
        ))
        .bind(company_id)
        .bind(filter.kind)
        .bind(search)
        .bind(page_limit(filter.limit))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(parties)
    }

    /// Updates details and renames the party's ledger account to match.
    pub async fn update(&self, company_id: &str, actor: &str, id: &str, input: &PartyUpdate) -> DbResult<Party> {
        let name = validate_name("name", &input.name, 120)?;
        let (gstin, state_code) = gstin_and_state(input.gstin.as_deref(), input.state_code)?;
        let contact = contact(&input.phone, &input.email)?;

        let mut tx = begin_write(&self.pool).await?;
        let before = get_in(&mut tx, company_id, id).await?;
        let is_active = input.is_active.unwrap_or(before.is_active);

        sqlx::query(
            r#"
            UPDATE parties
            SET name = ?1, gstin = ?2, state_code = ?3, phone = ?4, email = ?5, is_active = ?6
            WHERE company_id = ?7 AND id = ?8
            "#,
        )
        .bind(&name)
        .bind(&gstin)
        .bind(state_code)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(is_active)
        .bind(company_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE accounts SET name = ?1 WHERE company_id = ?2 AND id = ?3")
            .bind(&name)
            .bind(company_id)
            .bind(&before.account_id)
            .execute(&mut *tx)
            .await?;

        let after = get_in(&mut tx, company_id, id).await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "party.update",
            "party",
            id,
            &json!({ "before": before, "after": after }),
        )
        .await?;
        tx.commit().await?;

        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::setup;

    fn customer(name: &str, gstin: Option<&str>) -> NewParty {
        NewParty {
            kind: PartyKind::Customer,
            name: name.to_string(),
            gstin: gstin.map(str::to_string),
            state_code: if gstin.is_none() { Some(27) } else { None },
            phone: Some("+91 9820012345".to_string()),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_party_gets_ledger_account() {
        let (db, company, admin) = setup().await;
        let first = db.parties().create(&company.id, &admin.id, &customer("Kulkarni Hotels", None)).await.unwrap();
        let second = db
            .parties()
            .create(&company.id, &admin.id, &customer("Bangalore Foods", Some("29AAGCB7383J1Z4")))
            .await
            .unwrap();

        let first_ledger = db.accounts().get(&company.id, &first.account_id).await.unwrap();
        let second_ledger = db.accounts().get(&company.id, &second.account_id).await.unwrap();
        assert_eq!(first_ledger.code, "1200-0001");
        assert_eq!(second_ledger.code, "1200-0002");
        assert_eq!(second_ledger.party_id.as_deref(), Some(second.id.as_str()));
        assert_eq!(second.state_code, 29);

        let supplier = db
            .parties()
            .create(
                &company.id,
                &admin.id,
                &NewParty {
                    kind: PartyKind::Supplier,
                    ..customer("Chennai Mills", Some("33AAACH7409R1Z8"))
                },
            )
            .await
            .unwrap();
        let supplier_ledger = db.accounts().get(&company.id, &supplier.account_id).await.unwrap();
        assert_eq!(supplier_ledger.code, "2100-0001");
    }

    #[tokio::test]
    async fn test_invalid_gstin_writes_nothing() {
        let (db, company, admin) = setup().await;
        let result = db
            .parties()
            .create(&company.id, &admin.id, &customer("Bad Co", Some("27AAPFU0939F1ZA")))
            .await;
        assert!(result.is_err());
        assert!(db.parties().list(&company.id, &PartyFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_and_update() {
        let (db, company, admin) = setup().await;
        let party = db.parties().create(&company.id, &admin.id, &customer("Kulkarni Hotels", None)).await.unwrap();
        db.parties().create(&company.id, &admin.id, &customer("Joshi Caterers", None)).await.unwrap();

        let found = db
            .parties()
            .list(
                &company.id,
                &PartyFilter {
                    search: Some("kulkarni".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let updated = db
            .parties()
            .update(
                &company.id,
                &admin.id,
                &party.id,
                &PartyUpdate {
                    name: "Kulkarni Hotels Pvt Ltd".to_string(),
                    gstin: None,
                    state_code: Some(27),
                    phone: None,
                    email: Some("accounts@kulkarni.in".to_string()),
                    is_active: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Kulkarni Hotels Pvt Ltd");
        assert!(updated.is_active);
        let ledger = db.accounts().get(&company.id, &party.account_id).await.unwrap();
        assert_eq!(ledger.name, "Kulkarni Hotels Pvt Ltd");
    }
}
