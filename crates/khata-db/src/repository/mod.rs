//! # Repository Module
//!
//! Database repository implementations for Khata.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  axum handler                                                           │
//! │       │  db.documents().post(&company_id, &user_id, &id)                │
//! │       ▼                                                                 │
//! │  DocumentRepository                                                     │
//! │       │  BEGIN IMMEDIATE                                                │
//! │       │   ├── numbering::next_number(conn, …)      INV/2025-26/0001     │
//! │       │   ├── journal::post_in(conn, …)            Dr party / Cr sales  │
//! │       │   ├── item::apply_movement(conn, …)        stock −qty           │
//! │       │   └── audit::record(conn, …)               audit_log row        │
//! │       │  COMMIT                                                         │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories hold a pool handle and open their own transactions with
//! [`begin_write`], which takes SQLite's write lock up front.
//! Functions that take `conn: &mut SqliteConnection` run inside a caller's
//! transaction and are how one repository reuses another's writes.
//!
//! Every query filters on `company_id`: a row from another tenant reads as
//! not found.

pub mod account;
pub mod audit;
pub mod company;
pub mod discount;
pub mod document;
pub mod financial_year;
pub mod item;
pub mod journal;
pub mod loyalty;
pub mod numbering;
pub mod party;
pub mod pos;
pub mod report;
pub mod user;

use khata_core::CoreError;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Opens a write transaction holding the database write lock from the start.
///
/// A deferred `BEGIN` that reads first and writes later must upgrade its lock
/// mid-transaction, and under WAL that upgrade fails with `SQLITE_BUSY`
/// without waiting when another writer got there first.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// New UUID v4 primary key.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Clamps a caller-supplied page size.
pub(crate) fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(100).clamp(1, 500)
}

/// An operation refused because of the entity's current state.
pub(crate) fn refused(entity: &str, id: &str, status: &str, operation: &str) -> DbError {
    CoreError::InvalidStatus {
        entity: entity.to_string(),
        id: id.to_string(),
        status: status.to_string(),
        operation: operation.to_string(),
    }
    .into()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures: a migrated in-memory database with one company.

    use chrono::NaiveDate;
    use khata_core::loyalty::{LoyaltyProgram, LoyaltyTier};
    use khata_core::rbac::User;
    use khata_core::{Company, Item, Money, Party, PartyKind, TaxRate};

    use super::company::CompanySignup;
    use super::item::NewItem;
    use super::party::NewParty;
    use crate::{Database, DbConfig};

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Signup day; the company's first financial year is 2025-26.
    pub fn signup_day() -> NaiveDate {
        date(2025, 6, 15)
    }

    pub async fn setup() -> (Database, Company, User) {
        setup_on(DbConfig::in_memory()).await
    }

    pub async fn setup_on(config: DbConfig) -> (Database, Company, User) {
        let db = Database::new(config).await.unwrap();
        let (company, admin) = db
            .companies()
            .signup(
                &CompanySignup {
                    name: "Sharma Traders".to_string(),
                    gstin: Some("27AAPFU0939F1ZV".to_string()),
                    state_code: None,
                    admin_username: "owner".to_string(),
                    admin_full_name: "Ravi Sharma".to_string(),
                    admin_email: None,
                },
                "argon2-hash-placeholder",
                signup_day(),
            )
            .await
            .unwrap();
        (db, company, admin)
    }

    /// Basmati rice at ₹650.00 plus 5% GST.
    pub fn rice(opening_stock: i64) -> NewItem {
        NewItem {
            sku: "rice-5kg".to_string(),
            name: "Basmati Rice 5kg".to_string(),
            hsn_code: Some("1006".to_string()),
            unit: "NOS".to_string(),
            sale_price: Money::from_paise(65_000),
            purchase_price: Money::from_paise(52_000),
            tax_rate: TaxRate::from_percent(5),
            track_inventory: true,
            allow_negative_stock: false,
            opening_stock,
        }
    }

    pub async fn stocked_item(db: &Database, company: &Company, admin: &User, opening_stock: i64) -> Item {
        db.items().create(&company.id, &admin.id, &rice(opening_stock)).await.unwrap()
    }

    /// A party in Maharashtra (intra-state) or, with a GSTIN, wherever the
    /// GSTIN is registered.
    pub async fn party(db: &Database, company: &Company, admin: &User, kind: PartyKind, gstin: Option<&str>) -> Party {
        let input = NewParty {
            kind,
            name: match kind {
                PartyKind::Customer => "Kulkarni Hotels".to_string(),
                PartyKind::Supplier => "Deccan Rice Mills".to_string(),
            },
            gstin: gstin.map(str::to_string),
            state_code: if gstin.is_none() { Some(27) } else { None },
            phone: None,
            email: None,
        };
        db.parties().create(&company.id, &admin.id, &input).await.unwrap()
    }

    /// 1 point per ₹100, worth ₹1 each; Gold from 1,000 lifetime points.
    pub fn gold_program() -> LoyaltyProgram {
        LoyaltyProgram {
            earn_points_per_100: 1,
            point_value_paise: 100,
            min_redeem_points: 10,
            max_redeem_bps: 5_000,
            is_active: true,
            tiers: vec![LoyaltyTier {
                name: "Gold".to_string(),
                min_lifetime_points: 1_000,
                multiplier_bps: 15_000,
            }],
        }
    }
}
