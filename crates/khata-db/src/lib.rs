//! # khata-db: Database Layer for Khata ERP
//!
//! This crate provides database access for Khata. It uses SQLite with sqlx
//! for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Khata Data Flow                                  │
//! │                                                                         │
//! │  axum handler (POST /sales-invoices/{id}/post)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     khata-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ DocumentRepo  │    │ 001_init.sql │   │   │
//! │  │   │ SqlitePool    │◄───│ JournalRepo   │    │              │   │   │
//! │  │   │               │    │ PosRepo  ...  │    │              │   │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘   │   │
//! │  │                                │                               │   │
//! │  │           one transaction: journal + stock + audit              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (khata.db)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations, one per aggregate
//!
//! ## Usage
//!
//! ```rust,ignore
//! use khata_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./khata.db")).await?;
//! let invoice = db.documents().post(&company_id, &user_id, &invoice_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::audit::AuditRepository;
pub use repository::company::CompanyRepository;
pub use repository::discount::DiscountRepository;
pub use repository::document::DocumentRepository;
pub use repository::financial_year::FinancialYearRepository;
pub use repository::item::ItemRepository;
pub use repository::journal::JournalRepository;
pub use repository::loyalty::LoyaltyRepository;
pub use repository::party::PartyRepository;
pub use repository::pos::PosRepository;
pub use repository::report::ReportRepository;
pub use repository::user::{RoleRepository, UserRepository};
