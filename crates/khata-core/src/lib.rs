//! # khata-core: Pure Business Logic for Khata ERP
//!
//! This crate is the **heart** of Khata. It contains all business rules
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Khata ERP Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    REST API (axum)                              │   │
//! │  │    validate ──► check permission ──► call db ──► serialize      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ khata-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐           │   │
//! │  │   │  money  │  │   gst   │  │ journal │  │ posting │           │   │
//! │  │   └─────────┘  └─────────┘  └─────────┘  └─────────┘           │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐           │   │
//! │  │   │document │  │discount │  │ loyalty │  │   pos   │           │   │
//! │  │   └─────────┘  └─────────┘  └─────────┘  └─────────┘           │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    khata-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer paise arithmetic
//! - [`gst`] - GSTIN validation and CGST/SGST/IGST splitting
//! - [`journal`] - Double-entry journal drafts and balance validation
//! - [`ledger`] - Accounts, chart of accounts, trial balance, P&L
//! - [`financial_year`] - Fiscal periods and posting-date checks
//! - [`document`] - Sales invoice / purchase bill computation
//! - [`posting`] - Turning documents into balanced journal entries
//! - [`discount`] - Discount rules and coupons
//! - [`loyalty`] - Loyalty points earning and redemption
//! - [`pos`] - POS sessions and tender settlement
//! - [`rbac`] - Permission strings and roles
//! - [`types`] - Shared entity types (company, party, item, ...)
//! - [`validation`] - Field validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use khata_core::gst::{GstBreakup, SupplyType};
//! use khata_core::money::Money;
//! use khata_core::types::TaxRate;
//!
//! // ₹1,000.00 at 18% GST inside one state
//! let gst = GstBreakup::compute(
//!     Money::from_paise(100_000),
//!     TaxRate::from_bps(1800),
//!     SupplyType::IntraState,
//! );
//! assert_eq!(gst.cgst.paise(), 9_000);
//! assert_eq!(gst.sgst.paise(), 9_000);
//! assert!(gst.igst.is_zero());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod discount;
pub mod document;
pub mod error;
pub mod financial_year;
pub mod gst;
pub mod journal;
pub mod ledger;
pub mod loyalty;
pub mod money;
pub mod pos;
pub mod posting;
pub mod rbac;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency every company books in.
pub const BASE_CURRENCY: &str = "INR";

/// Maximum lines on a single journal entry.
pub const MAX_JOURNAL_LINES: usize = 500;

/// Maximum lines on a sales invoice, purchase bill or POS bill.
pub const MAX_DOCUMENT_LINES: usize = 200;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typing 100000 instead of 100 at the counter.
pub const MAX_LINE_QUANTITY: i64 = 99_999;

/// Highest unit price accepted anywhere (₹10 crore).
///
/// Together with [`MAX_LINE_QUANTITY`] and [`MAX_DOCUMENT_LINES`] this keeps
/// every bill total far inside `i64` paise.
pub const MAX_UNIT_PRICE_PAISE: i64 = 10_000_000_000;
