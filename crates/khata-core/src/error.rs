//! # Error Types
//!
//! Domain-specific error types for khata-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  khata-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  khata-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  API errors (in app)                                                   │
//! │  └── ApiError         - What HTTP clients see (serialized)             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is a rule the client broke; the API maps all of them to
/// HTTP 400 except [`CoreError::PermissionDenied`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Debits and credits of a journal entry do not match.
    ///
    /// ## User Workflow
    /// ```text
    /// POST /journals  { Dr Cash 1000, Cr Sales 900 }
    ///      │
    ///      ▼
    /// JournalDraft::validate()
    ///      │
    ///      ▼
    /// UnbalancedEntry { debit: ₹1000.00, credit: ₹900.00 }
    /// ```
    #[error("Journal entry is unbalanced: debits {debit}, credits {credit}")]
    UnbalancedEntry { debit: Money, credit: Money },

    /// Journal entry has too few lines, or lacks a debit or a credit side.
    #[error("Journal entry is incomplete: {reason}")]
    IncompleteEntry { reason: String },

    /// A journal line carries an amount on both sides, on neither, or a
    /// negative amount.
    #[error("Journal line {line} is invalid: {reason}")]
    InvalidJournalLine { line: usize, reason: String },

    /// The financial year covering the date is closed.
    #[error("Financial year {name} is closed")]
    FinancialYearClosed { name: String },

    /// No open financial year covers the date.
    #[error("No financial year covers {date}")]
    DateOutsideFinancialYear { date: NaiveDate },

    /// A new financial year overlaps an existing one.
    #[error("Financial year overlaps existing year {name}")]
    OverlappingFinancialYear { name: String },

    /// Document is not in a state that allows the requested operation.
    #[error("{entity} {id} is {status}, cannot {operation}")]
    InvalidStatus {
        entity: String,
        id: String,
        status: String,
        operation: String,
    },

    /// Insufficient stock to complete a sale.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Settlement amount exceeds what is outstanding.
    #[error("Amount {amount} exceeds outstanding {outstanding}")]
    Overpayment { amount: Money, outstanding: Money },

    /// Tenders do not cover the bill, or a non-cash tender overpays.
    #[error("Invalid tender: {reason}")]
    InvalidTender { reason: String },

    /// A discount rule or coupon cannot be applied.
    #[error("Discount not applicable: {reason}")]
    DiscountNotApplicable { reason: String },

    /// Loyalty redemption is not possible.
    #[error("Loyalty redemption rejected: {reason}")]
    LoyaltyRedemption { reason: String },

    /// POS session is not open.
    #[error("POS session {0} is not open")]
    SessionNotOpen(String),

    /// The acting user lacks a permission.
    #[error("Permission denied: {0} required")]
    PermissionDenied(String),

    /// A system account needed for posting is missing from the chart.
    #[error("Missing system account: {0}")]
    MissingSystemAccount(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidStatus error.
    pub fn invalid_status(
        entity: impl Into<String>,
        id: impl Into<String>,
        status: impl std::fmt::Debug,
        operation: impl Into<String>,
    ) -> Self {
        CoreError::InvalidStatus {
            entity: entity.into(),
            id: id.into(),
            status: format!("{:?}", status).to_lowercase(),
            operation: operation.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid GSTIN).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidFormat`].
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_message() {
        let err = CoreError::UnbalancedEntry {
            debit: Money::from_paise(100_000),
            credit: Money::from_paise(90_000),
        };
        assert_eq!(
            err.to_string(),
            "Journal entry is unbalanced: debits ₹1000.00, credits ₹900.00"
        );
    }

    #[test]
    fn test_invalid_status_lowercases() {
        #[derive(Debug)]
        enum S {
            Posted,
        }
        let err = CoreError::invalid_status("Invoice", "inv-1", S::Posted, "edit");
        assert_eq!(err.to_string(), "Invoice inv-1 is posted, cannot edit");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
