//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Khata                                  │
//! │                                                                         │
//! │  Client                      Rust Backend                               │
//! │  ──────                      ────────────                               │
//! │                                                                         │
//! │  POST /sales-invoices/{id}/post                                         │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Handler                                                         │  │
//! │  │  Result<Json<T>, ApiError>                                       │  │
//! │  │         │                                                        │  │
//! │  │  DbError::NotFound ───────────────────────────► 404              │  │
//! │  │  DbError::Domain(CoreError::InsufficientStock) ► 400             │  │
//! │  │  CoreError::PermissionDenied ─────────────────► 403              │  │
//! │  │  DbError::QueryFailed ── logged ──────────────► 500 (generic)    │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock ..." }  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use khata_core::CoreError;
use khata_db::DbError;
use serde::Serialize;
use tracing::error;

/// Error body returned by every failing request.
///
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "Item not found: 6c1f..."
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Business rule violated (400)
    BusinessRule,

    /// Debits and credits disagree (400)
    UnbalancedEntry,

    /// Posting date falls in a closed or missing year (400)
    FinancialYear,

    /// Not enough stock to sell (400)
    InsufficientStock,

    /// Tender or settlement amount rejected (400)
    PaymentError,

    /// Missing or invalid token, bad credentials (401)
    Unauthorized,

    /// Permission not granted (403)
    Forbidden,

    /// Duplicate key (409)
    Conflict,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError
            | ErrorCode::BusinessRule
            | ErrorCode::UnbalancedEntry
            | ErrorCode::FinancialYear
            | ErrorCode::InsufficientStock
            | ErrorCode::PaymentError => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Forbidden, message)
    }

    /// Logs the detail and returns a message safe to show.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal error");
        ApiError::new(ErrorCode::Internal, "Internal server error")
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => {
                ApiError::new(ErrorCode::Conflict, format!("{} '{}' already exists", field, value))
            }
            DbError::Domain(core) => ApiError::from(core),
            DbError::ForeignKeyViolation { message } => {
                error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::ConnectionFailed(e) => {
                error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                error!("Database migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::PoolExhausted => ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted"),
            DbError::Internal(e) => {
                error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::UnbalancedEntry { .. } => ErrorCode::UnbalancedEntry,
            CoreError::FinancialYearClosed { .. }
            | CoreError::DateOutsideFinancialYear { .. }
            | CoreError::OverlappingFinancialYear { .. } => ErrorCode::FinancialYear,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::Overpayment { .. } | CoreError::InvalidTender { .. } => ErrorCode::PaymentError,
            CoreError::PermissionDenied(_) => ErrorCode::Forbidden,
            CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::MissingSystemAccount(_) => {
                error!(error = %err, "Chart of accounts is incomplete");
                ErrorCode::Internal
            }
            CoreError::IncompleteEntry { .. }
            | CoreError::InvalidJournalLine { .. }
            | CoreError::InvalidStatus { .. }
            | CoreError::DiscountNotApplicable { .. }
            | CoreError::LoyaltyRedemption { .. }
            | CoreError::SessionNotOpen(_) => ErrorCode::BusinessRule,
        };
        let message = match &err {
            CoreError::Validation(inner) => inner.to_string(),
            _ => err.to_string(),
        };
        ApiError::new(code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use khata_core::{Money, ValidationError};

    #[test]
    fn test_domain_errors_are_bad_requests() {
        let err: ApiError = DbError::Domain(CoreError::UnbalancedEntry {
            debit: Money::from_paise(100),
            credit: Money::from_paise(90),
        })
        .into();
        assert_eq!(err.code, ErrorCode::UnbalancedEntry);
        assert_eq!(err.code.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_validation_message_is_unwrapped() {
        let err: ApiError = DbError::from(ValidationError::Required {
            field: "name".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.message, "name is required");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(DbError::not_found("Item", "x")).code.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(DbError::duplicate("sku", "RICE")).code.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(CoreError::PermissionDenied("sales.invoice.post".to_string())).code.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err: ApiError = DbError::QueryFailed("no such table: documents".to_string()).into();
        assert_eq!(err.code.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("documents"));
    }
}
