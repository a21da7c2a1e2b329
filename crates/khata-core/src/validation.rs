//! # Validation Module
//!
//! Field validation shared by the API handlers and repositories.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP request (serde)                                          │
//! │  └── Shape and types (missing fields, wrong JSON types)                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── Field rules (lengths, ranges, formats, GST slabs)                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Domain types (JournalDraft::validate, Gstin::parse)           │
//! │  └── Business rules (balance, checksums, states)                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite                                                        │
//! │  └── NOT NULL, UNIQUE, FOREIGN KEY, CHECK                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use khata_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("RICE-5KG").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::gst::is_standard_slab;
use crate::types::TaxRate;
use crate::{MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY, MAX_UNIT_PRICE_PAISE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a non-empty, length-limited text field and returns it trimmed.
///
/// ## Example
/// ```rust
/// use khata_core::validation::validate_name;
///
/// assert_eq!(validate_name("name", "  Sharma Traders ", 200).unwrap(), "Sharma Traders");
/// assert!(validate_name("name", "   ", 200).is_err());
/// ```
pub fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, digits, hyphens and underscores
///
/// ## Example
/// ```rust
/// use khata_core::validation::validate_sku;
///
/// assert!(validate_sku("RICE-5KG").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = validate_name("sku", sku, 50)?;

    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid_format(
            "sku",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates an HSN or SAC code: 4, 6 or 8 digits.
pub fn validate_hsn(code: &str) -> ValidationResult<()> {
    let code = code.trim();
    let len_ok = matches!(code.len(), 4 | 6 | 8);
    if !len_ok || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid_format(
            "hsn_code",
            "must be 4, 6 or 8 digits",
        ));
    }
    Ok(())
}

/// Loose e-mail check: one `@` with text on both sides and a dot in the
/// domain.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if !valid {
        return Err(ValidationError::invalid_format("email", "not an e-mail address"));
    }
    Ok(())
}

/// Indian mobile numbers: 10 digits, optionally prefixed with `+91`.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();
    let digits = phone.strip_prefix("+91").unwrap_or(phone).trim();
    if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid_format("phone", "must be 10 digits"));
    }
    Ok(())
}

/// Passwords must be at least 8 characters.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < 8 {
        return Err(ValidationError::OutOfRange {
            field: "password length".to_string(),
            min: 8,
            max: 128,
        });
    }
    if password.chars().count() > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Invoice: Add Line                                                      │
/// │                                                                         │
/// │  User enters quantity: 5                                                │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                   │
/// │       │                                                                 │
/// │       ├── qty <= 0?      → "quantity must be positive"                  │
/// │       ├── qty > 99,999?  → "quantity must be between 1 and 99999"       │
/// │       └── OK → compute_document                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in paise. Zero is allowed (free items); the ceiling
/// is [`MAX_UNIT_PRICE_PAISE`].
///
/// ## Example
/// ```rust
/// use khata_core::validation::validate_price_paise;
///
/// assert!(validate_price_paise(1099).is_ok());
/// assert!(validate_price_paise(0).is_ok());
/// assert!(validate_price_paise(-100).is_err());
/// assert!(validate_price_paise(i64::MAX).is_err());
/// ```
pub fn validate_price_paise(paise: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_PAISE).contains(&paise) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_PAISE,
        });
    }

    Ok(())
}

/// Validates a payment amount in paise. Must be positive.
pub fn validate_payment_amount(paise: i64) -> ValidationResult<()> {
    if paise <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a GST rate: must be one of the notified slabs.
pub fn validate_gst_rate(rate: TaxRate) -> ValidationResult<()> {
    if !is_standard_slab(rate) {
        return Err(ValidationError::NotAllowed {
            field: "tax_rate".to_string(),
            allowed: crate::gst::GST_SLABS_BPS
                .iter()
                .map(|bps| TaxRate::from_bps(*bps).to_string())
                .collect(),
        });
    }
    Ok(())
}

/// Validates a percentage in basis points (0 to 100%).
pub fn validate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a GST state code.
pub fn validate_state_code(code: u8) -> ValidationResult<()> {
    crate::gst::StateCode::new(code).map(|_| ())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on a document.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if lines > MAX_DOCUMENT_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_DOCUMENT_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ## Example
/// ```rust
/// use khata_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id)
        .map_err(|_| ValidationError::invalid_format("id", "must be a valid UUID"))?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("RICE-5KG").is_ok());
        assert!(validate_sku("ABC123").is_ok());
        assert!(validate_sku("item_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(99_999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(100_000).is_err());
    }

    #[test]
    fn test_validate_price_ceiling() {
        assert!(validate_price_paise(0).is_ok());
        assert!(validate_price_paise(MAX_UNIT_PRICE_PAISE).is_ok());

        assert!(validate_price_paise(-1).is_err());
        assert!(matches!(
            validate_price_paise(MAX_UNIT_PRICE_PAISE + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_hsn() {
        assert!(validate_hsn("1006").is_ok());
        assert!(validate_hsn("998314").is_ok());
        assert!(validate_hsn("10063010").is_ok());
        assert!(validate_hsn("100").is_err());
        assert!(validate_hsn("10A6").is_err());
    }

    #[test]
    fn test_validate_contact_fields() {
        assert!(validate_email("owner@sharma.in").is_ok());
        assert!(validate_email("owner@").is_err());
        assert!(validate_email("no-at-sign.in").is_err());
        assert!(validate_phone("+91 9876543210").is_ok());
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("98765").is_err());
    }

    #[test]
    fn test_validate_gst_rate() {
        assert!(validate_gst_rate(TaxRate::from_percent(18)).is_ok());
        assert!(validate_gst_rate(TaxRate::zero()).is_ok());
        let err = validate_gst_rate(TaxRate::from_percent(17)).unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { .. }));
    }

    #[test]
    fn test_validate_line_count() {
        assert!(validate_line_count(1).is_ok());
        assert!(validate_line_count(0).is_err());
        assert!(validate_line_count(MAX_DOCUMENT_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
