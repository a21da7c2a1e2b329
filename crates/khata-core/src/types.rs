//! # Domain Types
//!
//! Shared entity types used throughout Khata.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Company      │   │     Party       │   │      Item       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  gstin          │◄──│  company_id     │   │  sku (business) │       │
//! │  │  state_code     │   │  kind           │   │  hsn_code       │       │
//! │  └─────────────────┘   │  account_id     │   │  tax_rate (bps) │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │  PaymentMethod  │   │ StockMovement   │       │
//! │  │  bps (u32)      │   │  Cash / Card    │   │  signed qty     │       │
//! │  │  1800 = 18%     │   │  Upi / Bank     │   │  reason         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Multi-Tenancy
//! Every persisted entity carries `company_id`; repositories always filter
//! by it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18% (the most common GST slab), 25 bps = 0.25% (rough
/// diamonds). Every GST slab is a whole number of basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a whole percentage.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        TaxRate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

impl std::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 % 100 == 0 {
            write!(f, "{}%", self.0 / 100)
        } else {
            write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
        }
    }
}

/// How entered prices relate to tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    /// Price excludes GST; tax is added on top (B2B invoices).
    #[default]
    Exclusive,
    /// Price includes GST (MRP at the retail counter).
    Inclusive,
}

// =============================================================================
// Company
// =============================================================================

/// A tenant. Every other row belongs to exactly one company.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Company {
    pub id: String,
    pub name: String,
    /// GSTIN of the registered business, if registered.
    pub gstin: Option<String>,
    /// GST state code of the principal place of business (e.g. 27 = Maharashtra).
    pub state_code: u8,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Party (Customer / Supplier)
// =============================================================================

/// Whether a party buys from us or sells to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Customer,
    Supplier,
}

/// A customer or supplier. Each party owns a ledger account so that
/// receivables and payables are tracked per party.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Party {
    pub id: String,
    pub company_id: String,
    pub kind: PartyKind,
    pub name: String,
    pub gstin: Option<String>,
    /// Place of supply for invoices to this party.
    pub state_code: u8,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Ledger account holding this party's balance.
    pub account_id: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Item
// =============================================================================

/// A stock or service item that can be bought and sold.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Item {
    pub id: String,
    pub company_id: String,
    /// Stock Keeping Unit - business identifier.
    pub sku: String,
    pub name: String,
    /// HSN (goods) or SAC (services) code for GST returns.
    pub hsn_code: Option<String>,
    /// Unit quantity code, e.g. "NOS", "KGS".
    pub unit: String,
    pub sale_price: Money,
    pub purchase_price: Money,
    pub tax_rate: TaxRate,
    /// Whether stock is tracked for this item.
    pub track_inventory: bool,
    /// Allow selling when stock is zero or negative.
    pub allow_negative_stock: bool,
    pub current_stock: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Checks if the item can be sold (in stock or doesn't track inventory).
    pub fn can_sell(&self, quantity: i64) -> bool {
        if !self.track_inventory {
            return true;
        }

        if self.current_stock >= quantity {
            return true;
        }

        self.allow_negative_stock
    }
}

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    Sale,
    Purchase,
    PosSale,
    Cancellation,
    Adjustment,
}

/// A signed change to an item's stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub company_id: String,
    pub item_id: String,
    /// Positive adds stock, negative removes it.
    pub quantity: i64,
    pub reason: StockReason,
    /// Document that caused the movement, if any.
    pub reference_id: Option<String>,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

/// How money changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; the only method that can produce change.
    Cash,
    /// Card on an external terminal.
    Card,
    /// UPI transfer.
    Upi,
    /// NEFT / RTGS / cheque.
    BankTransfer,
}

impl PaymentMethod {
    /// Cash lands in the cash account; everything else in the bank account.
    #[inline]
    pub const fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(track: bool, stock: i64, allow_negative: bool) -> Item {
        let now = Utc::now();
        Item {
            id: "item-1".to_string(),
            company_id: "co-1".to_string(),
            sku: "RICE-5KG".to_string(),
            name: "Basmati Rice 5kg".to_string(),
            hsn_code: Some("1006".to_string()),
            unit: "NOS".to_string(),
            sale_price: Money::from_paise(65_000),
            purchase_price: Money::from_paise(52_000),
            tax_rate: TaxRate::from_percent(5),
            track_inventory: track,
            allow_negative_stock: allow_negative,
            current_stock: stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_tax_rate_display() {
        assert_eq!(TaxRate::from_percent(18).to_string(), "18%");
        assert_eq!(TaxRate::from_bps(25).to_string(), "0.25%");
        assert_eq!(TaxRate::from_bps(150).to_string(), "1.50%");
    }

    #[test]
    fn test_can_sell() {
        assert!(sample_item(false, 0, false).can_sell(10));
        assert!(sample_item(true, 10, false).can_sell(10));
        assert!(!sample_item(true, 3, false).can_sell(5));
        assert!(sample_item(true, 3, true).can_sell(5));
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
        assert_eq!(serde_json::to_string(&TaxMode::default()).unwrap(), "\"exclusive\"");
    }
}
