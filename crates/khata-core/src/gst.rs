//! # GST Module
//!
//! Indian Goods & Services Tax: GSTIN validation and tax splitting.
//!
//! ## Which Tax Applies?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Seller state vs Place of supply                      │
//! │                                                                         │
//! │   same state (27 → 27)              different state (27 → 29)           │
//! │   ─────────────────────             ─────────────────────────           │
//! │   IntraState                        InterState                          │
//! │   CGST = taxable × rate / 2         IGST = taxable × rate               │
//! │   SGST = taxable × rate / 2                                             │
//! │                                                                         │
//! │   ₹1000 @ 18% → CGST 90 + SGST 90   ₹1000 @ 18% → IGST 180              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each half is rounded on its own, so an intra-state total can differ
//! from the inter-state total by one paisa. That matches how the halves
//! are reported separately in returns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, BPS_SCALE};
use crate::types::TaxRate;

/// Standard GST slabs in basis points.
pub const GST_SLABS_BPS: &[u32] = &[
    0, 10, 25, 100, 150, 300, 500, 600, 750, 1200, 1800, 2800, 4000,
];

/// Returns true when `rate` is one of the notified GST slabs.
pub fn is_standard_slab(rate: TaxRate) -> bool {
    GST_SLABS_BPS.contains(&rate.bps())
}

const GSTIN_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// =============================================================================
// State Code
// =============================================================================

/// Two-digit GST state code (01 Jammu & Kashmir … 38 Ladakh, 97 Other
/// Territory, 99 Centre Jurisdiction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StateCode(u8);

impl StateCode {
    /// Validates and wraps a state code.
    pub fn new(code: u8) -> Result<Self, ValidationError> {
        if (1..=38).contains(&code) || code == 97 || code == 99 {
            Ok(StateCode(code))
        } else {
            Err(ValidationError::OutOfRange {
                field: "state_code".to_string(),
                min: 1,
                max: 38,
            })
        }
    }

    #[inline]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

// =============================================================================
// GSTIN
// =============================================================================

/// A validated 15-character GST identification number.
///
/// ## Layout
/// ```text
///  27  AAPFU0939F  1  Z  V
///  ──  ──────────  ─  ─  ─
///  │   │           │  │  └── check character (mod 36)
///  │   │           │  └───── always 'Z'
///  │   │           └──────── entity number within the PAN
///  │   └──────────────────── PAN
///  └──────────────────────── state code
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(try_from = "String", into = "String")]
pub struct Gstin(String);

impl Gstin {
    /// Parses a GSTIN, normalising to upper case.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::gst::Gstin;
    ///
    /// let gstin = Gstin::parse("27aapfu0939f1zv").unwrap();
    /// assert_eq!(gstin.state_code().value(), 27);
    /// assert_eq!(gstin.pan(), "AAPFU0939F");
    /// assert!(Gstin::parse("27AAPFU0939F1ZA").is_err()); // bad checksum
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let value = raw.trim().to_ascii_uppercase();
        let bytes = value.as_bytes();

        if bytes.len() != 15 {
            return Err(ValidationError::invalid_format(
                "gstin",
                "must be exactly 15 characters",
            ));
        }
        if !bytes.iter().all(|b| GSTIN_CHARSET.contains(b)) {
            return Err(ValidationError::invalid_format(
                "gstin",
                "must contain only letters and digits",
            ));
        }

        let state = value[0..2]
            .parse::<u8>()
            .map_err(|_| ValidationError::invalid_format("gstin", "must start with a state code"))?;
        StateCode::new(state)
            .map_err(|_| ValidationError::invalid_format("gstin", "unknown state code"))?;

        let pan_ok = bytes[2..7].iter().all(u8::is_ascii_uppercase)
            && bytes[7..11].iter().all(u8::is_ascii_digit)
            && bytes[11].is_ascii_uppercase();
        if !pan_ok {
            return Err(ValidationError::invalid_format(
                "gstin",
                "characters 3-12 must be a PAN",
            ));
        }

        if bytes[12] == b'0' {
            return Err(ValidationError::invalid_format(
                "gstin",
                "entity number cannot be 0",
            ));
        }

        if bytes[13] != b'Z' {
            return Err(ValidationError::invalid_format(
                "gstin",
                "14th character must be Z",
            ));
        }

        if gstin_check_char(&bytes[..14]) != bytes[14] {
            return Err(ValidationError::invalid_format("gstin", "checksum mismatch"));
        }

        Ok(Gstin(value))
    }

    /// State code embedded in the first two characters.
    pub fn state_code(&self) -> StateCode {
        // Checked in parse().
        StateCode(self.0[0..2].parse().unwrap_or_default())
    }

    /// The PAN embedded in characters 3-12.
    pub fn pan(&self) -> &str {
        &self.0[2..12]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Computes the GSTIN check character over the first 14 characters.
///
/// Each character's index in `0-9A-Z` is multiplied by 1 or 2 (alternating,
/// starting with 1); the quotient and remainder of each product by 36 are
/// summed, and the check value is `(36 - sum % 36) % 36`.
fn gstin_check_char(body: &[u8]) -> u8 {
    let sum: usize = body
        .iter()
        .enumerate()
        .map(|(idx, ch)| {
            let value = GSTIN_CHARSET.iter().position(|c| c == ch).unwrap_or(0);
            let product = value * if idx % 2 == 0 { 1 } else { 2 };
            product / 36 + product % 36
        })
        .sum();
    GSTIN_CHARSET[(36 - sum % 36) % 36]
}

impl TryFrom<String> for Gstin {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Gstin::parse(&value)
    }
}

impl From<Gstin> for String {
    fn from(value: Gstin) -> Self {
        value.0
    }
}

impl fmt::Display for Gstin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Supply Type
// =============================================================================

/// Intra-state or inter-state supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SupplyType {
    IntraState,
    InterState,
}

impl SupplyType {
    /// Determines the supply type from the seller's state and the place of
    /// supply.
    pub fn between(seller: u8, place_of_supply: u8) -> Self {
        if seller == place_of_supply {
            SupplyType::IntraState
        } else {
            SupplyType::InterState
        }
    }
}

// =============================================================================
// GST Breakup
// =============================================================================

/// Taxable value and its GST components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GstBreakup {
    pub taxable: Money,
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
}

impl GstBreakup {
    /// Computes GST on a taxable value.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::gst::{GstBreakup, SupplyType};
    /// use khata_core::money::Money;
    /// use khata_core::types::TaxRate;
    ///
    /// let inter = GstBreakup::compute(Money::from_paise(100_000), TaxRate::from_percent(18), SupplyType::InterState);
    /// assert_eq!(inter.igst.paise(), 18_000);
    /// assert_eq!(inter.total_tax().paise(), 18_000);
    /// ```
    pub fn compute(taxable: Money, rate: TaxRate, supply: SupplyType) -> Self {
        let bps = i64::from(rate.bps());
        match supply {
            SupplyType::IntraState => {
                let half = taxable.percentage(bps, BPS_SCALE * 2);
                GstBreakup {
                    taxable,
                    cgst: half,
                    sgst: half,
                    igst: Money::zero(),
                }
            }
            SupplyType::InterState => GstBreakup {
                taxable,
                cgst: Money::zero(),
                sgst: Money::zero(),
                igst: taxable.percentage(bps, BPS_SCALE),
            },
        }
    }

    /// CGST + SGST + IGST.
    pub fn total_tax(&self) -> Money {
        self.cgst + self.sgst + self.igst
    }

    /// Taxable value plus tax.
    pub fn gross(&self) -> Money {
        self.taxable + self.total_tax()
    }
}

impl Add for GstBreakup {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        GstBreakup {
            taxable: self.taxable + other.taxable,
            cgst: self.cgst + other.cgst,
            sgst: self.sgst + other.sgst,
            igst: self.igst + other.igst,
        }
    }
}

impl AddAssign for GstBreakup {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Extracts the taxable value from a tax-inclusive amount.
///
/// ## Example
/// ```rust
/// use khata_core::gst::taxable_from_inclusive;
/// use khata_core::money::Money;
/// use khata_core::types::TaxRate;
///
/// // ₹118.00 including 18% GST → ₹100.00 taxable
/// let taxable = taxable_from_inclusive(Money::from_paise(11_800), TaxRate::from_percent(18));
/// assert_eq!(taxable.paise(), 10_000);
/// ```
pub fn taxable_from_inclusive(gross: Money, rate: TaxRate) -> Money {
    gross.percentage(BPS_SCALE, BPS_SCALE + i64::from(rate.bps()))
}

// =============================================================================
// HSN Summary
// =============================================================================

/// One row of the HSN-wise summary reported in GSTR-1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HsnSummaryRow {
    pub hsn_code: String,
    pub tax_rate: TaxRate,
    pub quantity: i64,
    pub gst: GstBreakup,
}

/// A line contributing to the HSN summary.
#[derive(Debug, Clone)]
pub struct HsnLine<'a> {
    pub hsn_code: Option<&'a str>,
    pub tax_rate: TaxRate,
    pub quantity: i64,
    pub gst: GstBreakup,
}

/// Groups lines by (HSN, rate). Lines without an HSN code are reported
/// under `"NA"`. Rows come back sorted by HSN then rate.
pub fn summarize_by_hsn<'a>(lines: impl IntoIterator<Item = HsnLine<'a>>) -> Vec<HsnSummaryRow> {
    let mut groups: BTreeMap<(String, TaxRate), (i64, GstBreakup)> = BTreeMap::new();

    for line in lines {
        let key = (line.hsn_code.unwrap_or("NA").to_string(), line.tax_rate);
        let entry = groups.entry(key).or_default();
        entry.0 += line.quantity;
        entry.1 += line.gst;
    }

    groups
        .into_iter()
        .map(|((hsn_code, tax_rate), (quantity, gst))| HsnSummaryRow {
            hsn_code,
            tax_rate,
            quantity,
            gst,
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
