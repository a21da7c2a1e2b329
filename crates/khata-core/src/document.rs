//! # Document Module
//!
//! Computes sales invoices, purchase bills and POS bills from their lines.
//!
//! ## Line Computation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  unit_price × quantity                       = gross                    │
//! │  gross × discount_bps / 10000                = line discount            │
//! │  gross − line discount                       = net                      │
//! │  extra discount × net / Σ net  (largest rem.) = share of extra discount │
//! │  net − share                                 = amount                   │
//! │                                                                         │
//! │  Exclusive: taxable = amount, tax added on top                          │
//! │  Inclusive: taxable = amount × 10000 / (10000 + bps), tax inside        │
//! │                                                                         │
//! │  GstBreakup::compute(taxable, rate, supply)  = CGST/SGST or IGST        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every amount is computed per line and the document totals are plain
//! sums of line values, so header and lines always agree.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::gst::{taxable_from_inclusive, GstBreakup, HsnLine, SupplyType};
use crate::money::Money;
use crate::types::{TaxMode, TaxRate};
use crate::validation::{validate_bps, validate_line_count, validate_price_paise, validate_quantity};

// =============================================================================
// Input
// =============================================================================

/// One line as entered by the user.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineInput {
    #[serde(default)]
    pub item_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub hsn_code: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    /// Line discount in basis points.
    #[serde(default)]
    pub discount_bps: u32,
    pub tax_rate: TaxRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentOptions {
    pub supply: SupplyType,
    pub tax_mode: TaxMode,
    /// Document-level discount spread over the lines.
    pub extra_discount: Money,
    /// Round the grand total to the nearest rupee.
    pub round_off: bool,
}

impl DocumentOptions {
    pub fn new(supply: SupplyType) -> Self {
        DocumentOptions {
            supply,
            tax_mode: TaxMode::Exclusive,
            extra_discount: Money::zero(),
            round_off: false,
        }
    }
}

// =============================================================================
// Output
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComputedLine {
    pub line_no: i64,
    pub item_id: Option<String>,
    pub description: String,
    pub hsn_code: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount_bps: u32,
    pub tax_rate: TaxRate,
    pub gross: Money,
    /// Line discount plus this line's share of the document discount.
    pub discount: Money,
    pub gst: GstBreakup,
    /// Taxable value plus tax.
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentTotals {
    pub gross: Money,
    pub discount: Money,
    pub taxable: Money,
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
    pub round_off: Money,
    pub grand_total: Money,
}

impl DocumentTotals {
    pub fn total_tax(&self) -> Money {
        self.cgst + self.sgst + self.igst
    }

    /// True when nothing is owed and nothing is taxed, as with a fully
    /// discounted bill. Such bills carry no journal entry.
    pub fn is_nil(&self) -> bool {
        self.grand_total.is_zero() && self.taxable.is_zero() && self.total_tax().is_zero() && self.round_off.is_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComputedDocument {
    pub lines: Vec<ComputedLine>,
    pub totals: DocumentTotals,
}

impl ComputedDocument {
    /// Lines in the shape [`crate::gst::summarize_by_hsn`] expects.
    pub fn hsn_lines(&self) -> impl Iterator<Item = HsnLine<'_>> {
        self.lines.iter().map(|l| HsnLine {
            hsn_code: l.hsn_code.as_deref(),
            tax_rate: l.tax_rate,
            quantity: l.quantity,
            gst: l.gst,
        })
    }
}

/// Checks every line's description, quantity, price and rates.
pub fn validate_lines(lines: &[LineInput]) -> CoreResult<()> {
    validate_line_count(lines.len())?;
    for line in lines {
        if line.description.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "description".to_string(),
            }
            .into());
        }
        validate_quantity(line.quantity)?;
        validate_price_paise(line.unit_price.paise())?;
        validate_bps("discount_bps", line.discount_bps)?;
        validate_bps("tax_rate", line.tax_rate.bps())?;
    }
    Ok(())
}

fn too_large(field: &str) -> CoreError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
    .into()
}

/// `(gross, net of line discount)` for one line.
fn line_value(line: &LineInput) -> CoreResult<(Money, Money)> {
    let gross = line
        .unit_price
        .checked_mul_quantity(line.quantity)
        .ok_or_else(|| too_large("line amount"))?;
    let disc = gross.percentage(i64::from(line.discount_bps), crate::money::BPS_SCALE);
    Ok((gross, gross - disc))
}

fn sum_checked(mut amounts: impl Iterator<Item = Money>) -> CoreResult<Money> {
    amounts.try_fold(Money::zero(), |acc, m| acc.checked_add(m).ok_or_else(|| too_large("bill amount")))
}

/// Sum of line values after line discounts, before any document-level
/// discount. Used to cap coupon and loyalty discounts.
pub fn net_value(lines: &[LineInput]) -> CoreResult<Money> {
    validate_lines(lines)?;
    let nets = lines.iter().map(line_value).collect::<CoreResult<Vec<_>>>()?;
    sum_checked(nets.into_iter().map(|(_, net)| net))
}

/// Computes lines and totals.
///
/// ## Example
/// ```rust
/// use khata_core::document::{compute_document, DocumentOptions, LineInput};
/// use khata_core::gst::SupplyType;
/// use khata_core::money::Money;
/// use khata_core::types::TaxRate;
///
/// let lines = vec![LineInput {
///     item_id: None,
///     description: "Basmati Rice 5kg".into(),
///     hsn_code: Some("1006".into()),
///     quantity: 2,
///     unit_price: Money::from_paise(50_000),
///     discount_bps: 1000,
///     tax_rate: TaxRate::from_percent(5),
/// }];
/// let doc = compute_document(&lines, &DocumentOptions::new(SupplyType::IntraState)).unwrap();
/// assert_eq!(doc.totals.taxable.paise(), 90_000);
/// assert_eq!(doc.totals.cgst.paise(), 2_250);
/// assert_eq!(doc.totals.grand_total.paise(), 94_500);
/// ```
pub fn compute_document(lines: &[LineInput], options: &DocumentOptions) -> CoreResult<ComputedDocument> {
    validate_lines(lines)?;
    if options.extra_discount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "extra_discount".to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }

    let nets = lines.iter().map(line_value).collect::<CoreResult<Vec<_>>>()?;
    let total_net = sum_checked(nets.iter().map(|(_, net)| *net))?;
    if options.extra_discount > total_net {
        return Err(CoreError::DiscountNotApplicable {
            reason: format!(
                "discount {} exceeds bill value {}",
                options.extra_discount, total_net
            ),
        });
    }

    let weights: Vec<i64> = nets.iter().map(|(_, net)| net.paise()).collect();
    let shares = options.extra_discount.allocate(&weights);

    let mut computed = Vec::with_capacity(lines.len());
    let mut totals = DocumentTotals::default();

    for (idx, ((line, (gross, net)), share)) in lines.iter().zip(nets).zip(shares).enumerate() {
        let amount = net - share;
        let gst = match options.tax_mode {
            TaxMode::Exclusive => GstBreakup::compute(amount, line.tax_rate, options.supply),
            TaxMode::Inclusive => {
                let taxable = taxable_from_inclusive(amount, line.tax_rate);
                let mut gst = GstBreakup::compute(taxable, line.tax_rate, options.supply);
                // Keep the line total equal to the price the customer saw.
                gst.taxable = amount - gst.total_tax();
                gst
            }
        };

        totals.gross += gross;
        totals.discount += gross - amount;
        totals.taxable += gst.taxable;
        totals.cgst += gst.cgst;
        totals.sgst += gst.sgst;
        totals.igst += gst.igst;

        computed.push(ComputedLine {
            line_no: idx as i64 + 1,
            item_id: line.item_id.clone(),
            description: line.description.trim().to_string(),
            hsn_code: line.hsn_code.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount_bps: line.discount_bps,
            tax_rate: line.tax_rate,
            gross,
            discount: gross - amount,
            gst,
            total: gst.gross(),
        });
    }

    let before_round = totals.taxable + totals.total_tax();
    if options.round_off {
        let (rounded, round_off) = before_round.round_to_rupee();
        totals.grand_total = rounded;
        totals.round_off = round_off;
    } else {
        totals.grand_total = before_round;
    }

    Ok(ComputedDocument {
        lines: computed,
        totals,
    })
}

// =============================================================================
// Stored Documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    SalesInvoice,
    PurchaseBill,
}

impl DocumentKind {
    pub fn series(&self) -> NumberSeries {
        match self {
            DocumentKind::SalesInvoice => NumberSeries::SalesInvoice,
            DocumentKind::PurchaseBill => NumberSeries::PurchaseBill,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::SalesInvoice => "Sales invoice",
            DocumentKind::PurchaseBill => "Purchase bill",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Posted,
    Cancelled,
}

/// Sales invoice or purchase bill header.
///
/// ## Lifecycle
/// ```text
/// Draft ──post──► Posted ──cancel──► Cancelled
///   │               │
///   └──cancel───────┘ (a posted document is cancelled by reversing
///                      its journal and stock movements)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TradeDocument {
    pub id: String,
    pub company_id: String,
    pub kind: DocumentKind,
    /// Assigned when the document is posted.
    pub number: Option<String>,
    pub party_id: String,
    /// Supplier's own bill number on purchase bills.
    pub party_reference: Option<String>,
    #[ts(as = "String")]
    pub document_date: NaiveDate,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub place_of_supply: u8,
    pub supply_type: SupplyType,
    pub tax_mode: TaxMode,
    pub status: DocumentStatus,
    pub gross: Money,
    pub discount: Money,
    pub taxable: Money,
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
    pub round_off: Money,
    pub grand_total: Money,
    pub amount_paid: Money,
    pub journal_entry_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl TradeDocument {
    pub fn outstanding(&self) -> Money {
        self.grand_total - self.amount_paid
    }

    pub fn totals(&self) -> DocumentTotals {
        DocumentTotals {
            gross: self.gross,
            discount: self.discount,
            taxable: self.taxable,
            cgst: self.cgst,
            sgst: self.sgst,
            igst: self.igst,
            round_off: self.round_off,
            grand_total: self.grand_total,
        }
    }

    fn display_id(&self) -> String {
        self.number.clone().unwrap_or_else(|| self.id.clone())
    }

    pub fn ensure_can_post(&self) -> CoreResult<()> {
        if self.status != DocumentStatus::Draft {
            return Err(CoreError::invalid_status(self.kind.label(), self.display_id(), self.status, "post"));
        }
        Ok(())
    }

    /// Cancelling is allowed for drafts and for posted documents with
    /// nothing settled against them.
    pub fn ensure_can_cancel(&self) -> CoreResult<()> {
        match self.status {
            DocumentStatus::Draft => Ok(()),
            DocumentStatus::Posted if self.amount_paid.is_zero() => Ok(()),
            DocumentStatus::Posted => Err(CoreError::InvalidStatus {
                entity: self.kind.label().to_string(),
                id: self.display_id(),
                status: "partly settled".to_string(),
                operation: "cancel".to_string(),
            }),
            DocumentStatus::Cancelled => {
                Err(CoreError::invalid_status(self.kind.label(), self.display_id(), self.status, "cancel"))
            }
        }
    }

    pub fn ensure_can_settle(&self, amount: Money) -> CoreResult<()> {
        if self.status != DocumentStatus::Posted {
            return Err(CoreError::invalid_status(self.kind.label(), self.display_id(), self.status, "settle"));
        }
        if !amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "amount".to_string(),
            }
            .into());
        }
        if amount > self.outstanding() {
            return Err(CoreError::Overpayment {
                amount,
                outstanding: self.outstanding(),
            });
        }
        Ok(())
    }
}

/// Document line as stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DocumentLine {
    pub id: String,
    pub document_id: String,
    pub line_no: i64,
    pub item_id: Option<String>,
    pub description: String,
    pub hsn_code: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount_bps: u32,
    pub tax_rate: TaxRate,
    pub gross: Money,
    pub discount: Money,
    pub taxable: Money,
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
    pub total: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TradeDocumentWithLines {
    #[serde(flatten)]
    pub document: TradeDocument,
    pub lines: Vec<DocumentLine>,
}

// =============================================================================
// Number Series
// =============================================================================

/// Independent numbering sequences, restarted every financial year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NumberSeries {
    SalesInvoice,
    PurchaseBill,
    Pos,
    Journal,
}

impl NumberSeries {
    pub const fn prefix(&self) -> &'static str {
        match self {
            NumberSeries::SalesInvoice => "INV",
            NumberSeries::PurchaseBill => "BILL",
            NumberSeries::Pos => "POS",
            NumberSeries::Journal => "JV",
        }
    }

    const fn width(&self) -> usize {
        match self {
            NumberSeries::SalesInvoice | NumberSeries::PurchaseBill => 4,
            NumberSeries::Pos | NumberSeries::Journal => 6,
        }
    }

    /// ## Example
    /// ```rust
    /// use khata_core::document::NumberSeries;
    ///
    /// assert_eq!(NumberSeries::SalesInvoice.format("2025-26", 7), "INV/2025-26/0007");
    /// assert_eq!(NumberSeries::Pos.format("2025-26", 42), "POS/2025-26/000042");
    /// ```
    pub fn format(&self, fy_label: &str, seq: i64) -> String {
        format!("{}/{}/{:0width$}", self.prefix(), fy_label, seq, width = self.width())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
