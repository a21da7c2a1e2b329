//! # Journal Module
//!
//! Double-entry journal drafts and the balance check that guards posting.
//!
//! ## Draft → Balanced → Posted
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   JournalDraft          validate()          BalancedEntry               │
//! │   ────────────    ─────────────────────►    ─────────────               │
//! │   any lines            │                    Σ debit == Σ credit         │
//! │                        │                    ≥ 2 lines, one side each    │
//! │                        ▼                           │                    │
//! │                  CoreError::UnbalancedEntry        │ khata-db           │
//! │                  CoreError::IncompleteEntry        ▼                    │
//! │                  CoreError::InvalidJournalLine   JournalEntry (Posted)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `BalancedEntry` has no public constructor. The database layer only
//! accepts a `BalancedEntry` for posting, so an unbalanced entry cannot
//! reach the ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::MAX_JOURNAL_LINES;

// =============================================================================
// Voucher Type
// =============================================================================

/// What kind of business event produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    /// Manual journal voucher.
    #[default]
    Journal,
    Sales,
    Purchase,
    /// Money received from a customer.
    Receipt,
    /// Money paid to a supplier.
    Payment,
    /// Cash ↔ bank transfer.
    Contra,
    Pos,
    /// Mirror image of an earlier entry.
    Reversal,
}

// =============================================================================
// Draft
// =============================================================================

/// One line of a draft entry. Exactly one of `debit` / `credit` must be
/// positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DraftLine {
    pub account_id: String,
    #[serde(default)]
    pub debit: Money,
    #[serde(default)]
    pub credit: Money,
    #[serde(default)]
    pub description: Option<String>,
}

/// An unvalidated journal entry.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use khata_core::journal::{JournalDraft, VoucherType};
/// use khata_core::money::Money;
///
/// let date = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();
/// let entry = JournalDraft::new(date, VoucherType::Journal)
///     .narration("Owner's capital")
///     .debit("acc-cash", Money::from_paise(500_000))
///     .credit("acc-capital", Money::from_paise(500_000))
///     .validate()
///     .unwrap();
/// assert_eq!(entry.total().paise(), 500_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JournalDraft {
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    #[serde(default)]
    pub voucher_type: VoucherType,
    #[serde(default)]
    pub narration: Option<String>,
    /// Source document number, e.g. an invoice number.
    #[serde(default)]
    pub reference: Option<String>,
    pub lines: Vec<DraftLine>,
}

impl JournalDraft {
    pub fn new(entry_date: NaiveDate, voucher_type: VoucherType) -> Self {
        JournalDraft {
            entry_date,
            voucher_type,
            narration: None,
            reference: None,
            lines: Vec::new(),
        }
    }

    pub fn narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Adds a debit line.
    pub fn debit(mut self, account_id: impl Into<String>, amount: Money) -> Self {
        self.lines.push(DraftLine {
            account_id: account_id.into(),
            debit: amount,
            credit: Money::zero(),
            description: None,
        });
        self
    }

    /// Adds a credit line.
    pub fn credit(mut self, account_id: impl Into<String>, amount: Money) -> Self {
        self.lines.push(DraftLine {
            account_id: account_id.into(),
            debit: Money::zero(),
            credit: amount,
            description: None,
        });
        self
    }

    /// Adds a debit line unless the amount is zero.
    pub fn debit_nonzero(self, account_id: impl Into<String>, amount: Money) -> Self {
        if amount.is_zero() {
            self
        } else {
            self.debit(account_id, amount)
        }
    }

    /// Adds a credit line unless the amount is zero.
    pub fn credit_nonzero(self, account_id: impl Into<String>, amount: Money) -> Self {
        if amount.is_zero() {
            self
        } else {
            self.credit(account_id, amount)
        }
    }

    pub fn total_debit(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Checks the double-entry rules and seals the entry.
    ///
    /// ## Rules
    /// - 2 to `MAX_JOURNAL_LINES` lines
    /// - each line has an account and exactly one positive side
    /// - at least one debit line and one credit line
    /// - total debits equal total credits
    pub fn validate(self) -> CoreResult<BalancedEntry> {
        if self.lines.len() < 2 {
            return Err(CoreError::IncompleteEntry {
                reason: "at least two lines are required".to_string(),
            });
        }
        if self.lines.len() > MAX_JOURNAL_LINES {
            return Err(CoreError::IncompleteEntry {
                reason: format!("at most {} lines are allowed", MAX_JOURNAL_LINES),
            });
        }

        for (idx, line) in self.lines.iter().enumerate() {
            let line_no = idx + 1;
            if line.account_id.trim().is_empty() {
                return Err(CoreError::InvalidJournalLine {
                    line: line_no,
                    reason: "account is required".to_string(),
                });
            }
            if line.debit.is_negative() || line.credit.is_negative() {
                return Err(CoreError::InvalidJournalLine {
                    line: line_no,
                    reason: "amounts cannot be negative".to_string(),
                });
            }
            match (line.debit.is_positive(), line.credit.is_positive()) {
                (true, true) => {
                    return Err(CoreError::InvalidJournalLine {
                        line: line_no,
                        reason: "a line cannot carry both a debit and a credit".to_string(),
                    })
                }
                (false, false) => {
                    return Err(CoreError::InvalidJournalLine {
                        line: line_no,
                        reason: "a line must carry a debit or a credit".to_string(),
                    })
                }
                _ => {}
            }
        }

        if !self.lines.iter().any(|l| l.debit.is_positive()) {
            return Err(CoreError::IncompleteEntry {
                reason: "no debit line".to_string(),
            });
        }
        if !self.lines.iter().any(|l| l.credit.is_positive()) {
            return Err(CoreError::IncompleteEntry {
                reason: "no credit line".to_string(),
            });
        }

        let debit = self.total_debit();
        let credit = self.total_credit();
        if debit != credit {
            return Err(CoreError::UnbalancedEntry { debit, credit });
        }

        Ok(BalancedEntry { draft: self, total: debit })
    }
}

// =============================================================================
// Balanced Entry
// =============================================================================

/// A journal entry that passed [`JournalDraft::validate`].
#[derive(Debug, Clone)]
pub struct BalancedEntry {
    draft: JournalDraft,
    total: Money,
}

impl BalancedEntry {
    pub fn entry_date(&self) -> NaiveDate {
        self.draft.entry_date
    }

    pub fn voucher_type(&self) -> VoucherType {
        self.draft.voucher_type
    }

    pub fn narration(&self) -> Option<&str> {
        self.draft.narration.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.draft.reference.as_deref()
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.draft.lines
    }

    /// Sum of either side.
    pub fn total(&self) -> Money {
        self.total
    }

    /// Builds the mirror-image entry dated `date`. Reversing a balanced
    /// entry always yields a balanced entry.
    pub fn reversal(&self, date: NaiveDate) -> BalancedEntry {
        let lines = self
            .draft
            .lines
            .iter()
            .map(|l| DraftLine {
                account_id: l.account_id.clone(),
                debit: l.credit,
                credit: l.debit,
                description: l.description.clone(),
            })
            .collect();

        let narration = match &self.draft.narration {
            Some(n) => format!("Reversal of: {}", n),
            None => "Reversal".to_string(),
        };

        BalancedEntry {
            draft: JournalDraft {
                entry_date: date,
                voucher_type: VoucherType::Reversal,
                narration: Some(narration),
                reference: self.draft.reference.clone(),
                lines,
            },
            total: self.total,
        }
    }
}

// =============================================================================
// Persisted Types
// =============================================================================

/// Lifecycle of a posted entry. Entries are never edited or deleted; a
/// mistake is corrected by reversing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Posted,
    Reversed,
}

/// Journal entry header as stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct JournalEntry {
    pub id: String,
    pub company_id: String,
    /// e.g. `JV/2025-26/000042`
    pub entry_number: String,
    pub financial_year_id: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub voucher_type: VoucherType,
    pub narration: Option<String>,
    pub reference: Option<String>,
    pub total_amount: Money,
    pub status: JournalStatus,
    /// Set on a reversal entry: the entry it reverses.
    pub reversal_of: Option<String>,
    /// Set on a reversed entry: the entry that reversed it.
    pub reversed_by: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn ensure_reversible(&self) -> CoreResult<()> {
        if self.status != JournalStatus::Posted || self.reversal_of.is_some() {
            let status = if self.reversal_of.is_some() {
                "a reversal".to_string()
            } else {
                format!("{:?}", self.status).to_lowercase()
            };
            return Err(CoreError::InvalidStatus {
                entity: "Journal entry".to_string(),
                id: self.entry_number.clone(),
                status,
                operation: "reverse".to_string(),
            });
        }
        Ok(())
    }
}

/// Journal line as stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct JournalLine {
    pub id: String,
    pub entry_id: String,
    pub line_no: i64,
    pub account_id: String,
    pub debit: Money,
    pub credit: Money,
    pub description: Option<String>,
}

/// Entry header together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JournalEntryWithLines {
    #[serde(flatten)]
    pub entry: JournalEntry,
    pub lines: Vec<JournalLine>,
}

// =============================================================================
// Unit Tests
// =============================================================================
