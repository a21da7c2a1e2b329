//! # Financial Year Module
//!
//! A company books every journal entry into a financial year. Years are
//! opened and closed administratively; nothing can be posted into a closed
//! year or onto a date no year covers.
//!
//! Indian companies use April 1 – March 31, labelled `2025-26`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Longest allowed financial year, in days (covers a first year that
/// starts mid-year and runs to the following March).
pub const MAX_FINANCIAL_YEAR_DAYS: i64 = 550;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FinancialYearStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct FinancialYear {
    pub id: String,
    pub company_id: String,
    /// e.g. `2025-26`
    pub name: String,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
    #[ts(as = "String")]
    pub end_date: NaiveDate,
    pub status: FinancialYearStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl FinancialYear {
    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Whether `[start, end]` shares any day with this year.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }

    pub fn is_open(&self) -> bool {
        self.status == FinancialYearStatus::Open
    }

    /// Fails with `FinancialYearClosed` when this year is closed, or
    /// `DateOutsideFinancialYear` when `date` is outside it.
    pub fn ensure_postable(&self, date: NaiveDate) -> CoreResult<()> {
        if !self.contains(date) {
            return Err(CoreError::DateOutsideFinancialYear { date });
        }
        if !self.is_open() {
            return Err(CoreError::FinancialYearClosed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Start and end of the Indian financial year containing `date`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use khata_core::financial_year::{indian_bounds, label};
///
/// let d = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
/// let (start, end) = indian_bounds(d);
/// assert_eq!(start, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
/// assert_eq!(end, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap());
/// assert_eq!(label(start, end), "2025-26");
/// ```
pub fn indian_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start_year = if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    };
    // April 1 and March 31 exist in every year.
    let start = NaiveDate::from_ymd_opt(start_year, 4, 1).unwrap_or(date);
    let end = NaiveDate::from_ymd_opt(start_year + 1, 3, 31).unwrap_or(date);
    (start, end)
}

/// `2025-26` when the year crosses a calendar boundary, `2025` otherwise.
pub fn label(start: NaiveDate, end: NaiveDate) -> String {
    if start.year() == end.year() {
        start.year().to_string()
    } else {
        format!("{}-{:02}", start.year(), end.year() % 100)
    }
}

/// Validates a new year's range against the existing years.
pub fn validate_range(
    start: NaiveDate,
    end: NaiveDate,
    existing: &[FinancialYear],
) -> CoreResult<()> {
    if start >= end {
        return Err(ValidationError::invalid_format("end_date", "must be after start_date").into());
    }

    let days = (end - start).num_days() + 1;
    if days > MAX_FINANCIAL_YEAR_DAYS {
        return Err(ValidationError::OutOfRange {
            field: "financial year length (days)".to_string(),
            min: 1,
            max: MAX_FINANCIAL_YEAR_DAYS,
        }
        .into());
    }

    if let Some(clash) = existing.iter().find(|fy| fy.overlaps(start, end)) {
        return Err(CoreError::OverlappingFinancialYear {
            name: clash.name.clone(),
        });
    }

    Ok(())
}

/// The year covering `date`, open or closed.
pub fn find_for_date(years: &[FinancialYear], date: NaiveDate) -> Option<&FinancialYear> {
    years.iter().find(|fy| fy.contains(date))
}

/// Resolves the year a posting on `date` goes into, rejecting closed years.
pub fn resolve_for_posting(years: &[FinancialYear], date: NaiveDate) -> CoreResult<&FinancialYear> {
    let fy = find_for_date(years, date).ok_or(CoreError::DateOutsideFinancialYear { date })?;
    fy.ensure_postable(date)?;
    Ok(fy)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn year(start: NaiveDate, end: NaiveDate, status: FinancialYearStatus) -> FinancialYear {
        FinancialYear {
            id: format!("fy-{}", start.year()),
            company_id: "co".to_string(),
            name: label(start, end),
            start_date: start,
            end_date: end,
            status,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn test_indian_bounds_edges() {
        assert_eq!(indian_bounds(d(2025, 4, 1)), (d(2025, 4, 1), d(2026, 3, 31)));
        assert_eq!(indian_bounds(d(2025, 3, 31)), (d(2024, 4, 1), d(2025, 3, 31)));
    }

    #[test]
    fn test_label() {
        assert_eq!(label(d(2099, 4, 1), d(2100, 3, 31)), "2099-00");
        assert_eq!(label(d(2025, 1, 1), d(2025, 12, 31)), "2025");
    }

    #[test]
    fn test_validate_range() {
        let existing = vec![year(d(2024, 4, 1), d(2025, 3, 31), FinancialYearStatus::Closed)];

        assert!(validate_range(d(2025, 4, 1), d(2026, 3, 31), &existing).is_ok());
        assert!(matches!(
            validate_range(d(2025, 3, 1), d(2026, 3, 31), &existing),
            Err(CoreError::OverlappingFinancialYear { .. })
        ));
        assert!(validate_range(d(2026, 3, 31), d(2025, 4, 1), &existing).is_err());
        assert!(validate_range(d(2025, 4, 1), d(2027, 3, 31), &existing).is_err());
    }

    #[test]
    fn test_posting_rules() {
        let years = vec![
            year(d(2024, 4, 1), d(2025, 3, 31), FinancialYearStatus::Closed),
            year(d(2025, 4, 1), d(2026, 3, 31), FinancialYearStatus::Open),
        ];

        assert_eq!(resolve_for_posting(&years, d(2025, 7, 1)).unwrap().name, "2025-26");
        assert!(matches!(
            resolve_for_posting(&years, d(2024, 7, 1)),
            Err(CoreError::FinancialYearClosed { .. })
        ));
        assert!(matches!(
            resolve_for_posting(&years, d(2026, 4, 1)),
            Err(CoreError::DateOutsideFinancialYear { .. })
        ));
    }
}
