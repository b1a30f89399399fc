//! # Document Numbering Rules
//!
//! Pure half of the scoped sequence generator: fiscal-year labels, prefix
//! normalisation and the persisted number format. Counter allocation itself
//! lives in `garage-db` because it needs a transaction.
//!
//! ## Number Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   GAC / 2025-26 / 00143                                                 │
//! │    │       │        │                                                   │
//! │    │       │        └── sequence_number, zero-padded to 5 digits        │
//! │    │       └────────── fiscal year label, April start (YYYY-YY)         │
//! │    └────────────────── prefix: A-Z 0-9 '-', 1..=20 chars                │
//! │                                                                         │
//! │   Scope = (company, branch, fiscal year, document kind)                 │
//! │   One counter row per scope, numbers +1 per issuance, never reused.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::DocumentKind;
use crate::validation::ValidationResult;

/// Longest prefix kept after normalisation.
pub const MAX_PREFIX_LEN: usize = 20;

/// First month of the fiscal year (April).
pub const FISCAL_YEAR_START_MONTH: u32 = 4;

// =============================================================================
// Fiscal Year
// =============================================================================

/// Derives the April–March fiscal-year label for a date.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use garage_core::numbering::fiscal_year_label;
///
/// let d = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
/// assert_eq!(fiscal_year_label(d), "2025-26");
/// let d = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
/// assert_eq!(fiscal_year_label(d), "2026-27");
/// ```
pub fn fiscal_year_label(date: NaiveDate) -> String {
    let start = if date.month() >= FISCAL_YEAR_START_MONTH {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{:02}", start, (start + 1).rem_euclid(100))
}

/// Checks that a fiscal-year label has the `YYYY-YY` shape of consecutive
/// years, e.g. `2025-26` or `2099-00`.
///
/// ## Example
/// ```rust
/// use garage_core::numbering::validate_fiscal_year_label;
///
/// assert!(validate_fiscal_year_label("2025-26").is_ok());
/// assert!(validate_fiscal_year_label("FY 25/26").is_err());
/// assert!(validate_fiscal_year_label("2025-27").is_err());
/// ```
pub fn validate_fiscal_year_label(label: &str) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "fiscal year label".to_string(),
        reason: reason.to_string(),
    };

    let (start, end) = label
        .split_once('-')
        .filter(|(start, end)| {
            start.len() == 4
                && end.len() == 2
                && start.bytes().chain(end.bytes()).all(|b| b.is_ascii_digit())
        })
        .ok_or_else(|| invalid("expected YYYY-YY"))?;

    let start: i32 = start.parse().map_err(|_| invalid("expected YYYY-YY"))?;
    let end: i32 = end.parse().map_err(|_| invalid("expected YYYY-YY"))?;
    if (start + 1).rem_euclid(100) != end {
        return Err(invalid("years must be consecutive"));
    }

    Ok(())
}

/// A fiscal-year record maintained by the company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalYearRecord {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
}

impl FiscalYearRecord {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Where a resolved fiscal-year label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FiscalYearSource {
    /// An active fiscal-year record covering the date.
    Record,
    /// Derived from the date (April start).
    Derived,
}

/// Outcome of fiscal-year resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalYearResolution {
    pub label: String,
    pub source: FiscalYearSource,
    /// Set when a record was used and its label differs from the derived one.
    pub derived_mismatch: Option<String>,
    /// Label of a covering record that was skipped because it is not `YYYY-YY`.
    pub malformed_record: Option<String>,
}

/// Resolves the fiscal-year label for a document date.
///
/// An active record covering the date is authoritative. Otherwise the label
/// is derived from the date. A record whose label disagrees with the derived
/// label still wins; the disagreement is reported in `derived_mismatch` so
/// the caller can log it. A record whose label is not `YYYY-YY` never reaches
/// a document number: the derived label is used and the record is reported
/// in `malformed_record`.
pub fn resolve_fiscal_year(date: NaiveDate, records: &[FiscalYearRecord]) -> FiscalYearResolution {
    let derived = fiscal_year_label(date);

    let record = records
        .iter()
        .filter(|r| r.is_active && r.covers(date))
        .min_by_key(|r| r.start_date);

    match record {
        Some(record) => {
            let label = record.label.trim().to_string();
            if validate_fiscal_year_label(&label).is_err() {
                return FiscalYearResolution {
                    label: derived,
                    source: FiscalYearSource::Derived,
                    derived_mismatch: None,
                    malformed_record: Some(label),
                };
            }
            let derived_mismatch = (label != derived).then_some(derived);
            FiscalYearResolution {
                label,
                source: FiscalYearSource::Record,
                derived_mismatch,
                malformed_record: None,
            }
        }
        None => FiscalYearResolution {
            label: derived,
            source: FiscalYearSource::Derived,
            derived_mismatch: None,
            malformed_record: None,
        },
    }
}

// =============================================================================
// Prefix
// =============================================================================

/// Normalises a prefix: uppercase, keep `A-Z 0-9 -`, at most 20 chars.
///
/// ## Example
/// ```rust
/// use garage_core::numbering::normalize_prefix;
///
/// assert_eq!(normalize_prefix(" gac/inv "), "GACINV");
/// assert_eq!(normalize_prefix("blr-01"), "BLR-01");
/// ```
pub fn normalize_prefix(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .take(MAX_PREFIX_LEN)
        .collect()
}

/// Picks the prefix for a counter: the first candidate that survives
/// normalisation, else the document kind's default.
pub fn resolve_prefix(candidates: &[Option<&str>], kind: DocumentKind) -> String {
    candidates
        .iter()
        .flatten()
        .map(|raw| normalize_prefix(raw))
        .find(|p| !p.is_empty())
        .unwrap_or_else(|| kind.default_prefix().to_string())
}

// =============================================================================
// Scope & Format
// =============================================================================

/// Key of one sequence counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceScope {
    pub company_id: String,
    pub branch_id: String,
    pub fiscal_year: String,
    pub document_kind: DocumentKind,
}

impl fmt::Display for SequenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.company_id, self.branch_id, self.fiscal_year, self.document_kind
        )
    }
}

/// A number handed out by the sequence generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IssuedNumber {
    pub formatted_number: String,
    pub sequence_number: i64,
    pub fiscal_year: String,
}

/// Formats a document number as `PREFIX/FYLABEL/NNNNN`.
///
/// ## Example
/// ```rust
/// use garage_core::numbering::format_number;
///
/// assert_eq!(format_number("GAC", "2025-26", 143), "GAC/2025-26/00143");
/// ```
pub fn format_number(prefix: &str, fiscal_year: &str, sequence_number: i64) -> String {
    format!("{}/{}/{:05}", prefix, fiscal_year, sequence_number)
}

// =============================================================================
// Unit Tests
// =============================================================================
