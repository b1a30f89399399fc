//! # Domain Types
//!
//! Scalar and enum types used throughout the garage ledger.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │  InvoiceStatus  │   │  PaymentStatus  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  bps (u32)      │   │  DRAFT          │   │  UNPAID         │       │
//! │  │  1800 = 18%     │   │  FINALIZED      │   │  PARTIAL        │       │
//! │  └─────────────────┘   │  CANCELLED      │   │  PAID           │       │
//! │                        └─────────────────┘   │  CANCELLED      │       │
//! │  ┌─────────────────┐                         └─────────────────┘       │
//! │  │    Quantity     │   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ─────────────  │   │   EntryKind     │   │  DocumentKind   │       │
//! │  │  thousandths    │   │  PAYMENT        │   │  INVOICE        │       │
//! │  │  1500 = 1.5 hrs │   │  REVERSAL       │   │  PAYMENT_RECEIPT│       │
//! │  └─────────────────┘   └─────────────────┘   │  ADVANCE_RECEIPT│       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every enum is stored as SCREAMING_SNAKE_CASE text, identical in SQL and JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Tax Rate
// =============================================================================

/// GST rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01%. GST slabs (0.25%, 3%, 5%, 12%, 18%, 28%) are all
/// exact in bps, so no rate ever needs a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// 100% in basis points. No GST rate may exceed it.
    pub const MAX_BPS: u32 = 10_000;

    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a whole percentage (18 → 18%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        TaxRate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
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

    /// Splits the rate into its CGST and SGST halves.
    ///
    /// The second half takes the odd basis point, so the halves always add
    /// back to the full rate.
    pub const fn halves(&self) -> (TaxRate, TaxRate) {
        let first = self.0 / 2;
        (TaxRate(first), TaxRate(self.0 - first))
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A billable quantity in thousandths of a unit.
///
/// Labour is billed in fractional hours and fluids in fractional litres, so
/// quantities carry three decimal places: `1500` is 1.5 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Thousandths per whole unit.
    pub const SCALE: i64 = 1000;

    /// Creates a quantity from thousandths of a unit.
    #[inline]
    pub const fn from_thousandths(thousandths: i64) -> Self {
        Quantity(thousandths)
    }

    /// Creates a quantity from whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * Self::SCALE)
    }

    /// Returns the raw thousandths value.
    #[inline]
    pub const fn thousandths(&self) -> i64 {
        self.0
    }

    /// Checks if the quantity is greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / Self::SCALE, (self.0 % Self::SCALE).abs())
    }
}

// =============================================================================
// Line Items
// =============================================================================

/// What a line bills for. Drives the service/parts subtotals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ItemKind {
    /// Workshop labour / service charge (SAC coded).
    Labor,
    /// Spare part or consumable (HSN coded).
    Part,
}

/// GST regime of a supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TaxRegime {
    /// Supplier and recipient in the same state: CGST + SGST.
    Intrastate,
    /// Different states: IGST only.
    Interstate,
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Document state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum InvoiceStatus {
    /// Editable, unnumbered.
    Draft,
    /// Numbered, lines frozen, accepts payments.
    Finalized,
    /// Terminal.
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Finalized => "FINALIZED",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::Draft
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of an invoice. Orthogonal to [`InvoiceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Ledger
// =============================================================================

/// Kind of a payment ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum EntryKind {
    /// Money received. Positive amount.
    Payment,
    /// Negates exactly one earlier PAYMENT row. Negative amount.
    Reversal,
}

/// How money was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PaymentMode {
    Cash,
    Upi,
    Card,
    BankTransfer,
    Cheque,
    Other,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "CASH",
            PaymentMode::Upi => "UPI",
            PaymentMode::Card => "CARD",
            PaymentMode::BankTransfer => "BANK_TRANSFER",
            PaymentMode::Cheque => "CHEQUE",
            PaymentMode::Other => "OTHER",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "CASH" => Ok(PaymentMode::Cash),
            "UPI" => Ok(PaymentMode::Upi),
            "CARD" => Ok(PaymentMode::Card),
            "BANK_TRANSFER" | "NEFT" | "RTGS" | "IMPS" => Ok(PaymentMode::BankTransfer),
            "CHEQUE" | "CHECK" => Ok(PaymentMode::Cheque),
            "OTHER" => Ok(PaymentMode::Other),
            _ => Err(ValidationError::NotAllowed {
                field: "payment mode".to_string(),
                allowed: ["CASH", "UPI", "CARD", "BANK_TRANSFER", "CHEQUE", "OTHER"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
}

/// Audit action recorded in the invoice status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum StatusAction {
    Create,
    EditLines,
    Finalize,
    Cancel,
}

/// Audit action recorded in the invoice payment history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PaymentAction {
    PaymentRecorded,
    PaymentReversed,
    AdvanceAdjusted,
    AdvanceReleased,
    InvoiceCancelled,
}

// =============================================================================
// Numbering
// =============================================================================

/// The kind of financial document a sequence counter numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum DocumentKind {
    Invoice,
    PaymentReceipt,
    AdvanceReceipt,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INVOICE",
            DocumentKind::PaymentReceipt => "PAYMENT_RECEIPT",
            DocumentKind::AdvanceReceipt => "ADVANCE_RECEIPT",
        }
    }

    /// Prefix used when neither the counter nor the caller supplies one.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INV",
            DocumentKind::PaymentReceipt => "RCPT",
            DocumentKind::AdvanceReceipt => "ADV",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Operational Records
// =============================================================================

/// Status of a job card (work order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum JobStatus {
    Open,
    InProgress,
    Closed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Open => "OPEN",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Closed => "CLOSED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Status of a purchase bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PurchaseStatus {
    Draft,
    Finalized,
    Cancelled,
}

/// Entity kinds the dependency report understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum EntityKind {
    Invoice,
    Job,
    Purchase,
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invoice" => Ok(EntityKind::Invoice),
            "job" | "job_card" => Ok(EntityKind::Job),
            "purchase" => Ok(EntityKind::Purchase),
            _ => Err(ValidationError::NotAllowed {
                field: "entity kind".to_string(),
                allowed: vec!["invoice".into(), "job".into(), "purchase".into()],
            }),
        }
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Who is acting, and in which company/branch.
///
/// Supplied by the identity collaborator and threaded explicitly into every
/// ledger call. The core never authenticates; it only records `actor_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub company_id: String,
    pub branch_id: String,
    pub actor_id: String,
}

impl RequestContext {
    pub fn new(
        company_id: impl Into<String>,
        branch_id: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        RequestContext {
            company_id: company_id.into(),
            branch_id: branch_id.into(),
            actor_id: actor_id.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_percent() {
        let rate = TaxRate::from_percent(18);
        assert_eq!(rate.bps(), 1800);
        assert!((rate.percentage() - 18.0).abs() < 0.001);
    }

    #[test]
    fn test_tax_rate_halves() {
        assert_eq!(
            TaxRate::from_bps(1800).halves(),
            (TaxRate::from_bps(900), TaxRate::from_bps(900))
        );
        // 0.25% splits into 0.12% + 0.13%
        assert_eq!(
            TaxRate::from_bps(25).halves(),
            (TaxRate::from_bps(12), TaxRate::from_bps(13))
        );
    }

    #[test]
    fn test_quantity_display() {
        assert_eq!(Quantity::from_thousandths(1500).to_string(), "1.500");
        assert_eq!(Quantity::from_units(2).to_string(), "2.000");
    }

    #[test]
    fn test_payment_mode_parsing() {
        assert_eq!("cash".parse::<PaymentMode>().unwrap(), PaymentMode::Cash);
        assert_eq!("NEFT".parse::<PaymentMode>().unwrap(), PaymentMode::BankTransfer);
        assert_eq!("bank transfer".parse::<PaymentMode>().unwrap(), PaymentMode::BankTransfer);
        assert!("barter".parse::<PaymentMode>().is_err());
    }

    #[test]
    fn test_entity_kind_parsing() {
        assert_eq!("Invoice".parse::<EntityKind>().unwrap(), EntityKind::Invoice);
        assert_eq!("job".parse::<EntityKind>().unwrap(), EntityKind::Job);
        assert!("vehicle".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_status_defaults() {
        assert_eq!(InvoiceStatus::default(), InvoiceStatus::Draft);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Unpaid);
    }

    #[test]
    fn test_document_kind_default_prefix() {
        assert_eq!(DocumentKind::Invoice.default_prefix(), "INV");
        assert_eq!(DocumentKind::AdvanceReceipt.as_str(), "ADVANCE_RECEIPT");
    }
}
