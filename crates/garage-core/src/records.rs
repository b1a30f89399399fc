//! # Ledger Records
//!
//! Typed rows of the invoice/payment ledger and the collaborator records it
//! reads (branches, customers, jobs, purchases).
//!
//! ## Record Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Job ──1:0..1──► Invoice ──1:N──► TaxLine (invoice_lines)              │
//! │    │                 │                                                  │
//! │    │                 ├──1:N──► PaymentEntry (PAYMENT / REVERSAL)        │
//! │    │                 ├──1:N──► AdvanceAdjustment ◄──N:1── Advance       │
//! │    │                 ├──1:N──► StatusHistoryEntry   (append-only)       │
//! │    │                 └──1:N──► PaymentHistoryEntry  (append-only)       │
//! │    └──1:N──► Advance                                                    │
//! │                                                                         │
//! │   SequenceCounter: one per (company, branch, fiscal year, kind)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::totals::InvoiceTotals;
use crate::types::{
    DocumentKind, EntryKind, InvoiceStatus, JobStatus, PaymentAction, PaymentMode,
    PaymentStatus, PurchaseStatus, StatusAction, TaxRegime,
};

// =============================================================================
// Invoice
// =============================================================================

/// Invoice header. Lines are loaded separately as [`crate::tax::TaxLine`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub company_id: String,
    pub branch_id: String,
    pub job_id: String,
    pub customer_id: String,
    /// `PREFIX/FY/NNNNN`, assigned at finalize.
    pub invoice_number: Option<String>,
    pub fiscal_year: Option<String>,
    pub sequence_number: Option<i64>,
    #[ts(as = "String")]
    pub invoice_date: NaiveDate,
    pub status: InvoiceStatus,
    pub payment_status: PaymentStatus,
    /// Single mode name, "MIXED", or none before the first payment.
    pub payment_mode_summary: Option<String>,
    pub tax_regime: TaxRegime,
    pub subtotal_service: Money,
    pub subtotal_parts: Money,
    pub taxable_amount: Money,
    pub cgst_amount: Money,
    pub sgst_amount: Money,
    pub igst_amount: Money,
    pub total_tax_amount: Money,
    pub gross_total: Money,
    pub round_off: Money,
    pub grand_total: Money,
    /// JSON [`CounterpartySnapshot`], frozen at finalize.
    pub counterparty_snapshot: Option<String>,
    pub cancel_reason: Option<String>,
    pub lock_version: i64,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub finalized_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Header totals as one value.
    pub fn totals(&self) -> InvoiceTotals {
        InvoiceTotals {
            subtotal_service: self.subtotal_service,
            subtotal_parts: self.subtotal_parts,
            taxable_amount: self.taxable_amount,
            cgst_amount: self.cgst_amount,
            sgst_amount: self.sgst_amount,
            igst_amount: self.igst_amount,
            total_tax_amount: self.total_tax_amount,
            gross_total: self.gross_total,
            round_off: self.round_off,
            grand_total: self.grand_total,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status == InvoiceStatus::Finalized
    }
}

/// Counterparties as they were when the invoice was finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CounterpartySnapshot {
    pub branch: Branch,
    pub customer: Customer,
    pub tax_regime: TaxRegime,
    #[ts(as = "String")]
    pub captured_at: DateTime<Utc>,
}

// =============================================================================
// Payment Ledger
// =============================================================================

/// One row of the append-only payment ledger.
///
/// PAYMENT rows carry a positive amount and a receipt number; REVERSAL rows
/// carry the negated amount and point at the PAYMENT they cancel. Only the
/// reversal flags of a PAYMENT row are ever written after insert.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentEntry {
    pub id: String,
    pub invoice_id: String,
    pub entry_kind: EntryKind,
    pub amount: Money,
    #[ts(as = "String")]
    pub paid_on: NaiveDate,
    pub mode: PaymentMode,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub receipt_number: Option<String>,
    pub reversed_payment_id: Option<String>,
    pub is_reversed: bool,
    #[ts(as = "Option<String>")]
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<String>,
    pub reversal_reason: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PaymentEntry {
    /// A PAYMENT row that still counts toward the settled amount.
    pub fn is_live_payment(&self) -> bool {
        self.entry_kind == EntryKind::Payment && !self.is_reversed
    }
}

/// Money received against a job before it is invoiced.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Advance {
    pub id: String,
    pub company_id: String,
    pub branch_id: String,
    pub job_id: String,
    pub receipt_number: String,
    #[ts(as = "String")]
    pub received_on: NaiveDate,
    pub mode: PaymentMode,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub amount: Money,
    /// Currently consumed by invoices; goes down only through a release.
    pub adjusted_amount: Money,
    /// Given back by cancelled invoices over the advance's life.
    pub released_amount: Money,
    pub balance_amount: Money,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Part of an advance consumed by an invoice. Unique per (invoice, advance).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AdvanceAdjustment {
    pub id: String,
    pub advance_id: String,
    pub invoice_id: String,
    pub adjusted_amount: Money,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Return of an adjustment's money to its advance after the invoice it
/// settled was cancelled. At most one per adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AdvanceRelease {
    pub id: String,
    pub adjustment_id: String,
    pub advance_id: String,
    pub invoice_id: String,
    pub released_amount: Money,
    pub reason: String,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Numbering
// =============================================================================

/// Durable counter for one numbering scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SequenceCounter {
    pub id: String,
    pub company_id: String,
    pub branch_id: String,
    pub fiscal_year: String,
    pub document_kind: DocumentKind,
    pub prefix: String,
    pub current_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Audit History
// =============================================================================

/// Append-only invoice status transition.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StatusHistoryEntry {
    pub id: String,
    pub invoice_id: String,
    pub from_status: Option<InvoiceStatus>,
    pub to_status: InvoiceStatus,
    pub action_type: StatusAction,
    pub note: Option<String>,
    /// JSON payload.
    pub payload: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a money movement on an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentHistoryEntry {
    pub id: String,
    pub invoice_id: String,
    pub payment_id: Option<String>,
    pub action_type: PaymentAction,
    pub from_payment_status: PaymentStatus,
    pub to_payment_status: PaymentStatus,
    pub amount: Money,
    pub note: Option<String>,
    pub payload: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Collaborator Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Branch {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub state: Option<String>,
    pub gstin: Option<String>,
    pub invoice_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub state: Option<String>,
    pub gstin: Option<String>,
    pub phone: Option<String>,
}

/// A job card (work order) as seen by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Job {
    pub id: String,
    pub company_id: String,
    pub branch_id: String,
    pub customer_id: String,
    pub job_number: String,
    pub status: JobStatus,
    pub stock_posted: bool,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub lock_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    pub company_id: String,
    pub branch_id: String,
    pub vendor_name: String,
    pub bill_number: Option<String>,
    pub status: PurchaseStatus,
    pub stock_posted: bool,
    pub grand_total: Money,
}

/// A payment made to a vendor. Reversal flags the row and records who,
/// when and why; the row is never removed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchasePayment {
    pub id: String,
    pub purchase_id: String,
    pub amount: Money,
    #[ts(as = "String")]
    pub paid_on: NaiveDate,
    pub mode: PaymentMode,
    pub is_reversed: bool,
    #[ts(as = "Option<String>")]
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<String>,
    pub reversal_reason: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}
