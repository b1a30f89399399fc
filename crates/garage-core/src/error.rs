//! # Error Types
//!
//! Domain-specific error types for garage-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  garage-core errors (this file)                                        │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  garage-db errors (separate crate)                                     │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── LedgerError      - Core | Db, rendered as ErrorReport             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → ErrorReport         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (invoice id, amounts, reasons)
//! 3. Errors are enum variants, never String
//! 4. Every variant has a stable machine code via [`CoreError::code`]

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// Every one of these is raised inside an operation's transaction; the
/// transaction is dropped (rolled back) and the error reaches the caller
/// unchanged.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Branch or customer jurisdiction is missing, so the GST regime
    /// cannot be decided.
    #[error("Invalid tax context: {0}")]
    InvalidTaxContext(String),

    /// Totals were requested for zero billable lines.
    ///
    /// ## When This Occurs
    /// - The closed job has no labour or part lines
    /// - A draft edit replaced the lines with an empty list
    #[error("Invoice has no billable lines")]
    EmptyInvoice,

    /// A sequence counter row was still missing after the create-then-reread
    /// step. Fatal for this call; the caller may retry the whole operation.
    #[error("Sequence counter missing for scope {scope}")]
    SequenceExhaustion { scope: String },

    /// Payment exceeds what is left to pay beyond the tolerance.
    ///
    /// ## User Workflow
    /// ```text
    /// Invoice grand total ₹1,180.00, paid ₹700.00
    ///      │
    ///      ▼
    /// record_payment(₹500.00)
    ///      │
    ///      ▼
    /// OverpaymentRejected { amount: ₹500.00, outstanding: ₹480.00 }
    /// ```
    #[error("Payment of {amount} exceeds outstanding balance {outstanding}")]
    OverpaymentRejected { amount: Money, outstanding: Money },

    /// The payment row is already reversed, is itself a reversal, or is
    /// already referenced by a reversal.
    #[error("Payment {0} is already reversed or cannot be reversed")]
    AlreadyReversed(String),

    /// Cancellation refused by the integrity checker.
    #[error("Cancellation blocked: {}", reasons.join("; "))]
    CancellationBlocked { reasons: Vec<String> },

    /// Payment or adjustment attempted on a DRAFT or CANCELLED invoice.
    #[error("Invoice {invoice_id} is {status}, payments require FINALIZED")]
    InvoiceNotFinalized { invoice_id: String, status: String },

    /// A lifecycle transition not in the state table.
    #[error("Invoice cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Lines of a finalized or cancelled invoice are frozen.
    #[error("Invoice {0} is locked; lines can only change while DRAFT")]
    InvoiceLocked(String),

    /// Advance collection refused for the job.
    #[error("Advance not allowed for job {job_id}: {reason}")]
    AdvanceNotAllowed { job_id: String, reason: String },

    /// Invoices are only raised from fully closed jobs.
    #[error("Job {job_id} is {status}; only CLOSED jobs can be invoiced")]
    JobNotClosed { job_id: String, status: String },

    /// The job already has a non-cancelled invoice.
    #[error("Job {job_id} already has invoice {invoice_id}")]
    InvoiceAlreadyExists { job_id: String, invoice_id: String },

    /// A referenced record does not exist (or belongs to another company).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Header totals disagree with the line totals beyond tolerance.
    #[error("Header total {header} does not reconcile with line total {lines}")]
    ReconciliationFailed { header: Money, lines: Money },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidTaxContext(_) => "INVALID_TAX_CONTEXT",
            CoreError::EmptyInvoice => "EMPTY_INVOICE",
            CoreError::SequenceExhaustion { .. } => "SEQUENCE_EXHAUSTION",
            CoreError::OverpaymentRejected { .. } => "OVERPAYMENT_REJECTED",
            CoreError::AlreadyReversed(_) => "ALREADY_REVERSED",
            CoreError::CancellationBlocked { .. } => "CANCELLATION_BLOCKED",
            CoreError::InvoiceNotFinalized { .. } => "INVOICE_NOT_FINALIZED",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::InvoiceLocked(_) => "INVOICE_LOCKED",
            CoreError::AdvanceNotAllowed { .. } => "ADVANCE_NOT_ALLOWED",
            CoreError::JobNotClosed { .. } => "JOB_NOT_CLOSED",
            CoreError::InvoiceAlreadyExists { .. } => "INVOICE_ALREADY_EXISTS",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::ReconciliationFailed { .. } => "RECONCILIATION_FAILED",
            CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before ledger rules run.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value does not fit the ledger's integer paise.
    #[error("{field} is too large")]
    TooLarge { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
