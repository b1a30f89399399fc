//! # Payment / Advance Ledger Rules
//!
//! Pure rules behind the append-only money ledger. The database layer loads
//! the rows inside its transaction, asks these functions what is allowed and
//! what the new derived state is, then writes.
//!
//! ## Settlement Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  net_paid   = Σ PAYMENT rows not reversed                               │
//! │  adjusted   = Σ advance adjustments against the invoice                 │
//! │  settled    = net_paid + adjusted                                       │
//! │  outstanding= max(0, grand_total − settled)                             │
//! │                                                                         │
//! │  payment_status                                                         │
//! │    invoice CANCELLED             → CANCELLED                            │
//! │    settled ≤ 0 (and total > 0)   → UNPAID                               │
//! │    settled ≥ total − tolerance   → PAID                                 │
//! │    otherwise                     → PARTIAL                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::records::{Advance, PaymentEntry};
use crate::types::{EntryKind, InvoiceStatus, JobStatus, PaymentMode, PaymentStatus};
use crate::validation::validate_payment_amount;

/// Slack allowed when comparing a payment against the outstanding balance.
pub const PAYMENT_TOLERANCE: Money = Money::from_paise(1);

/// Mode summary when more than one distinct mode settled an invoice.
pub const MIXED_MODES: &str = "MIXED";

// =============================================================================
// Derived Balances
// =============================================================================

/// Sum of PAYMENT rows that have not been reversed.
pub fn net_paid(entries: &[PaymentEntry]) -> Money {
    entries
        .iter()
        .filter(|e| e.is_live_payment())
        .map(|e| e.amount)
        .sum()
}

/// `max(0, grand_total − net_paid − adjusted)`.
pub fn outstanding(grand_total: Money, net_paid: Money, adjusted: Money) -> Money {
    (grand_total - net_paid - adjusted).non_negative()
}

/// Derives the settlement status of an invoice.
pub fn payment_status(
    invoice_status: InvoiceStatus,
    grand_total: Money,
    settled: Money,
    tolerance: Money,
) -> PaymentStatus {
    if invoice_status == InvoiceStatus::Cancelled {
        return PaymentStatus::Cancelled;
    }
    if !grand_total.is_positive() {
        return PaymentStatus::Paid;
    }
    if !settled.is_positive() {
        PaymentStatus::Unpaid
    } else if settled >= grand_total - tolerance {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    }
}

/// Derived settlement state of one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    pub invoice_id: String,
    pub grand_total: Money,
    pub net_paid: Money,
    pub advance_adjusted: Money,
    pub outstanding: Money,
    pub payment_status: PaymentStatus,
    pub payment_mode_summary: Option<String>,
}

/// Recomputes the settlement of an invoice from its ledger rows.
pub fn settle(
    invoice_id: &str,
    invoice_status: InvoiceStatus,
    grand_total: Money,
    entries: &[PaymentEntry],
    advance_adjusted: Money,
    tolerance: Money,
) -> Settlement {
    let paid = net_paid(entries);
    Settlement {
        invoice_id: invoice_id.to_string(),
        grand_total,
        net_paid: paid,
        advance_adjusted,
        outstanding: outstanding(grand_total, paid, advance_adjusted),
        payment_status: payment_status(invoice_status, grand_total, paid + advance_adjusted, tolerance),
        payment_mode_summary: mode_summary(entries),
    }
}

/// Summarises the modes of live payments: one mode name, "MIXED" for more
/// than one distinct mode, or `None` when nothing is paid.
pub fn mode_summary(entries: &[PaymentEntry]) -> Option<String> {
    let modes: BTreeSet<PaymentMode> = entries
        .iter()
        .filter(|e| e.is_live_payment())
        .map(|e| e.mode)
        .collect();

    match modes.len() {
        0 => None,
        1 => modes.iter().next().map(|m| m.as_str().to_string()),
        _ => Some(MIXED_MODES.to_string()),
    }
}

// =============================================================================
// Guards
// =============================================================================

/// Checks that a payment may be recorded.
///
/// ## Errors
/// - `Validation` for a non-positive amount
/// - `InvoiceNotFinalized` unless the invoice is FINALIZED
/// - `OverpaymentRejected` when `amount > outstanding + tolerance`
pub fn check_payment(
    invoice_id: &str,
    invoice_status: InvoiceStatus,
    amount: Money,
    outstanding: Money,
    tolerance: Money,
) -> CoreResult<()> {
    validate_payment_amount(amount)?;

    if invoice_status != InvoiceStatus::Finalized {
        return Err(CoreError::InvoiceNotFinalized {
            invoice_id: invoice_id.to_string(),
            status: invoice_status.to_string(),
        });
    }

    if amount > outstanding + tolerance {
        return Err(CoreError::OverpaymentRejected {
            amount,
            outstanding,
        });
    }

    Ok(())
}

/// Checks that a ledger row may be reversed.
///
/// `has_reversal` is whether any REVERSAL row already references it.
pub fn check_reversible(entry: &PaymentEntry, has_reversal: bool) -> CoreResult<()> {
    if entry.entry_kind == EntryKind::Reversal || entry.is_reversed || has_reversal {
        return Err(CoreError::AlreadyReversed(entry.id.clone()));
    }
    Ok(())
}

/// Checks that an advance may be collected against a job.
///
/// Cancelled jobs never take advances; a closed job whose billing has
/// started (a DRAFT or FINALIZED invoice exists) must be settled on the
/// invoice instead.
pub fn check_advance_allowed(
    job_id: &str,
    job_status: JobStatus,
    has_open_invoice: bool,
) -> CoreResult<()> {
    match job_status {
        JobStatus::Cancelled => Err(CoreError::AdvanceNotAllowed {
            job_id: job_id.to_string(),
            reason: "job is cancelled".to_string(),
        }),
        JobStatus::Closed if has_open_invoice => Err(CoreError::AdvanceNotAllowed {
            job_id: job_id.to_string(),
            reason: "job is closed and already invoiced".to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Advance Allocation
// =============================================================================

/// One planned (advance → invoice) adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub advance_id: String,
    pub amount: Money,
    pub new_adjusted: Money,
    pub new_balance: Money,
}

/// Plans how open advances settle an invoice balance, oldest first
/// (by `received_on`, then `id`).
///
/// Advances already adjusted against this invoice must be excluded by the
/// caller; the plan never contains one advance twice.
pub fn allocate_advances(invoice_balance: Money, advances: &[Advance]) -> Vec<Allocation> {
    let mut open: Vec<&Advance> = advances
        .iter()
        .filter(|a| a.balance_amount.is_positive())
        .collect();
    open.sort_by(|a, b| advance_order_key(a).cmp(&advance_order_key(b)));

    let mut remaining = invoice_balance;
    let mut plan = Vec::new();

    for advance in open {
        if !remaining.is_positive() {
            break;
        }
        let take = advance.balance_amount.min(remaining);
        remaining -= take;
        plan.push(Allocation {
            advance_id: advance.id.clone(),
            amount: take,
            new_adjusted: advance.adjusted_amount + take,
            new_balance: advance.balance_amount - take,
        });
    }

    plan
}

/// Oldest-first ordering key of an advance.
pub fn advance_order_key(advance: &Advance) -> (NaiveDate, &str) {
    (advance.received_on, advance.id.as_str())
}

// =============================================================================
// Unit Tests
// =============================================================================
