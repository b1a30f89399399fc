//! # Dependency / Reversal Integrity Checker
//!
//! Decides whether a record may be cancelled or deleted given what depends
//! on it. Every check is a pure function over a dependency summary that the
//! database layer gathers; nothing here mutates anything.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────────────┐
//! │ Invoice cancellation │ blocked by PAYMENT rows without a REVERSAL,      │
//! │                      │ or by the invoice already being CANCELLED;       │
//! │                      │ advance adjustments are released, not blocking   │
//! ├──────────────────────┼──────────────────────────────────────────────────┤
//! │ Job deletion         │ blocked by any payment, advance, adjustment or   │
//! │                      │ invoice (cancelled ones included), posted        │
//! │                      │ inventory movements, or CLOSED with posted stock │
//! ├──────────────────────┼──────────────────────────────────────────────────┤
//! │ Purchase deletion    │ blocked by any purchase payment (reversed ones   │
//! │                      │ stay on record), posted inventory movements,     │
//! │                      │ or FINALIZED with posted stock                   │
//! └──────────────────────┴──────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{EntityKind, InvoiceStatus, JobStatus, PurchaseStatus};

/// Outcome of a dependency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DependencyReport {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub can_proceed: bool,
    pub blocking_reasons: Vec<String>,
    /// Non-blocking notes the caller should surface.
    pub warnings: Vec<String>,
}

impl DependencyReport {
    fn new(
        entity_kind: EntityKind,
        entity_id: &str,
        blocking_reasons: Vec<String>,
        warnings: Vec<String>,
    ) -> Self {
        DependencyReport {
            entity_kind,
            entity_id: entity_id.to_string(),
            can_proceed: blocking_reasons.is_empty(),
            blocking_reasons,
            warnings,
        }
    }
}

fn plural(n: i64, word: &str) -> String {
    if n == 1 {
        format!("1 {word}")
    } else {
        format!("{n} {word}s")
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// What depends on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvoiceDependencies {
    pub status: Option<InvoiceStatus>,
    /// Receipt numbers (or ids) of PAYMENT rows with no REVERSAL.
    pub unreversed_payments: Vec<String>,
    pub unreversed_total: Money,
    /// Advance adjustments not yet released back to their advances.
    pub live_adjustment_count: i64,
    pub live_adjusted_total: Money,
}

/// Checks whether an invoice may be cancelled.
///
/// Live advance adjustments do not block: cancelling releases them so the
/// advance money goes back to the job.
pub fn check_invoice_cancellation(invoice_id: &str, deps: &InvoiceDependencies) -> DependencyReport {
    let mut blocking = Vec::new();
    let mut warnings = Vec::new();

    if deps.status == Some(InvoiceStatus::Cancelled) {
        blocking.push("invoice is already cancelled".to_string());
    }

    if !deps.unreversed_payments.is_empty() {
        blocking.push(format!(
            "{} totalling {} must be reversed first ({})",
            plural(deps.unreversed_payments.len() as i64, "unreversed payment"),
            deps.unreversed_total,
            deps.unreversed_payments.join(", ")
        ));
    }

    if deps.live_adjustment_count > 0 {
        warnings.push(format!(
            "{} of {} will be released back to the job's advances",
            plural(deps.live_adjustment_count, "advance adjustment"),
            deps.live_adjusted_total
        ));
    }

    DependencyReport::new(EntityKind::Invoice, invoice_id, blocking, warnings)
}

// =============================================================================
// Job
// =============================================================================

/// An invoice raised from a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedInvoice {
    /// Invoice number, or id for a draft.
    pub label: String,
    pub status: InvoiceStatus,
}

/// What depends on a job card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDependencies {
    pub status: JobStatus,
    pub stock_posted: bool,
    /// PAYMENT rows on any of the job's invoices, reversed or not.
    pub payment_count: i64,
    pub advance_count: i64,
    pub advance_adjustment_count: i64,
    /// Every invoice raised from the job, cancelled ones included.
    pub invoices: Vec<LinkedInvoice>,
    pub posted_movement_count: i64,
}

/// Checks whether a job card may be deleted.
pub fn check_job_deletion(job_id: &str, deps: &JobDependencies) -> DependencyReport {
    let mut blocking = Vec::new();

    if deps.payment_count > 0 {
        blocking.push(format!(
            "{} linked to the job's invoices",
            plural(deps.payment_count, "payment")
        ));
    }
    if deps.advance_count > 0 {
        blocking.push(format!("{} collected", plural(deps.advance_count, "advance")));
    }
    if deps.advance_adjustment_count > 0 {
        blocking.push(format!(
            "{} against the job's invoices",
            plural(deps.advance_adjustment_count, "advance adjustment")
        ));
    }

    let (open, closed): (Vec<&LinkedInvoice>, Vec<&LinkedInvoice>) = deps
        .invoices
        .iter()
        .partition(|i| matches!(i.status, InvoiceStatus::Draft | InvoiceStatus::Finalized));
    if !open.is_empty() {
        blocking.push(format!("open invoice(s): {}", labels(&open)));
    }
    if !closed.is_empty() {
        blocking.push(format!("cancelled invoice(s) kept on record: {}", labels(&closed)));
    }

    if deps.posted_movement_count > 0 {
        blocking.push(format!(
            "{} posted",
            plural(deps.posted_movement_count, "inventory movement")
        ));
    }
    if deps.status == JobStatus::Closed && deps.stock_posted {
        blocking.push("job is closed with stock posted".to_string());
    }

    DependencyReport::new(EntityKind::Job, job_id, blocking, Vec::new())
}

fn labels(invoices: &[&LinkedInvoice]) -> String {
    invoices
        .iter()
        .map(|i| i.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Purchase
// =============================================================================

/// What depends on a purchase bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseDependencies {
    pub status: PurchaseStatus,
    pub stock_posted: bool,
    /// Every payment row, reversed or not.
    pub payment_count: i64,
    pub unreversed_payment_count: i64,
    pub posted_movement_count: i64,
}

/// Checks whether a purchase may be deleted.
pub fn check_purchase_deletion(purchase_id: &str, deps: &PurchaseDependencies) -> DependencyReport {
    let mut blocking = Vec::new();

    if deps.unreversed_payment_count > 0 {
        blocking.push(format!(
            "{} must be reversed first",
            plural(deps.unreversed_payment_count, "unreversed payment")
        ));
    }
    let reversed = deps.payment_count - deps.unreversed_payment_count;
    if reversed > 0 {
        blocking.push(format!(
            "{} kept on record",
            plural(reversed, "reversed payment")
        ));
    }
    if deps.posted_movement_count > 0 {
        blocking.push(format!(
            "{} posted",
            plural(deps.posted_movement_count, "inventory movement")
        ));
    }
    if deps.status == PurchaseStatus::Finalized && deps.stock_posted {
        blocking.push("purchase is finalized with stock posted".to_string());
    }

    DependencyReport::new(EntityKind::Purchase, purchase_id, blocking, Vec::new())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_with_unreversed_payment_is_blocked() {
        let deps = InvoiceDependencies {
            status: Some(InvoiceStatus::Finalized),
            unreversed_payments: vec!["RCPT/2025-26/00001".to_string()],
            unreversed_total: Money::from_rupees(700),
            ..Default::default()
        };
        let report = check_invoice_cancellation("inv-1", &deps);
        assert!(!report.can_proceed);
        assert_eq!(
            report.blocking_reasons,
            vec!["1 unreversed payment totalling ₹700.00 must be reversed first (RCPT/2025-26/00001)"]
        );
    }

    #[test]
    fn test_adjusted_invoice_may_cancel_and_releases_advances() {
        let deps = InvoiceDependencies {
            status: Some(InvoiceStatus::Finalized),
            live_adjustment_count: 2,
            live_adjusted_total: Money::from_rupees(650),
            ..Default::default()
        };
        let report = check_invoice_cancellation("inv-1", &deps);
        assert!(report.can_proceed);
        assert_eq!(
            report.warnings,
            vec!["2 advance adjustments of ₹650.00 will be released back to the job's advances"]
        );
    }

    #[test]
    fn test_cancelled_invoice_is_blocked() {
        let deps = InvoiceDependencies {
            status: Some(InvoiceStatus::Cancelled),
            ..Default::default()
        };
        assert!(!check_invoice_cancellation("inv-1", &deps).can_proceed);
    }

    #[test]
    fn test_job_deletion() {
        let clean = JobDependencies {
            status: JobStatus::Open,
            stock_posted: false,
            payment_count: 0,
            advance_count: 0,
            advance_adjustment_count: 0,
            invoices: vec![],
            posted_movement_count: 0,
        };
        assert!(check_job_deletion("job-1", &clean).can_proceed);

        let closed = JobDependencies {
            status: JobStatus::Closed,
            stock_posted: true,
            ..clean.clone()
        };
        assert!(!check_job_deletion("job-1", &closed).can_proceed);

        let invoiced = JobDependencies {
            invoices: vec![LinkedInvoice {
                label: "INV/2025-26/00007".to_string(),
                status: InvoiceStatus::Finalized,
            }],
            advance_count: 1,
            advance_adjustment_count: 1,
            ..clean
        };
        let report = check_job_deletion("job-1", &invoiced);
        assert_eq!(report.blocking_reasons.len(), 3);
    }

    #[test]
    fn test_cancelled_invoice_still_blocks_job_deletion() {
        let deps = JobDependencies {
            status: JobStatus::Closed,
            stock_posted: false,
            payment_count: 0,
            advance_count: 0,
            advance_adjustment_count: 0,
            invoices: vec![LinkedInvoice {
                label: "INV/2025-26/00003".to_string(),
                status: InvoiceStatus::Cancelled,
            }],
            posted_movement_count: 0,
        };
        let report = check_job_deletion("job-1", &deps);
        assert!(!report.can_proceed);
        assert_eq!(
            report.blocking_reasons,
            vec!["cancelled invoice(s) kept on record: INV/2025-26/00003"]
        );
    }

    #[test]
    fn test_purchase_deletion() {
        let deps = PurchaseDependencies {
            status: PurchaseStatus::Draft,
            stock_posted: false,
            payment_count: 0,
            unreversed_payment_count: 0,
            posted_movement_count: 0,
        };
        assert!(check_purchase_deletion("p-1", &deps).can_proceed);

        let finalized = PurchaseDependencies {
            status: PurchaseStatus::Finalized,
            stock_posted: true,
            payment_count: 1,
            unreversed_payment_count: 1,
            posted_movement_count: 3,
        };
        let report = check_purchase_deletion("p-1", &finalized);
        assert!(!report.can_proceed);
        assert_eq!(report.blocking_reasons.len(), 3);
    }

    #[test]
    fn test_reversed_purchase_payment_still_blocks_deletion() {
        let deps = PurchaseDependencies {
            status: PurchaseStatus::Draft,
            stock_posted: false,
            payment_count: 1,
            unreversed_payment_count: 0,
            posted_movement_count: 0,
        };
        let report = check_purchase_deletion("p-1", &deps);
        assert!(!report.can_proceed);
        assert_eq!(report.blocking_reasons, vec!["1 reversed payment kept on record"]);
    }
}
