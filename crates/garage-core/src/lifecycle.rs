//! # Invoice Lifecycle State Machine
//!
//! ## State Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   (job CLOSED) ──CREATE──► DRAFT ──FINALIZE──► FINALIZED                │
//! │                            │  ▲                    │                    │
//! │                  EDIT_LINES└──┘                    │ CANCEL             │
//! │                            │                       │ (integrity check)  │
//! │                            └──CANCEL──► CANCELLED ◄┘                    │
//! │                                          (terminal)                     │
//! │                                                                         │
//! │   Every transition appends exactly one status history row.              │
//! │   CANCELLED forces payment_status = CANCELLED.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::records::{Branch, CounterpartySnapshot, Customer, Invoice, Job};
use crate::types::{InvoiceStatus, JobStatus, StatusAction, TaxRegime};

/// Applies a lifecycle action to a status.
///
/// ## Errors
/// - `InvoiceLocked` for `EditLines` outside DRAFT
/// - `InvalidTransition` for anything else not in the state table
pub fn transition(
    invoice_id: &str,
    from: InvoiceStatus,
    action: StatusAction,
) -> CoreResult<InvoiceStatus> {
    use InvoiceStatus::*;

    match (from, action) {
        (Draft, StatusAction::EditLines) => Ok(Draft),
        (_, StatusAction::EditLines) => Err(CoreError::InvoiceLocked(invoice_id.to_string())),
        (Draft, StatusAction::Finalize) => Ok(Finalized),
        (Draft, StatusAction::Cancel) | (Finalized, StatusAction::Cancel) => Ok(Cancelled),
        (from, action) => Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: match action {
                StatusAction::Create => "CREATE".to_string(),
                StatusAction::Finalize => Finalized.to_string(),
                StatusAction::Cancel => Cancelled.to_string(),
                StatusAction::EditLines => Draft.to_string(),
            },
        }),
    }
}

/// Checks that a job may be invoiced.
pub fn check_invoiceable(job: &Job, existing: Option<&Invoice>) -> CoreResult<()> {
    if job.status != JobStatus::Closed {
        return Err(CoreError::JobNotClosed {
            job_id: job.id.clone(),
            status: job.status.as_str().to_string(),
        });
    }

    if let Some(invoice) = existing.filter(|i| i.status != InvoiceStatus::Cancelled) {
        return Err(CoreError::InvoiceAlreadyExists {
            job_id: job.id.clone(),
            invoice_id: invoice.id.clone(),
        });
    }

    Ok(())
}

/// Freezes the counterparties at finalize time.
pub fn snapshot_counterparties(
    branch: &Branch,
    customer: &Customer,
    tax_regime: TaxRegime,
    captured_at: DateTime<Utc>,
) -> CounterpartySnapshot {
    CounterpartySnapshot {
        branch: branch.clone(),
        customer: customer.clone(),
        tax_regime,
        captured_at,
    }
}

/// Result of a cancellation request.
///
/// A blocked cancellation is a normal outcome, not an error: `cancelled` is
/// false and the reasons say what must be reversed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CancellationResult {
    pub cancelled: bool,
    pub blocking_reasons: Vec<String>,
    pub warnings: Vec<String>,
}

impl CancellationResult {
    pub fn done(warnings: Vec<String>) -> Self {
        CancellationResult {
            cancelled: true,
            blocking_reasons: Vec::new(),
            warnings,
        }
    }

    pub fn blocked(blocking_reasons: Vec<String>) -> Self {
        CancellationResult {
            cancelled: false,
            blocking_reasons,
            warnings: Vec::new(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus) -> Job {
        Job {
            id: "job-1".to_string(),
            company_id: "co".to_string(),
            branch_id: "br".to_string(),
            customer_id: "cu".to_string(),
            job_number: "JC-0001".to_string(),
            status,
            stock_posted: true,
            closed_at: None,
            lock_version: 0,
        }
    }

    #[test]
    fn test_allowed_transitions() {
        use InvoiceStatus::*;
        assert_eq!(transition("i", Draft, StatusAction::Finalize).unwrap(), Finalized);
        assert_eq!(transition("i", Draft, StatusAction::Cancel).unwrap(), Cancelled);
        assert_eq!(transition("i", Finalized, StatusAction::Cancel).unwrap(), Cancelled);
        assert_eq!(transition("i", Draft, StatusAction::EditLines).unwrap(), Draft);
    }

    #[test]
    fn test_rejected_transitions() {
        use InvoiceStatus::*;
        assert!(matches!(
            transition("i", Finalized, StatusAction::Finalize),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition("i", Cancelled, StatusAction::Cancel),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition("i", Cancelled, StatusAction::Finalize),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition("i", Finalized, StatusAction::EditLines),
            Err(CoreError::InvoiceLocked(_))
        ));
    }

    #[test]
    fn test_only_closed_jobs_are_invoiceable() {
        assert!(check_invoiceable(&job(JobStatus::Closed), None).is_ok());
        assert!(matches!(
            check_invoiceable(&job(JobStatus::InProgress), None),
            Err(CoreError::JobNotClosed { .. })
        ));
    }
}
