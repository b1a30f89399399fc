//! # Ledger Service
//!
//! The invoice/payment ledger's public surface. Each mutating call is one
//! SQLite transaction built from the repository free functions; the pure
//! rules come from `garage_core`.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate inputs (no database yet)                                   │
//! │  2. BEGIN                                                               │
//! │  3. first statement is a write on the scope row                         │
//! │       invoice / job lock_version + 1  ─► SQLite writer lock held        │
//! │  4. read state, ask garage-core what is allowed and what changes        │
//! │  5. write rows, allocate numbers, append history                        │
//! │  6. COMMIT  ─► log, notify collaborators, return                        │
//! │                                                                         │
//! │  Any `?` between 2 and 6 drops the transaction: nothing is written,     │
//! │  no number is consumed.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use garage_core::integrity::check_invoice_cancellation;
use garage_core::ledger::{
    allocate_advances, check_advance_allowed, check_payment, check_reversible, payment_status,
    settle, Settlement,
};
use garage_core::lifecycle::{check_invoiceable, snapshot_counterparties, transition};
use garage_core::numbering::SequenceScope;
use garage_core::tax::{calculate_lines, determine_regime};
use garage_core::totals::{aggregate, reconcile};
use garage_core::validation::{
    normalize_note, normalize_reference, validate_payment_amount, validate_reason,
};
use garage_core::{
    Advance, AdvanceAdjustment, CancellationResult, CoreError, DependencyReport, DocumentKind,
    EntityKind, EntryKind, Invoice, InvoiceStatus, Job, JobStatus, LineInput, Money, PaymentAction,
    PaymentEntry, PaymentHistoryEntry, PaymentMode, PaymentStatus, RequestContext, StatusAction,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{LedgerConfig, LedgerSettings, NumberingSettings};
use crate::error::{DbError, DbResult, LedgerResult};
use crate::pool::Database;
use crate::repository::{advance, directory, invoice, job, payment, sequence};

// =============================================================================
// Collaborators
// =============================================================================

/// Inventory side of a job close.
///
/// Called after the close has committed. Failures are logged and never
/// undo the close.
pub trait InventoryNotifier: Send + Sync {
    fn job_closed(&self, job: &Job) -> Result<(), String>;
}

/// Notifier for hosts without an inventory module.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl InventoryNotifier for NoopNotifier {
    fn job_closed(&self, job: &Job) -> Result<(), String> {
        debug!(job_id = %job.id, "No inventory notifier configured");
        Ok(())
    }
}

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    pub mode: PaymentMode,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub job_id: String,
    pub amount: Money,
    pub mode: PaymentMode,
    pub received_on: NaiveDate,
    pub reference: Option<String>,
    pub note: Option<String>,
}

/// Ledger rows and audit events of one invoice, both oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHistory {
    pub invoice_id: String,
    pub entries: Vec<PaymentEntry>,
    pub events: Vec<PaymentHistoryEntry>,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct LedgerService {
    db: Database,
    numbering: NumberingSettings,
    settings: LedgerSettings,
    notifier: Arc<dyn InventoryNotifier>,
}

impl LedgerService {
    pub fn new(db: Database, config: &LedgerConfig) -> Self {
        LedgerService {
            db,
            numbering: config.numbering.clone(),
            settings: config.ledger.clone(),
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn InventoryNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Invoice Lifecycle
    // =========================================================================

    /// Raises a DRAFT invoice from a CLOSED job.
    ///
    /// ## Errors
    /// - `JobNotClosed`, `InvoiceAlreadyExists`
    /// - `InvalidTaxContext` when the branch or customer has no state
    /// - `EmptyInvoice` when the job has no billable lines
    pub async fn create_invoice_from_job(
        &self,
        ctx: &RequestContext,
        job_id: &str,
        invoice_date: NaiveDate,
    ) -> LedgerResult<Invoice> {
        let mut tx = self.db.pool().begin().await?;
        job::bump(&mut tx, job_id, &ctx.company_id).await?;

        let job = job::get(&mut tx, job_id).await?;
        let existing = invoice::live_for_job(&mut tx, job_id).await?;
        check_invoiceable(&job, existing.as_ref())?;

        let branch = directory::branch(&mut tx, &job.branch_id).await?;
        let customer = directory::customer(&mut tx, &job.customer_id).await?;
        let regime = determine_regime(branch.state.as_deref(), customer.state.as_deref())?;

        let inputs = job::lines(&mut tx, job_id).await?;
        let lines = calculate_lines(&inputs, regime)?;
        let totals = aggregate(&lines)?;

        let now = Utc::now();
        let draft = Invoice {
            id: Uuid::new_v4().to_string(),
            company_id: ctx.company_id.clone(),
            branch_id: job.branch_id.clone(),
            job_id: job.id.clone(),
            customer_id: job.customer_id.clone(),
            invoice_number: None,
            fiscal_year: None,
            sequence_number: None,
            invoice_date,
            status: InvoiceStatus::Draft,
            payment_status: PaymentStatus::Unpaid,
            payment_mode_summary: None,
            tax_regime: regime,
            subtotal_service: totals.subtotal_service,
            subtotal_parts: totals.subtotal_parts,
            taxable_amount: totals.taxable_amount,
            cgst_amount: totals.cgst_amount,
            sgst_amount: totals.sgst_amount,
            igst_amount: totals.igst_amount,
            total_tax_amount: totals.total_tax_amount,
            gross_total: totals.gross_total,
            round_off: totals.round_off,
            grand_total: totals.grand_total,
            counterparty_snapshot: None,
            cancel_reason: None,
            lock_version: 0,
            created_by: ctx.actor_id.clone(),
            created_at: now,
            updated_at: now,
            finalized_at: None,
            cancelled_at: None,
        };

        invoice::insert(&mut tx, &draft).await?;
        invoice::insert_lines(&mut tx, &draft.id, &lines).await?;
        invoice::append_status(
            &mut tx,
            &draft.id,
            None,
            InvoiceStatus::Draft,
            StatusAction::Create,
            None,
            Some(json!({ "job_id": job.id, "line_count": lines.len() })),
            &ctx.actor_id,
        )
        .await?;

        tx.commit().await?;

        info!(invoice_id = %draft.id, job_id, grand_total = %draft.grand_total, "Draft invoice created");
        Ok(draft)
    }

    /// Replaces the lines of a DRAFT invoice and recomputes its totals with
    /// the counterparties' current regime.
    pub async fn replace_draft_lines(
        &self,
        ctx: &RequestContext,
        invoice_id: &str,
        inputs: &[LineInput],
    ) -> LedgerResult<Invoice> {
        let mut tx = self.db.pool().begin().await?;
        invoice::bump(&mut tx, invoice_id, &ctx.company_id).await?;

        let current = invoice::get(&mut tx, invoice_id).await?;
        transition(invoice_id, current.status, StatusAction::EditLines)?;

        let branch = directory::branch(&mut tx, &current.branch_id).await?;
        let customer = directory::customer(&mut tx, &current.customer_id).await?;
        let regime = determine_regime(branch.state.as_deref(), customer.state.as_deref())?;

        let lines = calculate_lines(inputs, regime)?;
        let totals = aggregate(&lines)?;
        let now = Utc::now();

        invoice::delete_lines(&mut tx, invoice_id).await?;
        invoice::insert_lines(&mut tx, invoice_id, &lines).await?;
        invoice::update_totals(&mut tx, invoice_id, regime, &totals, now).await?;
        invoice::append_status(
            &mut tx,
            invoice_id,
            Some(InvoiceStatus::Draft),
            InvoiceStatus::Draft,
            StatusAction::EditLines,
            None,
            Some(json!({
                "line_count": lines.len(),
                "previous_grand_total": current.grand_total,
                "grand_total": totals.grand_total,
            })),
            &ctx.actor_id,
        )
        .await?;

        let updated = invoice::get(&mut tx, invoice_id).await?;
        tx.commit().await?;

        info!(invoice_id, grand_total = %updated.grand_total, "Draft lines replaced");
        Ok(updated)
    }

    /// Numbers a DRAFT invoice, freezes its counterparties and locks its
    /// lines.
    ///
    /// ## Errors
    /// - `InvalidTransition` unless DRAFT
    /// - `ReconciliationFailed` when the header drifted from the lines
    /// - `InvalidTaxContext` when the counterparties' regime changed since
    ///   the draft was priced
    pub async fn finalize_invoice(&self, ctx: &RequestContext, invoice_id: &str) -> LedgerResult<Invoice> {
        let mut tx = self.db.pool().begin().await?;
        invoice::bump(&mut tx, invoice_id, &ctx.company_id).await?;

        let draft = invoice::get(&mut tx, invoice_id).await?;
        let to = transition(invoice_id, draft.status, StatusAction::Finalize)?;

        let lines = invoice::lines(&mut tx, invoice_id).await?;
        if lines.is_empty() {
            return Err(CoreError::EmptyInvoice.into());
        }
        reconcile(&lines, &draft.totals(), self.settings.reconcile_tolerance())?;

        let branch = directory::branch(&mut tx, &draft.branch_id).await?;
        let customer = directory::customer(&mut tx, &draft.customer_id).await?;
        let regime = determine_regime(branch.state.as_deref(), customer.state.as_deref())?;
        if regime != draft.tax_regime {
            return Err(CoreError::InvalidTaxContext(format!(
                "tax regime changed from {:?} to {:?} since the draft was priced; replace the lines first",
                draft.tax_regime, regime
            ))
            .into());
        }

        let fiscal_year = sequence::fiscal_year_for(&mut tx, &ctx.company_id, draft.invoice_date).await?;
        let scope = SequenceScope {
            company_id: ctx.company_id.clone(),
            branch_id: draft.branch_id.clone(),
            fiscal_year,
            document_kind: DocumentKind::Invoice,
        };
        let number = sequence::allocate(
            &mut tx,
            &scope,
            &[
                branch.invoice_prefix.as_deref(),
                self.numbering.invoice_prefix.as_deref(),
            ],
        )
        .await?;

        let now = Utc::now();
        let snapshot = snapshot_counterparties(&branch, &customer, regime, now);
        let snapshot_json = serde_json::to_string(&snapshot).map_err(DbError::from)?;
        let status = payment_status(to, draft.grand_total, Money::zero(), self.settings.payment_tolerance());

        invoice::mark_finalized(&mut tx, invoice_id, &number, &snapshot_json, status, now).await?;
        invoice::append_status(
            &mut tx,
            invoice_id,
            Some(draft.status),
            to,
            StatusAction::Finalize,
            None,
            Some(json!({
                "invoice_number": number.formatted_number,
                "grand_total": draft.grand_total,
            })),
            &ctx.actor_id,
        )
        .await?;

        let finalized = invoice::get(&mut tx, invoice_id).await?;
        tx.commit().await?;

        info!(invoice_id, number = %number.formatted_number, grand_total = %finalized.grand_total, "Invoice finalized");
        Ok(finalized)
    }

    /// Cancels an invoice when no unreversed payment remains.
    ///
    /// A blocked cancellation is returned, not raised: nothing is written
    /// and `blocking_reasons` says what to reverse first. Advance money the
    /// invoice consumed is released back to its advances in the same
    /// transaction, so a later invoice for the job can use it.
    pub async fn cancel_invoice(
        &self,
        ctx: &RequestContext,
        invoice_id: &str,
        reason: &str,
    ) -> LedgerResult<CancellationResult> {
        let reason = validate_reason("cancel reason", reason)?;

        let mut tx = self.db.pool().begin().await?;
        invoice::bump(&mut tx, invoice_id, &ctx.company_id).await?;

        let deps = crate::repository::dependency::invoice_dependencies(&mut tx, invoice_id).await?;
        let report = check_invoice_cancellation(invoice_id, &deps);
        if !report.can_proceed {
            info!(invoice_id, reasons = ?report.blocking_reasons, "Invoice cancellation blocked");
            return Ok(CancellationResult::blocked(report.blocking_reasons));
        }

        let current = invoice::get(&mut tx, invoice_id).await?;
        let to = transition(invoice_id, current.status, StatusAction::Cancel)?;
        let now = Utc::now();

        invoice::mark_cancelled(&mut tx, invoice_id, &reason, now).await?;

        let mut released = Vec::new();
        for adjustment in advance::live_adjustments(&mut tx, invoice_id).await? {
            released.push(advance::release(&mut tx, &adjustment, &reason, &ctx.actor_id).await?);
        }
        let released_total: Money = released.iter().map(|r| r.released_amount).sum();

        invoice::append_status(
            &mut tx,
            invoice_id,
            Some(current.status),
            to,
            StatusAction::Cancel,
            Some(&reason),
            Some(json!({
                "warnings": report.warnings,
                "released_advances": released
                    .iter()
                    .map(|r| json!({ "advance_id": r.advance_id, "amount": r.released_amount }))
                    .collect::<Vec<_>>(),
            })),
            &ctx.actor_id,
        )
        .await?;
        if !released.is_empty() {
            payment::append_history(
                &mut tx,
                &history_entry(
                    invoice_id,
                    None,
                    PaymentAction::AdvanceReleased,
                    current.payment_status,
                    current.payment_status,
                    released_total,
                    Some(reason.clone()),
                    Some(json!({ "release_ids": released.iter().map(|r| &r.id).collect::<Vec<_>>() })),
                    &ctx.actor_id,
                ),
            )
            .await?;
        }
        payment::append_history(
            &mut tx,
            &history_entry(
                invoice_id,
                None,
                PaymentAction::InvoiceCancelled,
                current.payment_status,
                PaymentStatus::Cancelled,
                Money::zero(),
                Some(reason.clone()),
                None,
                &ctx.actor_id,
            ),
        )
        .await?;

        tx.commit().await?;

        for warning in &report.warnings {
            warn!(invoice_id, %warning, "Invoice cancelled with warning");
        }
        info!(
            invoice_id,
            from = %current.status,
            released = %released_total,
            actor = %ctx.actor_id,
            "Invoice cancelled"
        );
        Ok(CancellationResult::done(report.warnings))
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Records a payment against a FINALIZED invoice and issues its receipt
    /// number.
    pub async fn record_payment(
        &self,
        ctx: &RequestContext,
        invoice_id: &str,
        request: &PaymentRequest,
    ) -> LedgerResult<PaymentEntry> {
        validate_payment_amount(request.amount)?;
        let reference = normalize_reference(request.reference.as_deref())?;
        let note = normalize_note(request.note.as_deref())?;
        let tolerance = self.settings.payment_tolerance();

        let mut tx = self.db.pool().begin().await?;
        invoice::bump(&mut tx, invoice_id, &ctx.company_id).await?;

        let current = invoice::get(&mut tx, invoice_id).await?;
        let mut entries = payment::for_invoice(&mut tx, invoice_id).await?;
        let adjusted = advance::adjusted_total(&mut tx, invoice_id).await?;
        let before = settle(invoice_id, current.status, current.grand_total, &entries, adjusted, tolerance);
        check_payment(invoice_id, current.status, request.amount, before.outstanding, tolerance)?;

        let fiscal_year = sequence::fiscal_year_for(&mut tx, &ctx.company_id, request.paid_on).await?;
        let scope = SequenceScope {
            company_id: ctx.company_id.clone(),
            branch_id: current.branch_id.clone(),
            fiscal_year,
            document_kind: DocumentKind::PaymentReceipt,
        };
        let receipt =
            sequence::allocate(&mut tx, &scope, &[self.numbering.payment_prefix.as_deref()]).await?;

        let now = Utc::now();
        let entry = PaymentEntry {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice_id.to_string(),
            entry_kind: EntryKind::Payment,
            amount: request.amount,
            paid_on: request.paid_on,
            mode: request.mode,
            reference,
            note: note.clone(),
            receipt_number: Some(receipt.formatted_number.clone()),
            reversed_payment_id: None,
            is_reversed: false,
            reversed_at: None,
            reversed_by: None,
            reversal_reason: None,
            created_by: ctx.actor_id.clone(),
            created_at: now,
        };
        payment::insert(&mut tx, &entry).await?;

        entries.push(entry.clone());
        let after = settle(invoice_id, current.status, current.grand_total, &entries, adjusted, tolerance);
        invoice::apply_settlement(&mut tx, &after, now).await?;
        payment::append_history(
            &mut tx,
            &history_entry(
                invoice_id,
                Some(&entry.id),
                PaymentAction::PaymentRecorded,
                current.payment_status,
                after.payment_status,
                entry.amount,
                note,
                Some(json!({
                    "receipt_number": receipt.formatted_number,
                    "mode": entry.mode,
                    "outstanding": after.outstanding,
                })),
                &ctx.actor_id,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(
            invoice_id,
            receipt = %receipt.formatted_number,
            amount = %entry.amount,
            outstanding = %after.outstanding,
            status = %after.payment_status,
            "Payment recorded"
        );
        Ok(entry)
    }

    /// Reverses a PAYMENT with a new negated REVERSAL row. Returns the
    /// REVERSAL row.
    pub async fn reverse_payment(
        &self,
        ctx: &RequestContext,
        payment_id: &str,
        reason: &str,
    ) -> LedgerResult<PaymentEntry> {
        let reason = validate_reason("reversal reason", reason)?;
        let tolerance = self.settings.payment_tolerance();

        let mut tx = self.db.pool().begin().await?;
        let invoice_id = payment::bump_invoice_of(&mut tx, payment_id, &ctx.company_id).await?;

        let original = payment::get(&mut tx, payment_id).await?;
        let has_reversal = payment::has_reversal(&mut tx, payment_id).await?;
        check_reversible(&original, has_reversal)?;

        let now = Utc::now();
        if !payment::flag_reversed(&mut tx, payment_id, &ctx.actor_id, &reason, now).await? {
            return Err(CoreError::AlreadyReversed(payment_id.to_string()).into());
        }

        let reversal = PaymentEntry {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice_id.clone(),
            entry_kind: EntryKind::Reversal,
            amount: -original.amount,
            paid_on: now.date_naive(),
            mode: original.mode,
            reference: original.receipt_number.clone(),
            note: Some(reason.clone()),
            receipt_number: None,
            reversed_payment_id: Some(original.id.clone()),
            is_reversed: false,
            reversed_at: None,
            reversed_by: None,
            reversal_reason: None,
            created_by: ctx.actor_id.clone(),
            created_at: now,
        };
        payment::insert(&mut tx, &reversal).await?;

        let current = invoice::get(&mut tx, &invoice_id).await?;
        let entries = payment::for_invoice(&mut tx, &invoice_id).await?;
        let adjusted = advance::adjusted_total(&mut tx, &invoice_id).await?;
        let after = settle(&invoice_id, current.status, current.grand_total, &entries, adjusted, tolerance);
        invoice::apply_settlement(&mut tx, &after, now).await?;
        payment::append_history(
            &mut tx,
            &history_entry(
                &invoice_id,
                Some(&reversal.id),
                PaymentAction::PaymentReversed,
                current.payment_status,
                after.payment_status,
                reversal.amount,
                Some(reason),
                Some(json!({
                    "reversed_payment_id": original.id,
                    "receipt_number": original.receipt_number,
                    "outstanding": after.outstanding,
                })),
                &ctx.actor_id,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(
            invoice_id = %invoice_id,
            payment_id,
            amount = %original.amount,
            outstanding = %after.outstanding,
            status = %after.payment_status,
            "Payment reversed"
        );
        Ok(reversal)
    }

    // =========================================================================
    // Advances
    // =========================================================================

    /// Collects an advance against a job and issues its receipt number.
    pub async fn collect_advance(&self, ctx: &RequestContext, request: &AdvanceRequest) -> LedgerResult<Advance> {
        validate_payment_amount(request.amount)?;
        let reference = normalize_reference(request.reference.as_deref())?;
        let note = normalize_note(request.note.as_deref())?;

        let mut tx = self.db.pool().begin().await?;
        job::bump(&mut tx, &request.job_id, &ctx.company_id).await?;

        let job = job::get(&mut tx, &request.job_id).await?;
        let has_open_invoice = invoice::live_for_job(&mut tx, &job.id).await?.is_some();
        check_advance_allowed(&job.id, job.status, has_open_invoice)?;

        let fiscal_year = sequence::fiscal_year_for(&mut tx, &ctx.company_id, request.received_on).await?;
        let scope = SequenceScope {
            company_id: ctx.company_id.clone(),
            branch_id: job.branch_id.clone(),
            fiscal_year,
            document_kind: DocumentKind::AdvanceReceipt,
        };
        let receipt =
            sequence::allocate(&mut tx, &scope, &[self.numbering.advance_prefix.as_deref()]).await?;

        let collected = Advance {
            id: Uuid::new_v4().to_string(),
            company_id: ctx.company_id.clone(),
            branch_id: job.branch_id.clone(),
            job_id: job.id.clone(),
            receipt_number: receipt.formatted_number,
            received_on: request.received_on,
            mode: request.mode,
            reference,
            note,
            amount: request.amount,
            adjusted_amount: Money::zero(),
            released_amount: Money::zero(),
            balance_amount: request.amount,
            created_by: ctx.actor_id.clone(),
            created_at: Utc::now(),
        };
        advance::insert(&mut tx, &collected).await?;

        tx.commit().await?;

        info!(job_id = %job.id, receipt = %collected.receipt_number, amount = %collected.amount, "Advance collected");
        Ok(collected)
    }

    /// Settles a FINALIZED invoice from its job's open advances, oldest
    /// first. Running it again adds nothing.
    pub async fn auto_adjust_advances(
        &self,
        ctx: &RequestContext,
        invoice_id: &str,
    ) -> LedgerResult<Vec<AdvanceAdjustment>> {
        let tolerance = self.settings.payment_tolerance();

        let mut tx = self.db.pool().begin().await?;
        invoice::bump(&mut tx, invoice_id, &ctx.company_id).await?;

        let current = invoice::get(&mut tx, invoice_id).await?;
        if current.status != InvoiceStatus::Finalized {
            return Err(CoreError::InvoiceNotFinalized {
                invoice_id: invoice_id.to_string(),
                status: current.status.to_string(),
            }
            .into());
        }

        let entries = payment::for_invoice(&mut tx, invoice_id).await?;
        let adjusted = advance::adjusted_total(&mut tx, invoice_id).await?;
        let before = settle(invoice_id, current.status, current.grand_total, &entries, adjusted, tolerance);

        let open = advance::open_for_invoice(&mut tx, &current.job_id, invoice_id).await?;
        let plan = allocate_advances(before.outstanding, &open);
        if plan.is_empty() {
            debug!(invoice_id, outstanding = %before.outstanding, "No advances to adjust");
            return Ok(Vec::new());
        }

        let mut rows = Vec::with_capacity(plan.len());
        for allocation in &plan {
            advance::apply(&mut tx, allocation).await?;
            rows.push(advance::insert_adjustment(&mut tx, invoice_id, allocation, &ctx.actor_id).await?);
        }

        let applied: Money = plan.iter().map(|a| a.amount).sum();
        let now = Utc::now();
        let after = settle(invoice_id, current.status, current.grand_total, &entries, adjusted + applied, tolerance);
        invoice::apply_settlement(&mut tx, &after, now).await?;
        payment::append_history(
            &mut tx,
            &history_entry(
                invoice_id,
                None,
                PaymentAction::AdvanceAdjusted,
                current.payment_status,
                after.payment_status,
                applied,
                None,
                Some(json!({ "allocations": plan, "outstanding": after.outstanding })),
                &ctx.actor_id,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(invoice_id, adjustments = rows.len(), amount = %applied, outstanding = %after.outstanding, "Advances adjusted");
        Ok(rows)
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Closes a job and notifies the inventory side once committed.
    pub async fn close_job(&self, ctx: &RequestContext, job_id: &str) -> LedgerResult<Job> {
        let mut tx = self.db.pool().begin().await?;
        job::bump(&mut tx, job_id, &ctx.company_id).await?;

        let current = job::get(&mut tx, job_id).await?;
        if !matches!(current.status, JobStatus::Open | JobStatus::InProgress) {
            return Err(CoreError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: JobStatus::Closed.as_str().to_string(),
            }
            .into());
        }

        job::set_status(&mut tx, job_id, JobStatus::Closed, Utc::now()).await?;
        let closed = job::get(&mut tx, job_id).await?;
        tx.commit().await?;

        info!(job_id, job_number = %closed.job_number, "Job closed");

        if let Err(e) = self.notifier.job_closed(&closed) {
            warn!(job_id, error = %e, "Inventory notification failed");
        }
        Ok(closed)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current settlement of an invoice.
    pub async fn outstanding(&self, ctx: &RequestContext, invoice_id: &str) -> LedgerResult<Settlement> {
        let mut conn = self.db.pool().acquire().await?;
        let current = scoped_invoice(&mut conn, ctx, invoice_id).await?;

        let entries = payment::for_invoice(&mut conn, invoice_id).await?;
        let adjusted = advance::adjusted_total(&mut conn, invoice_id).await?;

        Ok(settle(
            invoice_id,
            current.status,
            current.grand_total,
            &entries,
            adjusted,
            self.settings.payment_tolerance(),
        ))
    }

    pub async fn payment_history(&self, ctx: &RequestContext, invoice_id: &str) -> LedgerResult<PaymentHistory> {
        let mut conn = self.db.pool().acquire().await?;
        scoped_invoice(&mut conn, ctx, invoice_id).await?;

        Ok(PaymentHistory {
            invoice_id: invoice_id.to_string(),
            entries: payment::for_invoice(&mut conn, invoice_id).await?,
            events: payment::history(&mut conn, invoice_id).await?,
        })
    }

    /// Whether an invoice could be cancelled, or a job or purchase deleted,
    /// right now.
    pub async fn dependency_report(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        entity_id: &str,
    ) -> LedgerResult<DependencyReport> {
        {
            let mut conn = self.db.pool().acquire().await?;
            ensure_company(&mut conn, ctx, kind, entity_id).await?;
        }
        self.db.dependencies().report(kind, entity_id).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn scoped_invoice(conn: &mut SqliteConnection, ctx: &RequestContext, invoice_id: &str) -> DbResult<Invoice> {
    let found = invoice::get(conn, invoice_id).await?;
    if found.company_id != ctx.company_id {
        return Err(DbError::not_found("Invoice", invoice_id));
    }
    Ok(found)
}

async fn ensure_company(
    conn: &mut SqliteConnection,
    ctx: &RequestContext,
    kind: EntityKind,
    entity_id: &str,
) -> DbResult<()> {
    let (entity, sql) = match kind {
        EntityKind::Invoice => ("Invoice", "SELECT company_id FROM invoices WHERE id = ?1"),
        EntityKind::Job => ("Job", "SELECT company_id FROM job_cards WHERE id = ?1"),
        EntityKind::Purchase => ("Purchase", "SELECT company_id FROM purchases WHERE id = ?1"),
    };

    let company: Option<String> = sqlx::query_scalar(sql)
        .bind(entity_id)
        .fetch_optional(&mut *conn)
        .await?;

    match company {
        Some(company) if company == ctx.company_id => Ok(()),
        _ => Err(DbError::not_found(entity, entity_id)),
    }
}

#[allow(clippy::too_many_arguments)]
fn history_entry(
    invoice_id: &str,
    payment_id: Option<&str>,
    action: PaymentAction,
    from: PaymentStatus,
    to: PaymentStatus,
    amount: Money,
    note: Option<String>,
    payload: Option<serde_json::Value>,
    actor_id: &str,
) -> PaymentHistoryEntry {
    PaymentHistoryEntry {
        id: Uuid::new_v4().to_string(),
        invoice_id: invoice_id.to_string(),
        payment_id: payment_id.map(str::to_string),
        action_type: action,
        from_payment_status: from,
        to_payment_status: to,
        amount,
        note,
        payload: payload.map(|p| p.to_string()),
        actor_id: actor_id.to_string(),
        created_at: Utc::now(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use garage_core::{Branch, Customer, ItemKind, Quantity, TaxRate};
    use std::sync::Mutex;

    fn ctx() -> RequestContext {
        RequestContext::new("co", "br", "cashier")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn labor(description: &str, rupees: i64) -> LineInput {
        LineInput {
            item_kind: ItemKind::Labor,
            description: description.to_string(),
            linked_part_id: None,
            linked_service_id: None,
            hsn_sac: Some("9987".to_string()),
            quantity: Quantity::from_units(1),
            unit_price: Money::from_rupees(rupees),
            gst_rate: TaxRate::from_percent(18),
        }
    }

    async fn setup(customer_state: Option<&str>) -> LedgerService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.directory()
            .insert_branch(&Branch {
                id: "br".to_string(),
                company_id: "co".to_string(),
                name: "Main".to_string(),
                state: Some("Karnataka".to_string()),
                gstin: None,
                invoice_prefix: Some("gac".to_string()),
            })
            .await
            .unwrap();
        db.directory()
            .insert_customer(&Customer {
                id: "cust".to_string(),
                company_id: "co".to_string(),
                name: "Ravi".to_string(),
                state: customer_state.map(str::to_string),
                gstin: None,
                phone: None,
            })
            .await
            .unwrap();
        LedgerService::new(db, &LedgerConfig::default())
    }

    async fn closed_job(service: &LedgerService, lines: &[LineInput]) -> Job {
        let job = service.db().jobs().create(&ctx(), "cust", "JC-1").await.unwrap();
        for line in lines {
            service.db().jobs().add_line(&job.id, line).await.unwrap();
        }
        service.close_job(&ctx(), &job.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_draft_then_finalize_numbers_the_invoice() {
        let service = setup(Some("karnataka")).await;
        let job = closed_job(&service, &[labor("Periodic service", 1000)]).await;

        let draft = service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();
        assert_eq!(draft.status, InvoiceStatus::Draft);
        assert_eq!(draft.grand_total, Money::from_rupees(1180));
        assert_eq!(draft.cgst_amount, Money::from_rupees(90));
        assert!(draft.invoice_number.is_none());

        let finalized = service.finalize_invoice(&ctx(), &draft.id).await.unwrap();
        assert_eq!(finalized.invoice_number.as_deref(), Some("GAC/2025-26/00001"));
        assert_eq!(finalized.payment_status, PaymentStatus::Unpaid);
        assert!(finalized.counterparty_snapshot.is_some());

        let history = service.db().invoices().status_history(&draft.id).await.unwrap();
        let actions: Vec<StatusAction> = history.iter().map(|h| h.action_type).collect();
        assert_eq!(actions, vec![StatusAction::Create, StatusAction::Finalize]);
    }

    #[tokio::test]
    async fn test_open_job_cannot_be_invoiced() {
        let service = setup(Some("Karnataka")).await;
        let job = service.db().jobs().create(&ctx(), "cust", "JC-9").await.unwrap();

        let err = service
            .create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "JOB_NOT_CLOSED");
    }

    #[tokio::test]
    async fn test_missing_customer_state_is_invalid_tax_context() {
        let service = setup(None).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;

        let err = service
            .create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TAX_CONTEXT");
    }

    #[tokio::test]
    async fn test_second_live_invoice_for_job_is_rejected() {
        let service = setup(Some("Karnataka")).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;
        service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();

        let err = service
            .create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 2))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVOICE_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_draft_lines_are_replaceable_until_finalized() {
        let service = setup(Some("Karnataka")).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;
        let draft = service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();

        let edited = service
            .replace_draft_lines(&ctx(), &draft.id, &[labor("Full service", 1000)])
            .await
            .unwrap();
        assert_eq!(edited.grand_total, Money::from_rupees(1180));
        assert_eq!(service.db().invoices().lines(&draft.id).await.unwrap().len(), 1);

        service.finalize_invoice(&ctx(), &draft.id).await.unwrap();
        let err = service
            .replace_draft_lines(&ctx(), &draft.id, &[labor("Wash", 300)])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVOICE_LOCKED");
    }

    #[tokio::test]
    async fn test_regime_change_after_draft_blocks_finalize() {
        let service = setup(Some("Karnataka")).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;
        let draft = service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();

        service.db().directory().set_customer_state("cust", Some("Kerala")).await.unwrap();
        let err = service.finalize_invoice(&ctx(), &draft.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TAX_CONTEXT");

        // re-pricing picks up the new regime and finalize goes through
        let repriced = service.replace_draft_lines(&ctx(), &draft.id, &[labor("Wash", 300)]).await.unwrap();
        assert_eq!(repriced.igst_amount, Money::from_rupees(54));
        service.finalize_invoice(&ctx(), &draft.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_payment_on_draft_is_rejected() {
        let service = setup(Some("Karnataka")).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;
        let draft = service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();

        let request = PaymentRequest {
            amount: Money::from_rupees(100),
            mode: PaymentMode::Cash,
            paid_on: date(2025, 7, 1),
            reference: None,
            note: None,
        };
        let err = service.record_payment(&ctx(), &draft.id, &request).await.unwrap_err();
        assert_eq!(err.code(), "INVOICE_NOT_FINALIZED");
    }

    #[tokio::test]
    async fn test_draft_cancel_is_allowed() {
        let service = setup(Some("Karnataka")).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;
        let draft = service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();

        let result = service.cancel_invoice(&ctx(), &draft.id, "customer left").await.unwrap();
        assert!(result.cancelled);

        let cancelled = service.db().invoices().get_by_id(&draft.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Cancelled);

        // a fresh invoice can be raised once the old one is cancelled
        service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_advance_refused_once_closed_job_is_invoiced() {
        let service = setup(Some("Karnataka")).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;
        service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();

        let err = service
            .collect_advance(
                &ctx(),
                &AdvanceRequest {
                    job_id: job.id.clone(),
                    amount: Money::from_rupees(100),
                    mode: PaymentMode::Upi,
                    received_on: date(2025, 7, 1),
                    reference: None,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ADVANCE_NOT_ALLOWED");
    }

    struct FailingNotifier(Mutex<Vec<String>>);

    impl InventoryNotifier for FailingNotifier {
        fn job_closed(&self, job: &Job) -> Result<(), String> {
            self.0.lock().unwrap().push(job.id.clone());
            Err("inventory offline".to_string())
        }
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_undo_close() {
        let notifier = Arc::new(FailingNotifier(Mutex::new(Vec::new())));
        let service = setup(Some("Karnataka")).await.with_notifier(notifier.clone());

        let job = service.db().jobs().create(&ctx(), "cust", "JC-2").await.unwrap();
        let closed = service.close_job(&ctx(), &job.id).await.unwrap();

        assert_eq!(closed.status, JobStatus::Closed);
        assert!(closed.closed_at.is_some());
        assert_eq!(notifier.0.lock().unwrap().as_slice(), &[job.id.clone()]);
    }

    #[tokio::test]
    async fn test_queries_are_company_scoped() {
        let service = setup(Some("Karnataka")).await;
        let job = closed_job(&service, &[labor("Wash", 300)]).await;
        let draft = service.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 1)).await.unwrap();

        let other = RequestContext::new("other-co", "br", "cashier");
        let err = service.outstanding(&other, &draft.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let err = service.dependency_report(&other, EntityKind::Job, &job.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
