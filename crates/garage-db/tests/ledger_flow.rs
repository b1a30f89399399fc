//! End-to-end ledger flows against SQLite.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use garage_core::numbering::SequenceScope;
use garage_core::{
    Branch, Customer, DocumentKind, EntityKind, EntryKind, Invoice, InvoiceStatus, ItemKind, Job,
    LineInput, Money, PaymentAction, PaymentMode, PaymentStatus, Quantity, RequestContext, TaxRate,
};
use garage_db::{
    AdvanceRequest, Database, DbConfig, DbError, LedgerConfig, LedgerService, PaymentRequest,
};

// =============================================================================
// Fixtures
// =============================================================================

fn ctx() -> RequestContext {
    RequestContext::new("co", "br", "cashier")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn line(description: &str, rupees: i64, gst_percent: u32) -> LineInput {
    LineInput {
        item_kind: ItemKind::Labor,
        description: description.to_string(),
        linked_part_id: None,
        linked_service_id: None,
        hsn_sac: None,
        quantity: Quantity::from_units(1),
        unit_price: Money::from_rupees(rupees),
        gst_rate: TaxRate::from_percent(gst_percent),
    }
}

fn pay(rupees: i64, mode: PaymentMode) -> PaymentRequest {
    PaymentRequest {
        amount: Money::from_rupees(rupees),
        mode,
        paid_on: date(2025, 8, 1),
        reference: None,
        note: None,
    }
}

async fn ledger() -> LedgerService {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.directory()
        .insert_branch(&Branch {
            id: "br".to_string(),
            company_id: "co".to_string(),
            name: "Indiranagar".to_string(),
            state: Some("Karnataka".to_string()),
            gstin: Some("29ABCDE1234F1Z5".to_string()),
            invoice_prefix: Some("GAC".to_string()),
        })
        .await
        .unwrap();
    db.directory()
        .insert_customer(&Customer {
            id: "cust".to_string(),
            company_id: "co".to_string(),
            name: "Asha".to_string(),
            state: Some("Karnataka".to_string()),
            gstin: None,
            phone: Some("9800000000".to_string()),
        })
        .await
        .unwrap();
    LedgerService::new(db, &LedgerConfig::default())
}

async fn open_job(ledger: &LedgerService, number: &str, lines: &[LineInput]) -> Job {
    let job = ledger.db().jobs().create(&ctx(), "cust", number).await.unwrap();
    for l in lines {
        ledger.db().jobs().add_line(&job.id, l).await.unwrap();
    }
    job
}

/// Closed job invoiced and finalized in one go.
async fn finalized_invoice(ledger: &LedgerService, lines: &[LineInput]) -> Invoice {
    let job = open_job(ledger, "JC-100", lines).await;
    ledger.close_job(&ctx(), &job.id).await.unwrap();
    let draft = ledger
        .create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 31))
        .await
        .unwrap();
    ledger.finalize_invoice(&ctx(), &draft.id).await.unwrap()
}

// =============================================================================
// Sequence Numbers
// =============================================================================

#[tokio::test]
async fn concurrent_allocations_never_repeat_a_number() {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("ledger.db")).max_connections(8);
    let db = Database::new(config).await.unwrap();

    let scope = SequenceScope {
        company_id: "co".to_string(),
        branch_id: "br".to_string(),
        fiscal_year: "2025-26".to_string(),
        document_kind: DocumentKind::Invoice,
    };

    let tasks: Vec<_> = (0..24)
        .map(|_| {
            let db = db.clone();
            let scope = scope.clone();
            tokio::spawn(async move { db.sequences().next(&scope, &[Some("GAC")]).await })
        })
        .collect();

    let mut numbers = BTreeSet::new();
    let mut formatted = BTreeSet::new();
    for task in tasks {
        let issued = task.await.unwrap().unwrap();
        numbers.insert(issued.sequence_number);
        formatted.insert(issued.formatted_number);
    }

    assert_eq!(numbers.len(), 24);
    assert_eq!(formatted.len(), 24);
    assert_eq!(numbers.into_iter().collect::<Vec<_>>(), (1..=24).collect::<Vec<_>>());
    assert!(formatted.contains("GAC/2025-26/00024"));
}

#[tokio::test]
async fn rejected_payment_does_not_consume_a_receipt_number() {
    let ledger = ledger().await;
    let invoice = finalized_invoice(&ledger, &[line("Service", 1000, 18)]).await;

    let err = ledger
        .record_payment(&ctx(), &invoice.id, &pay(2000, PaymentMode::Cash))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "OVERPAYMENT_REJECTED");

    let entry = ledger
        .record_payment(&ctx(), &invoice.id, &pay(100, PaymentMode::Cash))
        .await
        .unwrap();
    assert_eq!(entry.receipt_number.as_deref(), Some("RCPT/2025-26/00001"));
}

// =============================================================================
// Payments
// =============================================================================

#[tokio::test]
async fn partial_paid_and_reversal_example() {
    let ledger = ledger().await;
    let invoice = finalized_invoice(&ledger, &[line("Service", 1000, 18)]).await;

    assert_eq!(invoice.taxable_amount, Money::from_rupees(1000));
    assert_eq!(invoice.cgst_amount, Money::from_rupees(90));
    assert_eq!(invoice.sgst_amount, Money::from_rupees(90));
    assert_eq!(invoice.grand_total, Money::from_rupees(1180));

    let first = ledger
        .record_payment(&ctx(), &invoice.id, &pay(700, PaymentMode::Cash))
        .await
        .unwrap();
    let s = ledger.outstanding(&ctx(), &invoice.id).await.unwrap();
    assert_eq!(s.payment_status, PaymentStatus::Partial);
    assert_eq!(s.outstanding, Money::from_rupees(480));

    ledger
        .record_payment(&ctx(), &invoice.id, &pay(480, PaymentMode::Upi))
        .await
        .unwrap();
    let s = ledger.outstanding(&ctx(), &invoice.id).await.unwrap();
    assert_eq!(s.payment_status, PaymentStatus::Paid);
    assert_eq!(s.outstanding, Money::zero());
    assert_eq!(s.payment_mode_summary.as_deref(), Some("MIXED"));

    ledger.reverse_payment(&ctx(), &first.id, "cash returned").await.unwrap();
    let s = ledger.outstanding(&ctx(), &invoice.id).await.unwrap();
    assert_eq!(s.payment_status, PaymentStatus::Partial);
    assert_eq!(s.outstanding, Money::from_rupees(700));
    assert_eq!(s.payment_mode_summary.as_deref(), Some("UPI"));

    let stored = ledger.db().invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Partial);
    assert_eq!(stored.payment_mode_summary.as_deref(), Some("UPI"));
}

#[tokio::test]
async fn second_reversal_is_rejected_and_outstanding_is_restored() {
    let ledger = ledger().await;
    let invoice = finalized_invoice(&ledger, &[line("Service", 1000, 18)]).await;

    let before = ledger.outstanding(&ctx(), &invoice.id).await.unwrap().outstanding;
    let payment = ledger
        .record_payment(&ctx(), &invoice.id, &pay(500, PaymentMode::Card))
        .await
        .unwrap();

    let reversal = ledger.reverse_payment(&ctx(), &payment.id, "card chargeback").await.unwrap();
    assert_eq!(reversal.entry_kind, EntryKind::Reversal);
    assert_eq!(reversal.amount, -payment.amount);
    assert_eq!(reversal.reversed_payment_id.as_deref(), Some(payment.id.as_str()));

    let after = ledger.outstanding(&ctx(), &invoice.id).await.unwrap().outstanding;
    assert_eq!(after, before);

    let err = ledger.reverse_payment(&ctx(), &payment.id, "again").await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_REVERSED");

    let err = ledger.reverse_payment(&ctx(), &reversal.id, "undo").await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_REVERSED");

    let history = ledger.payment_history(&ctx(), &invoice.id).await.unwrap();
    assert_eq!(history.entries.len(), 2);
    assert_eq!(history.events.len(), 2);
}

#[tokio::test]
async fn reversal_requires_a_reason() {
    let ledger = ledger().await;
    let invoice = finalized_invoice(&ledger, &[line("Service", 1000, 18)]).await;
    let payment = ledger
        .record_payment(&ctx(), &invoice.id, &pay(100, PaymentMode::Cash))
        .await
        .unwrap();

    let err = ledger.reverse_payment(&ctx(), &payment.id, "   ").await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn cancellation_waits_for_every_payment_to_be_reversed() {
    let ledger = ledger().await;
    let invoice = finalized_invoice(&ledger, &[line("Service", 1000, 18)]).await;
    let payment = ledger
        .record_payment(&ctx(), &invoice.id, &pay(300, PaymentMode::Cash))
        .await
        .unwrap();

    let report = ledger
        .dependency_report(&ctx(), EntityKind::Invoice, &invoice.id)
        .await
        .unwrap();
    assert!(!report.can_proceed);

    let result = ledger.cancel_invoice(&ctx(), &invoice.id, "wrong customer").await.unwrap();
    assert!(!result.cancelled);
    assert_eq!(result.blocking_reasons.len(), 1);
    assert!(result.blocking_reasons[0].contains("RCPT/2025-26/00001"));

    let stored = ledger.db().invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Finalized);

    ledger.reverse_payment(&ctx(), &payment.id, "refunded").await.unwrap();
    let result = ledger.cancel_invoice(&ctx(), &invoice.id, "wrong customer").await.unwrap();
    assert!(result.cancelled);

    let stored = ledger.db().invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Cancelled);
    assert_eq!(stored.payment_status, PaymentStatus::Cancelled);
    assert_eq!(stored.cancel_reason.as_deref(), Some("wrong customer"));
    // number stays with the cancelled document
    assert_eq!(stored.invoice_number, invoice.invoice_number);

    let again = ledger.cancel_invoice(&ctx(), &invoice.id, "twice").await.unwrap();
    assert!(!again.cancelled);

    let history = ledger.db().invoices().status_history(&invoice.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].to_status, InvoiceStatus::Cancelled);
}

// =============================================================================
// Advances
// =============================================================================

#[tokio::test]
async fn advances_settle_oldest_first_and_only_once() {
    let ledger = ledger().await;
    let job = open_job(&ledger, "JC-200", &[line("Body work", 650, 0)]).await;

    let older = ledger
        .collect_advance(
            &ctx(),
            &AdvanceRequest {
                job_id: job.id.clone(),
                amount: Money::from_rupees(500),
                mode: PaymentMode::Cash,
                received_on: date(2025, 7, 1),
                reference: None,
                note: Some("booking".to_string()),
            },
        )
        .await
        .unwrap();
    let newer = ledger
        .collect_advance(
            &ctx(),
            &AdvanceRequest {
                job_id: job.id.clone(),
                amount: Money::from_rupees(300),
                mode: PaymentMode::Upi,
                received_on: date(2025, 7, 5),
                reference: Some("UTR123".to_string()),
                note: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(older.receipt_number, "ADV/2025-26/00001");
    assert_eq!(newer.receipt_number, "ADV/2025-26/00002");

    ledger.close_job(&ctx(), &job.id).await.unwrap();
    let draft = ledger
        .create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 31))
        .await
        .unwrap();
    let invoice = ledger.finalize_invoice(&ctx(), &draft.id).await.unwrap();
    assert_eq!(invoice.grand_total, Money::from_rupees(650));

    let rows = ledger.auto_adjust_advances(&ctx(), &invoice.id).await.unwrap();
    assert_eq!(rows.len(), 2);

    let older = ledger.db().advances().get_by_id(&older.id).await.unwrap().unwrap();
    let newer = ledger.db().advances().get_by_id(&newer.id).await.unwrap().unwrap();
    assert_eq!(older.adjusted_amount, Money::from_rupees(500));
    assert_eq!(older.balance_amount, Money::zero());
    assert_eq!(newer.adjusted_amount, Money::from_rupees(150));
    assert_eq!(newer.balance_amount, Money::from_rupees(150));

    let s = ledger.outstanding(&ctx(), &invoice.id).await.unwrap();
    assert_eq!(s.outstanding, Money::zero());
    assert_eq!(s.advance_adjusted, Money::from_rupees(650));
    assert_eq!(s.payment_status, PaymentStatus::Paid);

    let again = ledger.auto_adjust_advances(&ctx(), &invoice.id).await.unwrap();
    assert!(again.is_empty());
    let adjustments = ledger.db().advances().adjustments_for_invoice(&invoice.id).await.unwrap();
    assert_eq!(adjustments.len(), 2);
    let newer = ledger.db().advances().get_by_id(&newer.id).await.unwrap().unwrap();
    assert_eq!(newer.adjusted_amount, Money::from_rupees(150));
}

#[tokio::test]
async fn cancelled_invoice_gives_advance_back_to_the_next_invoice() {
    let ledger = ledger().await;
    let job = open_job(&ledger, "JC-300", &[line("Paint", 400, 0)]).await;
    let advance = ledger
        .collect_advance(
            &ctx(),
            &AdvanceRequest {
                job_id: job.id.clone(),
                amount: Money::from_rupees(400),
                mode: PaymentMode::Cash,
                received_on: date(2025, 7, 1),
                reference: None,
                note: None,
            },
        )
        .await
        .unwrap();
    ledger.close_job(&ctx(), &job.id).await.unwrap();
    let draft = ledger.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 2)).await.unwrap();
    let first = ledger.finalize_invoice(&ctx(), &draft.id).await.unwrap();
    ledger.auto_adjust_advances(&ctx(), &first.id).await.unwrap();

    let result = ledger.cancel_invoice(&ctx(), &first.id, "duplicate").await.unwrap();
    assert!(result.cancelled);
    assert_eq!(result.warnings.len(), 1);

    let stored = ledger.db().advances().get_by_id(&advance.id).await.unwrap().unwrap();
    assert_eq!(stored.adjusted_amount, Money::zero());
    assert_eq!(stored.released_amount, Money::from_rupees(400));
    assert_eq!(stored.balance_amount, Money::from_rupees(400));

    // the original adjustment row is kept next to its release
    let adjustments = ledger.db().advances().adjustments_for_invoice(&first.id).await.unwrap();
    let releases = ledger.db().advances().releases_for_invoice(&first.id).await.unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].adjustment_id, adjustments[0].id);
    assert_eq!(releases[0].reason, "duplicate");

    let history = ledger.payment_history(&ctx(), &first.id).await.unwrap();
    assert!(history
        .events
        .iter()
        .any(|e| e.action_type == PaymentAction::AdvanceReleased && e.amount == Money::from_rupees(400)));

    let draft = ledger.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 3)).await.unwrap();
    let second = ledger.finalize_invoice(&ctx(), &draft.id).await.unwrap();
    let rows = ledger.auto_adjust_advances(&ctx(), &second.id).await.unwrap();
    assert_eq!(rows.len(), 1);

    let s = ledger.outstanding(&ctx(), &second.id).await.unwrap();
    assert_eq!(s.advance_adjusted, Money::from_rupees(400));
    assert_eq!(s.outstanding, Money::zero());

    let stored = ledger.db().advances().get_by_id(&advance.id).await.unwrap().unwrap();
    assert_eq!(stored.adjusted_amount, Money::from_rupees(400));
    assert_eq!(stored.released_amount, Money::from_rupees(400));
    assert_eq!(stored.balance_amount, Money::zero());

    let pool = ledger.db().pool();
    for sql in [
        "UPDATE advance_releases SET released_amount = 1",
        "DELETE FROM advance_releases",
        "UPDATE advances SET adjusted_amount = 0",
        "UPDATE advances SET released_amount = 0",
    ] {
        let err = sqlx::query(sql).execute(pool).await.unwrap_err();
        assert!(
            matches!(DbError::from(err), DbError::ConstraintViolation { .. }),
            "expected guard to reject: {sql}"
        );
    }
}

// =============================================================================
// Deletion
// =============================================================================

#[tokio::test]
async fn job_with_advance_cannot_be_deleted() {
    let ledger = ledger().await;
    let job = open_job(&ledger, "JC-400", &[line("Wash", 300, 18)]).await;
    ledger
        .collect_advance(
            &ctx(),
            &AdvanceRequest {
                job_id: job.id.clone(),
                amount: Money::from_rupees(100),
                mode: PaymentMode::Cash,
                received_on: date(2025, 7, 1),
                reference: None,
                note: None,
            },
        )
        .await
        .unwrap();

    let err = ledger.db().jobs().delete(&ctx(), &job.id).await.unwrap_err();
    assert_eq!(err.code(), "CANCELLATION_BLOCKED");

    let empty = open_job(&ledger, "JC-401", &[line("Wash", 300, 18)]).await;
    let report = ledger.db().jobs().delete(&ctx(), &empty.id).await.unwrap();
    assert!(report.can_proceed);
    assert!(ledger.db().jobs().get_by_id(&empty.id).await.unwrap().is_none());
}

#[tokio::test]
async fn job_with_cancelled_invoice_is_blocked_not_broken() {
    let ledger = ledger().await;
    let job = open_job(&ledger, "JC-402", &[line("Alignment", 800, 18)]).await;
    ledger.close_job(&ctx(), &job.id).await.unwrap();
    let draft = ledger.create_invoice_from_job(&ctx(), &job.id, date(2025, 7, 31)).await.unwrap();
    let invoice = ledger.finalize_invoice(&ctx(), &draft.id).await.unwrap();
    let result = ledger.cancel_invoice(&ctx(), &invoice.id, "billed twice").await.unwrap();
    assert!(result.cancelled);

    let report = ledger
        .dependency_report(&ctx(), EntityKind::Job, &job.id)
        .await
        .unwrap();
    assert!(!report.can_proceed);
    let number = invoice.invoice_number.clone().unwrap();
    assert!(report
        .blocking_reasons
        .iter()
        .any(|r| r.contains("cancelled invoice") && r.contains(&number)));

    let err = ledger.db().jobs().delete(&ctx(), &job.id).await.unwrap_err();
    assert_eq!(err.code(), "CANCELLATION_BLOCKED");
    assert!(ledger.db().jobs().get_by_id(&job.id).await.unwrap().is_some());
}

// =============================================================================
// Append-Only Guards
// =============================================================================

#[tokio::test]
async fn finalized_rows_reject_direct_edits() {
    let ledger = ledger().await;
    let invoice = finalized_invoice(&ledger, &[line("Service", 1000, 18)]).await;
    ledger
        .record_payment(&ctx(), &invoice.id, &pay(100, PaymentMode::Cash))
        .await
        .unwrap();
    let pool = ledger.db().pool();

    let statements = [
        "UPDATE invoice_lines SET unit_price = 0",
        "DELETE FROM invoice_lines",
        "UPDATE invoices SET grand_total = 0, gross_total = 0, round_off = 0",
        "DELETE FROM invoices",
        "UPDATE invoice_payments SET amount = 1",
        "DELETE FROM invoice_payments",
        "UPDATE invoice_status_history SET note = 'x'",
        "DELETE FROM invoice_payment_history",
    ];

    for sql in statements {
        let err = sqlx::query(sql).execute(pool).await.unwrap_err();
        assert!(
            matches!(DbError::from(err), DbError::ConstraintViolation { .. }),
            "expected guard to reject: {sql}"
        );
    }
}
