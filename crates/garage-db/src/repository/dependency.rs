//! # Dependency Repository
//!
//! Gathers what depends on an invoice, job or purchase so the pure checker
//! in `garage_core::integrity` can decide whether it may be cancelled or
//! deleted. Called inside the mutating transaction (after its first write)
//! and standalone for read-only reports.

use garage_core::integrity::{
    check_invoice_cancellation, check_job_deletion, check_purchase_deletion, InvoiceDependencies,
    JobDependencies, LinkedInvoice, PurchaseDependencies,
};
use garage_core::{DependencyReport, EntityKind, InvoiceStatus, JobStatus, Money, PurchaseStatus};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{DbError, DbResult, LedgerResult};
use crate::repository::inventory::{posted_count, MovementSource};

// =============================================================================
// Gathering
// =============================================================================

pub async fn invoice_dependencies(
    conn: &mut SqliteConnection,
    invoice_id: &str,
) -> DbResult<InvoiceDependencies> {
    let status: InvoiceStatus = sqlx::query_scalar("SELECT status FROM invoices WHERE id = ?1")
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", invoice_id))?;

    let unreversed: Vec<(String, Money)> = sqlx::query_as(
        r#"
        SELECT COALESCE(p.receipt_number, p.id), p.amount
        FROM invoice_payments p
        WHERE p.invoice_id = ?1
          AND p.entry_kind = 'PAYMENT'
          AND NOT EXISTS (
              SELECT 1 FROM invoice_payments r WHERE r.reversed_payment_id = p.id
          )
        ORDER BY p.created_at, p.rowid
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    let (live_adjustment_count, live_adjusted_total): (i64, Money) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(x.adjusted_amount), 0)
        FROM advance_adjustments x
        WHERE x.invoice_id = ?1
          AND NOT EXISTS (SELECT 1 FROM advance_releases r WHERE r.adjustment_id = x.id)
        "#,
    )
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(InvoiceDependencies {
        status: Some(status),
        unreversed_total: unreversed.iter().map(|(_, amount)| *amount).sum(),
        unreversed_payments: unreversed.into_iter().map(|(label, _)| label).collect(),
        live_adjustment_count,
        live_adjusted_total,
    })
}

pub async fn job_dependencies(conn: &mut SqliteConnection, job_id: &str) -> DbResult<JobDependencies> {
    let (status, stock_posted): (JobStatus, bool) =
        sqlx::query_as("SELECT status, stock_posted FROM job_cards WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Job", job_id))?;

    // Reversed payments and cancelled invoices count too: their rows are
    // kept and reference the job.
    let payment_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM invoice_payments p
        JOIN invoices i ON i.id = p.invoice_id
        WHERE i.job_id = ?1 AND p.entry_kind = 'PAYMENT'
        "#,
    )
    .bind(job_id)
    .fetch_one(&mut *conn)
    .await?;

    let advance_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM advances WHERE job_id = ?1")
        .bind(job_id)
        .fetch_one(&mut *conn)
        .await?;

    let advance_adjustment_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM advance_adjustments x
        JOIN invoices i ON i.id = x.invoice_id
        WHERE i.job_id = ?1
        "#,
    )
    .bind(job_id)
    .fetch_one(&mut *conn)
    .await?;

    let invoices: Vec<(String, InvoiceStatus)> = sqlx::query_as(
        r#"
        SELECT COALESCE(invoice_number, id), status
        FROM invoices
        WHERE job_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    let posted_movement_count = posted_count(conn, MovementSource::Job, job_id).await?;

    Ok(JobDependencies {
        status,
        stock_posted,
        payment_count,
        advance_count,
        advance_adjustment_count,
        invoices: invoices
            .into_iter()
            .map(|(label, status)| LinkedInvoice { label, status })
            .collect(),
        posted_movement_count,
    })
}

pub async fn purchase_dependencies(
    conn: &mut SqliteConnection,
    purchase_id: &str,
) -> DbResult<PurchaseDependencies> {
    let (status, stock_posted): (PurchaseStatus, bool) =
        sqlx::query_as("SELECT status, stock_posted FROM purchases WHERE id = ?1")
            .bind(purchase_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", purchase_id))?;

    let (payment_count, unreversed_payment_count): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_reversed = 0 THEN 1 ELSE 0 END), 0)
        FROM purchase_payments
        WHERE purchase_id = ?1
        "#,
    )
    .bind(purchase_id)
    .fetch_one(&mut *conn)
    .await?;

    let posted_movement_count = posted_count(conn, MovementSource::Purchase, purchase_id).await?;

    Ok(PurchaseDependencies {
        status,
        stock_posted,
        payment_count,
        unreversed_payment_count,
        posted_movement_count,
    })
}

// =============================================================================
// Repository
// =============================================================================

/// Read-only dependency reports for any supported entity.
#[derive(Debug, Clone)]
pub struct DependencyRepository {
    pool: SqlitePool,
}

impl DependencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DependencyRepository { pool }
    }

    /// Reports whether `entity_id` could be cancelled (invoice) or deleted
    /// (job, purchase) right now. Mutates nothing.
    pub async fn report(&self, kind: EntityKind, entity_id: &str) -> LedgerResult<DependencyReport> {
        let mut conn = self.pool.acquire().await?;

        let report = match kind {
            EntityKind::Invoice => {
                let deps = invoice_dependencies(&mut conn, entity_id).await?;
                check_invoice_cancellation(entity_id, &deps)
            }
            EntityKind::Job => {
                let deps = job_dependencies(&mut conn, entity_id).await?;
                check_job_deletion(entity_id, &deps)
            }
            EntityKind::Purchase => {
                let deps = purchase_dependencies(&mut conn, entity_id).await?;
                check_purchase_deletion(entity_id, &deps)
            }
        };

        Ok(report)
    }
}
