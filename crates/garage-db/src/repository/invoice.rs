//! # Invoice Repository
//!
//! Invoice headers, frozen lines and the append-only status history.
//!
//! ## Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every mutating ledger transaction on an invoice starts with            │
//! │                                                                         │
//! │     UPDATE invoices SET lock_version = lock_version + 1 WHERE id = ?    │
//! │                                                                         │
//! │  SQLite grants the single writer lock on that first write, so every     │
//! │  value read afterwards (payments, adjustments, totals) is stable until  │
//! │  commit. Contending writers wait on the busy timeout.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use garage_core::ledger::Settlement;
use garage_core::{
    Invoice, InvoiceStatus, InvoiceTotals, IssuedNumber, PaymentStatus, StatusAction,
    StatusHistoryEntry, TaxLine, TaxRegime,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Takes the writer lock on an invoice by bumping its version.
pub async fn bump(conn: &mut SqliteConnection, invoice_id: &str, company_id: &str) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE invoices SET lock_version = lock_version + 1 WHERE id = ?1 AND company_id = ?2",
    )
    .bind(invoice_id)
    .bind(company_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Invoice", invoice_id));
    }
    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Invoice> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?1")
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", invoice_id))
}

/// The DRAFT or FINALIZED invoice of a job, if any.
pub async fn live_for_job(conn: &mut SqliteConnection, job_id: &str) -> DbResult<Option<Invoice>> {
    let invoice = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE job_id = ?1 AND status <> 'CANCELLED'",
    )
    .bind(job_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(invoice)
}

pub async fn lines(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<TaxLine>> {
    let lines = sqlx::query_as::<_, TaxLine>(
        "SELECT * FROM invoice_lines WHERE invoice_id = ?1 ORDER BY line_no",
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

pub async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
    debug!(id = %invoice.id, job_id = %invoice.job_id, "Inserting invoice");

    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, company_id, branch_id, job_id, customer_id,
            invoice_number, fiscal_year, sequence_number, invoice_date,
            status, payment_status, payment_mode_summary, tax_regime,
            subtotal_service, subtotal_parts, taxable_amount,
            cgst_amount, sgst_amount, igst_amount, total_tax_amount,
            gross_total, round_off, grand_total,
            counterparty_snapshot, cancel_reason, lock_version,
            created_by, created_at, updated_at, finalized_at, cancelled_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16,
            ?17, ?18, ?19, ?20,
            ?21, ?22, ?23,
            ?24, ?25, ?26,
            ?27, ?28, ?29, ?30, ?31
        )
        "#,
    )
    .bind(&invoice.id)
    .bind(&invoice.company_id)
    .bind(&invoice.branch_id)
    .bind(&invoice.job_id)
    .bind(&invoice.customer_id)
    .bind(&invoice.invoice_number)
    .bind(&invoice.fiscal_year)
    .bind(invoice.sequence_number)
    .bind(invoice.invoice_date)
    .bind(invoice.status)
    .bind(invoice.payment_status)
    .bind(&invoice.payment_mode_summary)
    .bind(invoice.tax_regime)
    .bind(invoice.subtotal_service)
    .bind(invoice.subtotal_parts)
    .bind(invoice.taxable_amount)
    .bind(invoice.cgst_amount)
    .bind(invoice.sgst_amount)
    .bind(invoice.igst_amount)
    .bind(invoice.total_tax_amount)
    .bind(invoice.gross_total)
    .bind(invoice.round_off)
    .bind(invoice.grand_total)
    .bind(&invoice.counterparty_snapshot)
    .bind(&invoice.cancel_reason)
    .bind(invoice.lock_version)
    .bind(&invoice.created_by)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .bind(invoice.finalized_at)
    .bind(invoice.cancelled_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes lines numbered from 1 in slice order.
pub async fn insert_lines(conn: &mut SqliteConnection, invoice_id: &str, lines: &[TaxLine]) -> DbResult<()> {
    debug!(invoice_id, count = lines.len(), "Inserting invoice lines");

    for (idx, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_lines (
                id, invoice_id, line_no, item_kind, description,
                linked_part_id, linked_service_id, hsn_sac,
                quantity, unit_price, gst_rate, taxable_value,
                cgst_rate, cgst_amount, sgst_rate, sgst_amount,
                igst_rate, igst_amount, tax_amount, total_value
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20
            )
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(invoice_id)
        .bind(idx as i64 + 1)
        .bind(line.item_kind)
        .bind(&line.description)
        .bind(&line.linked_part_id)
        .bind(&line.linked_service_id)
        .bind(&line.hsn_sac)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.gst_rate)
        .bind(line.taxable_value)
        .bind(line.cgst_rate)
        .bind(line.cgst_amount)
        .bind(line.sgst_rate)
        .bind(line.sgst_amount)
        .bind(line.igst_rate)
        .bind(line.igst_amount)
        .bind(line.tax_amount)
        .bind(line.total_value)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Removes the lines of a DRAFT invoice (a trigger rejects anything else).
pub async fn delete_lines(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = ?1")
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn update_totals(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    regime: TaxRegime,
    totals: &InvoiceTotals,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices SET
            tax_regime = ?2,
            subtotal_service = ?3, subtotal_parts = ?4, taxable_amount = ?5,
            cgst_amount = ?6, sgst_amount = ?7, igst_amount = ?8, total_tax_amount = ?9,
            gross_total = ?10, round_off = ?11, grand_total = ?12,
            updated_at = ?13
        WHERE id = ?1
        "#,
    )
    .bind(invoice_id)
    .bind(regime)
    .bind(totals.subtotal_service)
    .bind(totals.subtotal_parts)
    .bind(totals.taxable_amount)
    .bind(totals.cgst_amount)
    .bind(totals.sgst_amount)
    .bind(totals.igst_amount)
    .bind(totals.total_tax_amount)
    .bind(totals.gross_total)
    .bind(totals.round_off)
    .bind(totals.grand_total)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn mark_finalized(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    number: &IssuedNumber,
    snapshot_json: &str,
    payment_status: PaymentStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices SET
            status = ?2, invoice_number = ?3, fiscal_year = ?4, sequence_number = ?5,
            counterparty_snapshot = ?6, payment_status = ?7,
            finalized_at = ?8, updated_at = ?8
        WHERE id = ?1 AND status = 'DRAFT'
        "#,
    )
    .bind(invoice_id)
    .bind(InvoiceStatus::Finalized)
    .bind(&number.formatted_number)
    .bind(&number.fiscal_year)
    .bind(number.sequence_number)
    .bind(snapshot_json)
    .bind(payment_status)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn mark_cancelled(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices SET
            status = ?2, payment_status = ?3, cancel_reason = ?4,
            cancelled_at = ?5, updated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(invoice_id)
    .bind(InvoiceStatus::Cancelled)
    .bind(PaymentStatus::Cancelled)
    .bind(reason)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Stores the derived payment status and mode summary.
pub async fn apply_settlement(
    conn: &mut SqliteConnection,
    settlement: &Settlement,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices SET payment_status = ?2, payment_mode_summary = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(&settlement.invoice_id)
    .bind(settlement.payment_status)
    .bind(&settlement.payment_mode_summary)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Appends one status history row.
#[allow(clippy::too_many_arguments)]
pub async fn append_status(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    from: Option<InvoiceStatus>,
    to: InvoiceStatus,
    action: StatusAction,
    note: Option<&str>,
    payload: Option<serde_json::Value>,
    actor_id: &str,
) -> DbResult<StatusHistoryEntry> {
    let entry = StatusHistoryEntry {
        id: Uuid::new_v4().to_string(),
        invoice_id: invoice_id.to_string(),
        from_status: from,
        to_status: to,
        action_type: action,
        note: note.map(str::to_string),
        payload: payload.map(|p| p.to_string()),
        actor_id: actor_id.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO invoice_status_history (
            id, invoice_id, from_status, to_status, action_type,
            note, payload, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.invoice_id)
    .bind(entry.from_status)
    .bind(entry.to_status)
    .bind(entry.action_type)
    .bind(&entry.note)
    .bind(&entry.payload)
    .bind(&entry.actor_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    pub async fn find_by_number(
        &self,
        company_id: &str,
        branch_id: &str,
        invoice_number: &str,
    ) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE company_id = ?1 AND branch_id = ?2 AND invoice_number = ?3",
        )
        .bind(company_id)
        .bind(branch_id)
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invoice)
    }

    pub async fn lines(&self, invoice_id: &str) -> DbResult<Vec<TaxLine>> {
        let mut conn = self.pool.acquire().await?;
        lines(&mut conn, invoice_id).await
    }

    /// Status transitions in the order they happened.
    pub async fn status_history(&self, invoice_id: &str) -> DbResult<Vec<StatusHistoryEntry>> {
        let history = sqlx::query_as::<_, StatusHistoryEntry>(
            r#"
            SELECT id, invoice_id, from_status, to_status, action_type,
                   note, payload, actor_id, created_at
            FROM invoice_status_history
            WHERE invoice_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(history)
    }
}
