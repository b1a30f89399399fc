//! # Payment Repository
//!
//! The append-only payment ledger of invoices and its history rows.
//!
//! ## Ledger Rows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PAYMENT   +amount  receipt RCPT/FY/NNNNN                               │
//! │     │                                                                   │
//! │     │  reverse_payment                                                  │
//! │     ▼                                                                   │
//! │  PAYMENT   is_reversed = 1, reversed_at/by/reason set  (only update)    │
//! │  REVERSAL  −amount  reversed_payment_id → PAYMENT      (new row)        │
//! │                                                                         │
//! │  Nothing is ever deleted. One REVERSAL per PAYMENT (unique index).      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use garage_core::{PaymentEntry, PaymentHistoryEntry};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const PAYMENT_COLUMNS: &str = r#"
    id, invoice_id, entry_kind, amount, paid_on, mode, reference, note,
    receipt_number, reversed_payment_id, is_reversed, reversed_at,
    reversed_by, reversal_reason, created_by, created_at
"#;

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Takes the writer lock on the invoice a ledger row belongs to and returns
/// that invoice's id.
pub async fn bump_invoice_of(
    conn: &mut SqliteConnection,
    payment_id: &str,
    company_id: &str,
) -> DbResult<String> {
    let invoice_id: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE invoices SET lock_version = lock_version + 1
        WHERE id = (SELECT invoice_id FROM invoice_payments WHERE id = ?1)
          AND company_id = ?2
        RETURNING id
        "#,
    )
    .bind(payment_id)
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await?;

    invoice_id.ok_or_else(|| DbError::not_found("Payment", payment_id))
}

pub async fn get(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<PaymentEntry> {
    sqlx::query_as::<_, PaymentEntry>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM invoice_payments WHERE id = ?1"
    ))
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Payment", payment_id))
}

/// Every ledger row of an invoice in insertion order.
pub async fn for_invoice(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<PaymentEntry>> {
    let entries = sqlx::query_as::<_, PaymentEntry>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM invoice_payments WHERE invoice_id = ?1 ORDER BY created_at, rowid"
    ))
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(entries)
}

/// Whether a REVERSAL row already points at `payment_id`.
pub async fn has_reversal(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM invoice_payments WHERE reversed_payment_id = ?1)",
    )
    .bind(payment_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists)
}

pub async fn insert(conn: &mut SqliteConnection, entry: &PaymentEntry) -> DbResult<()> {
    debug!(id = %entry.id, invoice_id = %entry.invoice_id, kind = ?entry.entry_kind, amount = %entry.amount, "Inserting ledger row");

    sqlx::query(
        r#"
        INSERT INTO invoice_payments (
            id, invoice_id, entry_kind, amount, paid_on, mode, reference, note,
            receipt_number, reversed_payment_id, is_reversed, reversed_at,
            reversed_by, reversal_reason, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.invoice_id)
    .bind(entry.entry_kind)
    .bind(entry.amount)
    .bind(entry.paid_on)
    .bind(entry.mode)
    .bind(&entry.reference)
    .bind(&entry.note)
    .bind(&entry.receipt_number)
    .bind(&entry.reversed_payment_id)
    .bind(entry.is_reversed)
    .bind(entry.reversed_at)
    .bind(&entry.reversed_by)
    .bind(&entry.reversal_reason)
    .bind(&entry.created_by)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Flags a live PAYMENT row as reversed. Returns false when the row was not
/// a live PAYMENT.
pub async fn flag_reversed(
    conn: &mut SqliteConnection,
    payment_id: &str,
    actor_id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_payments
        SET is_reversed = 1, reversed_at = ?2, reversed_by = ?3, reversal_reason = ?4
        WHERE id = ?1 AND is_reversed = 0 AND entry_kind = 'PAYMENT'
        "#,
    )
    .bind(payment_id)
    .bind(now)
    .bind(actor_id)
    .bind(reason)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn append_history(conn: &mut SqliteConnection, entry: &PaymentHistoryEntry) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoice_payment_history (
            id, invoice_id, payment_id, action_type,
            from_payment_status, to_payment_status, amount,
            note, payload, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.invoice_id)
    .bind(&entry.payment_id)
    .bind(entry.action_type)
    .bind(entry.from_payment_status)
    .bind(entry.to_payment_status)
    .bind(entry.amount)
    .bind(&entry.note)
    .bind(&entry.payload)
    .bind(&entry.actor_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn history(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<PaymentHistoryEntry>> {
    let events = sqlx::query_as::<_, PaymentHistoryEntry>(
        r#"
        SELECT id, invoice_id, payment_id, action_type,
               from_payment_status, to_payment_status, amount,
               note, payload, actor_id, created_at
        FROM invoice_payment_history
        WHERE invoice_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(events)
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to the payment ledger.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    pub async fn get_by_id(&self, payment_id: &str) -> DbResult<Option<PaymentEntry>> {
        let entry = sqlx::query_as::<_, PaymentEntry>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM invoice_payments WHERE id = ?1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    pub async fn entries(&self, invoice_id: &str) -> DbResult<Vec<PaymentEntry>> {
        let mut conn = self.pool.acquire().await?;
        for_invoice(&mut conn, invoice_id).await
    }

    pub async fn history(&self, invoice_id: &str) -> DbResult<Vec<PaymentHistoryEntry>> {
        let mut conn = self.pool.acquire().await?;
        history(&mut conn, invoice_id).await
    }
}
