//! # Advance Repository
//!
//! Advances collected against jobs and their adjustments against invoices.
//! Adjustment rows are append-only. Cancelling an invoice writes one
//! release row per adjustment it consumed, and the advance gets that money
//! back: `adjusted_amount` drops by exactly what `released_amount` gains,
//! which a trigger enforces, and the balance column is checked against
//! `amount − adjusted_amount`.

use chrono::Utc;
use garage_core::ledger::Allocation;
use garage_core::{Advance, AdvanceAdjustment, AdvanceRelease, Money};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const ADVANCE_COLUMNS: &str = r#"
    id, company_id, branch_id, job_id, receipt_number, received_on, mode,
    reference, note, amount, adjusted_amount, released_amount, balance_amount,
    created_by, created_at
"#;

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

pub async fn insert(conn: &mut SqliteConnection, advance: &Advance) -> DbResult<()> {
    debug!(id = %advance.id, job_id = %advance.job_id, amount = %advance.amount, "Inserting advance");

    sqlx::query(
        r#"
        INSERT INTO advances (
            id, company_id, branch_id, job_id, receipt_number, received_on, mode,
            reference, note, amount, adjusted_amount, released_amount, balance_amount,
            created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&advance.id)
    .bind(&advance.company_id)
    .bind(&advance.branch_id)
    .bind(&advance.job_id)
    .bind(&advance.receipt_number)
    .bind(advance.received_on)
    .bind(advance.mode)
    .bind(&advance.reference)
    .bind(&advance.note)
    .bind(advance.amount)
    .bind(advance.adjusted_amount)
    .bind(advance.released_amount)
    .bind(advance.balance_amount)
    .bind(&advance.created_by)
    .bind(advance.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Advances of a job with a balance left that have not yet been adjusted
/// against `invoice_id`, oldest first.
pub async fn open_for_invoice(
    conn: &mut SqliteConnection,
    job_id: &str,
    invoice_id: &str,
) -> DbResult<Vec<Advance>> {
    let advances = sqlx::query_as::<_, Advance>(&format!(
        r#"
        SELECT {ADVANCE_COLUMNS}
        FROM advances a
        WHERE a.job_id = ?1
          AND a.balance_amount > 0
          AND NOT EXISTS (
              SELECT 1 FROM advance_adjustments x
              WHERE x.advance_id = a.id AND x.invoice_id = ?2
          )
        ORDER BY a.received_on, a.id
        "#
    ))
    .bind(job_id)
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(advances)
}

/// Applies one planned allocation to its advance.
///
/// The update only matches while the advance still holds the adjusted
/// amount the plan was computed from.
pub async fn apply(conn: &mut SqliteConnection, allocation: &Allocation) -> DbResult<()> {
    let previous = allocation.new_adjusted - allocation.amount;

    let result = sqlx::query(
        r#"
        UPDATE advances
        SET adjusted_amount = ?2, balance_amount = ?3
        WHERE id = ?1 AND adjusted_amount = ?4
        "#,
    )
    .bind(&allocation.advance_id)
    .bind(allocation.new_adjusted)
    .bind(allocation.new_balance)
    .bind(previous)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::ConstraintViolation {
            message: format!("advance {} changed during adjustment", allocation.advance_id),
        });
    }
    Ok(())
}

pub async fn insert_adjustment(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    allocation: &Allocation,
    actor_id: &str,
) -> DbResult<AdvanceAdjustment> {
    let adjustment = AdvanceAdjustment {
        id: Uuid::new_v4().to_string(),
        advance_id: allocation.advance_id.clone(),
        invoice_id: invoice_id.to_string(),
        adjusted_amount: allocation.amount,
        created_by: actor_id.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO advance_adjustments (
            id, advance_id, invoice_id, adjusted_amount, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&adjustment.id)
    .bind(&adjustment.advance_id)
    .bind(&adjustment.invoice_id)
    .bind(adjustment.adjusted_amount)
    .bind(&adjustment.created_by)
    .bind(adjustment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(adjustment)
}

/// Advance money an invoice still holds: its adjustments minus whatever
/// was released back.
pub async fn adjusted_total(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Money> {
    let total: Money = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(x.adjusted_amount), 0)
        FROM advance_adjustments x
        WHERE x.invoice_id = ?1
          AND NOT EXISTS (SELECT 1 FROM advance_releases r WHERE r.adjustment_id = x.id)
        "#,
    )
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

pub async fn adjustments(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<AdvanceAdjustment>> {
    let rows = sqlx::query_as::<_, AdvanceAdjustment>(
        r#"
        SELECT id, advance_id, invoice_id, adjusted_amount, created_by, created_at
        FROM advance_adjustments
        WHERE invoice_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Adjustments of an invoice that have not been released yet.
pub async fn live_adjustments(
    conn: &mut SqliteConnection,
    invoice_id: &str,
) -> DbResult<Vec<AdvanceAdjustment>> {
    let rows = sqlx::query_as::<_, AdvanceAdjustment>(
        r#"
        SELECT x.id, x.advance_id, x.invoice_id, x.adjusted_amount, x.created_by, x.created_at
        FROM advance_adjustments x
        WHERE x.invoice_id = ?1
          AND NOT EXISTS (SELECT 1 FROM advance_releases r WHERE r.adjustment_id = x.id)
        ORDER BY x.created_at, x.rowid
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Gives an adjustment's money back to its advance and records the release.
///
/// The adjustment row itself is never touched; the unique key on
/// `advance_releases.adjustment_id` stops a second release.
pub async fn release(
    conn: &mut SqliteConnection,
    adjustment: &AdvanceAdjustment,
    reason: &str,
    actor_id: &str,
) -> DbResult<AdvanceRelease> {
    debug!(
        adjustment_id = %adjustment.id,
        advance_id = %adjustment.advance_id,
        amount = %adjustment.adjusted_amount,
        "Releasing advance adjustment"
    );

    let result = sqlx::query(
        r#"
        UPDATE advances
        SET adjusted_amount = adjusted_amount - ?2,
            released_amount = released_amount + ?2,
            balance_amount = balance_amount + ?2
        WHERE id = ?1 AND adjusted_amount >= ?2
        "#,
    )
    .bind(&adjustment.advance_id)
    .bind(adjustment.adjusted_amount)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::ConstraintViolation {
            message: format!(
                "advance {} does not hold the {} adjusted by {}",
                adjustment.advance_id, adjustment.adjusted_amount, adjustment.id
            ),
        });
    }

    let release = AdvanceRelease {
        id: Uuid::new_v4().to_string(),
        adjustment_id: adjustment.id.clone(),
        advance_id: adjustment.advance_id.clone(),
        invoice_id: adjustment.invoice_id.clone(),
        released_amount: adjustment.adjusted_amount,
        reason: reason.to_string(),
        created_by: actor_id.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO advance_releases (
            id, adjustment_id, advance_id, invoice_id, released_amount, reason,
            created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&release.id)
    .bind(&release.adjustment_id)
    .bind(&release.advance_id)
    .bind(&release.invoice_id)
    .bind(release.released_amount)
    .bind(&release.reason)
    .bind(&release.created_by)
    .bind(release.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(release)
}

pub async fn releases(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<AdvanceRelease>> {
    let rows = sqlx::query_as::<_, AdvanceRelease>(
        r#"
        SELECT id, adjustment_id, advance_id, invoice_id, released_amount, reason,
               created_by, created_at
        FROM advance_releases
        WHERE invoice_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct AdvanceRepository {
    pool: SqlitePool,
}

impl AdvanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AdvanceRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Advance>> {
        let advance = sqlx::query_as::<_, Advance>(&format!(
            "SELECT {ADVANCE_COLUMNS} FROM advances WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(advance)
    }

    /// All advances of a job, oldest first.
    pub async fn for_job(&self, job_id: &str) -> DbResult<Vec<Advance>> {
        let advances = sqlx::query_as::<_, Advance>(&format!(
            "SELECT {ADVANCE_COLUMNS} FROM advances WHERE job_id = ?1 ORDER BY received_on, id"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(advances)
    }

    pub async fn adjustments_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<AdvanceAdjustment>> {
        let mut conn = self.pool.acquire().await?;
        adjustments(&mut conn, invoice_id).await
    }

    pub async fn releases_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<AdvanceRelease>> {
        let mut conn = self.pool.acquire().await?;
        releases(&mut conn, invoice_id).await
    }
}
