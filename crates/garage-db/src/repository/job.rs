//! # Job Repository
//!
//! Job cards (work orders) as the job source of the ledger: status,
//! counterparties and billable lines.
//!
//! ## Job Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OPEN ──► IN_PROGRESS ──► CLOSED ──► (invoice DRAFT created)            │
//! │    │            │                                                       │
//! │    └────────────┴──► CANCELLED (no advances, no invoice)                │
//! │                                                                         │
//! │  Deletion goes through the integrity checker; a job with money or       │
//! │  posted stock attached cannot be deleted.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use garage_core::integrity::check_job_deletion;
use garage_core::validation::validate_description;
use garage_core::{CoreError, DependencyReport, Job, JobStatus, LineInput, RequestContext};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::repository::dependency::job_dependencies;
use crate::repository::inventory::MovementSource;

const JOB_COLUMNS: &str = "id, company_id, branch_id, customer_id, job_number, status, stock_posted, closed_at, lock_version";

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Takes the writer lock on a job by bumping its version.
pub async fn bump(conn: &mut SqliteConnection, job_id: &str, company_id: &str) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE job_cards SET lock_version = lock_version + 1 WHERE id = ?1 AND company_id = ?2",
    )
    .bind(job_id)
    .bind(company_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Job", job_id));
    }
    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, job_id: &str) -> DbResult<Job> {
    sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM job_cards WHERE id = ?1"))
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Job", job_id))
}

/// Billable lines of a job in entry order.
pub async fn lines(conn: &mut SqliteConnection, job_id: &str) -> DbResult<Vec<LineInput>> {
    let lines = sqlx::query_as::<_, LineInput>(
        r#"
        SELECT item_kind, description, linked_part_id, linked_service_id, hsn_sac,
               quantity, unit_price, gst_rate
        FROM job_lines
        WHERE job_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    job_id: &str,
    status: JobStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let closed_at = (status == JobStatus::Closed).then_some(now);

    sqlx::query(
        r#"
        UPDATE job_cards
        SET status = ?2, closed_at = COALESCE(?3, closed_at), updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(job_id)
    .bind(status)
    .bind(closed_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for job cards.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        JobRepository { pool }
    }

    /// Opens a job card in the context's company and branch.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
        job_number: &str,
    ) -> DbResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            company_id: ctx.company_id.clone(),
            branch_id: ctx.branch_id.clone(),
            customer_id: customer_id.to_string(),
            job_number: job_number.to_string(),
            status: JobStatus::Open,
            stock_posted: false,
            closed_at: None,
            lock_version: 0,
        };

        debug!(id = %job.id, job_number, "Creating job card");

        sqlx::query(
            r#"
            INSERT INTO job_cards (
                id, company_id, branch_id, customer_id, job_number,
                status, stock_posted, closed_at, lock_version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 0, ?8, ?8)
            "#,
        )
        .bind(&job.id)
        .bind(&job.company_id)
        .bind(&job.branch_id)
        .bind(&job.customer_id)
        .bind(&job.job_number)
        .bind(job.status)
        .bind(job.stock_posted)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    /// Appends a billable line to a job.
    pub async fn add_line(&self, job_id: &str, line: &LineInput) -> LedgerResult<()> {
        validate_description(&line.description)?;

        sqlx::query(
            r#"
            INSERT INTO job_lines (
                id, job_id, line_no, item_kind, description,
                linked_part_id, linked_service_id, hsn_sac,
                quantity, unit_price, gst_rate
            ) VALUES (
                ?1, ?2,
                (SELECT COALESCE(MAX(line_no), 0) + 1 FROM job_lines WHERE job_id = ?2),
                ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
            )
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(job_id)
        .bind(line.item_kind)
        .bind(line.description.trim())
        .bind(&line.linked_part_id)
        .bind(&line.linked_service_id)
        .bind(&line.hsn_sac)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.gst_rate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, job_id: &str) -> DbResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM job_cards WHERE id = ?1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    pub async fn lines(&self, job_id: &str) -> DbResult<Vec<LineInput>> {
        let mut conn = self.pool.acquire().await?;
        lines(&mut conn, job_id).await
    }

    /// Moves a job to IN_PROGRESS or CANCELLED. Closing goes through
    /// `LedgerService::close_job` so the inventory side is notified.
    pub async fn set_status(&self, ctx: &RequestContext, job_id: &str, status: JobStatus) -> LedgerResult<Job> {
        let mut tx = self.pool.begin().await?;
        bump(&mut tx, job_id, &ctx.company_id).await?;

        let job = get(&mut tx, job_id).await?;
        let allowed = matches!(
            (job.status, status),
            (JobStatus::Open, JobStatus::InProgress)
                | (JobStatus::Open, JobStatus::Cancelled)
                | (JobStatus::InProgress, JobStatus::Cancelled)
        );
        if !allowed {
            return Err(CoreError::InvalidTransition {
                from: job.status.as_str().to_string(),
                to: status.as_str().to_string(),
            }
            .into());
        }

        set_status(&mut tx, job_id, status, Utc::now()).await?;
        let job = get(&mut tx, job_id).await?;
        tx.commit().await?;

        info!(job_id, status = status.as_str(), "Job status changed");
        Ok(job)
    }

    /// Records that the job's parts have been issued from stock.
    pub async fn mark_stock_posted(&self, job_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE job_cards SET stock_posted = 1, updated_at = ?2 WHERE id = ?1")
            .bind(job_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Job", job_id));
        }
        Ok(())
    }

    /// Deletes a job card when nothing depends on it.
    ///
    /// ## Errors
    /// `CancellationBlocked` with the checker's reasons when anything
    /// (money, invoices, posted stock) still depends on the job.
    pub async fn delete(&self, ctx: &RequestContext, job_id: &str) -> LedgerResult<DependencyReport> {
        let mut tx = self.pool.begin().await?;
        bump(&mut tx, job_id, &ctx.company_id).await?;

        let deps = job_dependencies(&mut tx, job_id).await?;
        let report = check_job_deletion(job_id, &deps);
        if !report.can_proceed {
            return Err(CoreError::CancellationBlocked {
                reasons: report.blocking_reasons,
            }
            .into());
        }

        sqlx::query("DELETE FROM inventory_movements WHERE source_kind = ?1 AND source_id = ?2 AND is_posted = 0")
            .bind(MovementSource::Job)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM job_cards WHERE id = ?1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(job_id, actor = %ctx.actor_id, "Job card deleted");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_status_moves_and_rejects_reopening() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("INSERT INTO branches (id, company_id, name) VALUES ('br', 'co', 'Main')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO customers (id, company_id, name) VALUES ('cust', 'co', 'Asha')")
            .execute(db.pool())
            .await
            .unwrap();

        let ctx = RequestContext::new("co", "br", "user-1");
        let job = db.jobs().create(&ctx, "cust", "JC-1").await.unwrap();

        let job = db.jobs().set_status(&ctx, &job.id, JobStatus::InProgress).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.lock_version, 1);

        let job = db.jobs().set_status(&ctx, &job.id, JobStatus::Cancelled).await.unwrap();
        let err = db.jobs().set_status(&ctx, &job.id, JobStatus::Open).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_other_company_cannot_touch_job() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("INSERT INTO branches (id, company_id, name) VALUES ('br', 'co', 'Main')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO customers (id, company_id, name) VALUES ('cust', 'co', 'Asha')")
            .execute(db.pool())
            .await
            .unwrap();

        let job = db
            .jobs()
            .create(&RequestContext::new("co", "br", "user-1"), "cust", "JC-1")
            .await
            .unwrap();
        let stranger = RequestContext::new("other", "br", "user-2");
        let err = db.jobs().delete(&stranger, &job.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
