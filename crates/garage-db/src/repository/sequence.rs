//! # Sequence Repository
//!
//! Durable, scoped document-number counters.
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  allocate(conn, scope), always inside the caller's transaction         │
//! │                                                                         │
//! │  1. UPDATE counter SET n = n + 1 ... RETURNING n, prefix                │
//! │        │ row? ──────────────────────────────► PREFIX/FY/0000n           │
//! │        ▼ no row (scope never used)                                      │
//! │  2. INSERT counter (n = 1)                                              │
//! │        │ ok ────────────────────────────────► PREFIX/FY/00001           │
//! │        ▼ UNIQUE violation (another writer created it first)             │
//! │  3. re-run step 1 ONCE                                                  │
//! │        │ row? ──────────────────────────────► PREFIX/FY/0000n           │
//! │        ▼ still nothing                                                  │
//! │     SequenceExhaustion                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Step 3 is the only retry anywhere in the ledger. The counter increment
//! commits or rolls back with the document that consumed the number, so a
//! failed operation never burns a number.

use chrono::{DateTime, NaiveDate, Utc};
use garage_core::numbering::{
    format_number, resolve_fiscal_year, resolve_prefix, FiscalYearRecord, SequenceScope,
};
use garage_core::{CoreError, DocumentKind, IssuedNumber, SequenceCounter};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{is_unique_violation, DbError, DbResult, LedgerResult};

// =============================================================================
// Fiscal Year
// =============================================================================

/// Resolves the fiscal-year label for a document date.
///
/// An active record covering the date wins; a record whose label disagrees
/// with the date-derived label is logged as a data-quality warning.
pub async fn fiscal_year_for(
    conn: &mut SqliteConnection,
    company_id: &str,
    date: NaiveDate,
) -> DbResult<String> {
    let records: Vec<FiscalYearRecord> = sqlx::query_as(
        r#"
        SELECT label, start_date, end_date, is_active
        FROM fiscal_years
        WHERE company_id = ?1 AND is_active = 1
        "#,
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;

    let resolution = resolve_fiscal_year(date, &records);

    if let Some(label) = &resolution.malformed_record {
        warn!(
            company_id,
            %date,
            record_label = %label,
            derived_label = %resolution.label,
            "Fiscal-year record label is not YYYY-YY; using the date-derived label"
        );
    }
    if let Some(derived) = &resolution.derived_mismatch {
        warn!(
            company_id,
            %date,
            record_label = %resolution.label,
            derived_label = %derived,
            "Fiscal-year record disagrees with the date-derived label; using the record"
        );
    }

    Ok(resolution.label)
}

// =============================================================================
// Allocation
// =============================================================================

/// Issues the next number for `scope` inside the caller's transaction.
///
/// `prefix_candidates` are tried in order when the counter is created (and
/// when a stored prefix normalises to empty); the document kind's default
/// prefix is the last resort.
pub async fn allocate(
    conn: &mut SqliteConnection,
    scope: &SequenceScope,
    prefix_candidates: &[Option<&str>],
) -> LedgerResult<IssuedNumber> {
    let now = Utc::now();

    if let Some((n, stored)) = increment(conn, scope, now).await? {
        return Ok(issue(scope, &stored, prefix_candidates, n));
    }

    let prefix = resolve_prefix(prefix_candidates, scope.document_kind);
    let inserted = sqlx::query(
        r#"
        INSERT INTO sequence_counters (
            id, company_id, branch_id, fiscal_year, document_kind,
            prefix, current_number, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&scope.company_id)
    .bind(&scope.branch_id)
    .bind(&scope.fiscal_year)
    .bind(scope.document_kind)
    .bind(&prefix)
    .bind(now)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => {
            debug!(%scope, %prefix, "Created sequence counter");
            return Ok(issue(scope, &prefix, prefix_candidates, 1));
        }
        Err(e) if is_unique_violation(&e) => {
            debug!(%scope, "Counter created concurrently, re-reading once");
        }
        Err(e) => return Err(DbError::from(e).into()),
    }

    match increment(conn, scope, now).await? {
        Some((n, stored)) => Ok(issue(scope, &stored, prefix_candidates, n)),
        None => Err(CoreError::SequenceExhaustion {
            scope: scope.to_string(),
        }
        .into()),
    }
}

async fn increment(
    conn: &mut SqliteConnection,
    scope: &SequenceScope,
    now: DateTime<Utc>,
) -> DbResult<Option<(i64, String)>> {
    let row: Option<(i64, String)> = sqlx::query_as(
        r#"
        UPDATE sequence_counters
        SET current_number = current_number + 1, updated_at = ?5
        WHERE company_id = ?1 AND branch_id = ?2 AND fiscal_year = ?3 AND document_kind = ?4
        RETURNING current_number, prefix
        "#,
    )
    .bind(&scope.company_id)
    .bind(&scope.branch_id)
    .bind(&scope.fiscal_year)
    .bind(scope.document_kind)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

fn issue(
    scope: &SequenceScope,
    stored_prefix: &str,
    fallbacks: &[Option<&str>],
    sequence_number: i64,
) -> IssuedNumber {
    let mut candidates = Vec::with_capacity(fallbacks.len() + 1);
    candidates.push(Some(stored_prefix));
    candidates.extend_from_slice(fallbacks);
    let prefix = resolve_prefix(&candidates, scope.document_kind);

    IssuedNumber {
        formatted_number: format_number(&prefix, &scope.fiscal_year, sequence_number),
        sequence_number,
        fiscal_year: scope.fiscal_year.clone(),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for standalone counter access.
///
/// Ledger operations call [`allocate`] inside their own transaction; this
/// repository is for issuing numbers outside a document write and for
/// inspecting counters.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Issues the next number for `scope` in its own transaction.
    pub async fn next(
        &self,
        scope: &SequenceScope,
        prefix_candidates: &[Option<&str>],
    ) -> LedgerResult<IssuedNumber> {
        let mut tx = self.pool.begin().await?;
        let issued = allocate(&mut tx, scope, prefix_candidates).await?;
        tx.commit().await?;

        info!(%scope, number = %issued.formatted_number, "Issued document number");
        Ok(issued)
    }

    /// Builds the scope for a document date and issues the next number.
    pub async fn next_for_date(
        &self,
        company_id: &str,
        branch_id: &str,
        document_kind: DocumentKind,
        date: NaiveDate,
        prefix_candidates: &[Option<&str>],
    ) -> LedgerResult<IssuedNumber> {
        let fiscal_year = {
            let mut conn = self.pool.acquire().await?;
            fiscal_year_for(&mut conn, company_id, date).await?
        };

        let scope = SequenceScope {
            company_id: company_id.to_string(),
            branch_id: branch_id.to_string(),
            fiscal_year,
            document_kind,
        };
        self.next(&scope, prefix_candidates).await
    }

    /// Reads a counter without touching it.
    pub async fn current(&self, scope: &SequenceScope) -> DbResult<Option<SequenceCounter>> {
        let counter = sqlx::query_as::<_, SequenceCounter>(
            r#"
            SELECT id, company_id, branch_id, fiscal_year, document_kind,
                   prefix, current_number, created_at, updated_at
            FROM sequence_counters
            WHERE company_id = ?1 AND branch_id = ?2 AND fiscal_year = ?3 AND document_kind = ?4
            "#,
        )
        .bind(&scope.company_id)
        .bind(&scope.branch_id)
        .bind(&scope.fiscal_year)
        .bind(scope.document_kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counter)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn scope(kind: DocumentKind) -> SequenceScope {
        SequenceScope {
            company_id: "co".to_string(),
            branch_id: "br".to_string(),
            fiscal_year: "2025-26".to_string(),
            document_kind: kind,
        }
    }

    #[tokio::test]
    async fn test_first_number_creates_counter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sequences();

        let first = repo.next(&scope(DocumentKind::Invoice), &[Some("gac")]).await.unwrap();
        assert_eq!(first.formatted_number, "GAC/2025-26/00001");
        assert_eq!(first.sequence_number, 1);

        let second = repo.next(&scope(DocumentKind::Invoice), &[Some("other")]).await.unwrap();
        // stored prefix wins once the counter exists
        assert_eq!(second.formatted_number, "GAC/2025-26/00002");

        let counter = repo.current(&scope(DocumentKind::Invoice)).await.unwrap().unwrap();
        assert_eq!(counter.current_number, 2);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sequences();

        repo.next(&scope(DocumentKind::Invoice), &[]).await.unwrap();
        let receipt = repo.next(&scope(DocumentKind::PaymentReceipt), &[]).await.unwrap();
        assert_eq!(receipt.formatted_number, "RCPT/2025-26/00001");
    }

    #[tokio::test]
    async fn test_rolled_back_allocation_does_not_burn_a_number() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = scope(DocumentKind::AdvanceReceipt);

        db.sequences().next(&s, &[]).await.unwrap();
        {
            let mut tx = db.pool().begin().await.unwrap();
            let n = allocate(&mut tx, &s, &[]).await.unwrap();
            assert_eq!(n.sequence_number, 2);
            // dropped without commit
        }
        let n = db.sequences().next(&s, &[]).await.unwrap();
        assert_eq!(n.formatted_number, "ADV/2025-26/00002");
    }

    #[tokio::test]
    async fn test_counter_rows_cannot_decrease() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.sequences().next(&scope(DocumentKind::Invoice), &[]).await.unwrap();

        let err = sqlx::query("UPDATE sequence_counters SET current_number = 0")
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(matches!(DbError::from(err), DbError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn test_fiscal_year_from_record_or_date() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 7, 14).unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(fiscal_year_for(&mut conn, "co", date).await.unwrap(), "2025-26");
        drop(conn);

        db.directory()
            .insert_fiscal_year(
                "co",
                &FiscalYearRecord {
                    label: "2024-25".to_string(),
                    start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
                    is_active: true,
                },
            )
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(fiscal_year_for(&mut conn, "co", date).await.unwrap(), "2024-25");
    }
}
