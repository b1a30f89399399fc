//! # Directory Repository
//!
//! Branches, customers and fiscal-year records. The ledger only reads
//! these; the write methods exist for the host application and for tests.

use garage_core::numbering::{validate_fiscal_year_label, FiscalYearRecord};
use garage_core::{Branch, Customer};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerResult};

/// Loads a branch inside a transaction.
pub async fn branch(conn: &mut SqliteConnection, id: &str) -> DbResult<Branch> {
    sqlx::query_as::<_, Branch>(
        "SELECT id, company_id, name, state, gstin, invoice_prefix FROM branches WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Branch", id))
}

/// Loads a customer inside a transaction.
pub async fn customer(conn: &mut SqliteConnection, id: &str) -> DbResult<Customer> {
    sqlx::query_as::<_, Customer>(
        "SELECT id, company_id, name, state, gstin, phone FROM customers WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Customer", id))
}

/// Repository for counterparty and fiscal-year records.
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    pool: SqlitePool,
}

impl DirectoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DirectoryRepository { pool }
    }

    pub async fn insert_branch(&self, branch: &Branch) -> DbResult<()> {
        debug!(id = %branch.id, name = %branch.name, "Inserting branch");

        sqlx::query(
            r#"
            INSERT INTO branches (id, company_id, name, state, gstin, invoice_prefix)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.company_id)
        .bind(&branch.name)
        .bind(&branch.state)
        .bind(&branch.gstin)
        .bind(&branch.invoice_prefix)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_branch(&self, id: &str) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(
            "SELECT id, company_id, name, state, gstin, invoice_prefix FROM branches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(branch)
    }

    /// Changes the invoice prefix of a branch. Existing counters keep the
    /// prefix they were created with.
    pub async fn set_invoice_prefix(&self, branch_id: &str, prefix: Option<&str>) -> DbResult<()> {
        let result = sqlx::query("UPDATE branches SET invoice_prefix = ?2 WHERE id = ?1")
            .bind(branch_id)
            .bind(prefix)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Branch", branch_id));
        }
        Ok(())
    }

    pub async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, company_id, name, state, gstin, phone)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.company_id)
        .bind(&customer.name)
        .bind(&customer.state)
        .bind(&customer.gstin)
        .bind(&customer.phone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, company_id, name, state, gstin, phone FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Updates a customer's state (counterparty edits before finalize).
    pub async fn set_customer_state(&self, customer_id: &str, state: Option<&str>) -> DbResult<()> {
        let result = sqlx::query("UPDATE customers SET state = ?2 WHERE id = ?1")
            .bind(customer_id)
            .bind(state)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", customer_id));
        }
        Ok(())
    }

    /// Stores a fiscal-year record. Labels must be `YYYY-YY` because they
    /// end up inside document numbers.
    pub async fn insert_fiscal_year(&self, company_id: &str, record: &FiscalYearRecord) -> LedgerResult<()> {
        validate_fiscal_year_label(&record.label)?;
        debug!(company_id, label = %record.label, "Inserting fiscal year");

        sqlx::query(
            r#"
            INSERT INTO fiscal_years (id, company_id, label, start_date, end_date, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(company_id)
        .bind(&record.label)
        .bind(record.start_date)
        .bind(record.end_date)
        .bind(record.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fiscal_years(&self, company_id: &str) -> DbResult<Vec<FiscalYearRecord>> {
        let records = sqlx::query_as::<_, FiscalYearRecord>(
            r#"
            SELECT label, start_date, end_date, is_active
            FROM fiscal_years
            WHERE company_id = ?1
            ORDER BY start_date
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
