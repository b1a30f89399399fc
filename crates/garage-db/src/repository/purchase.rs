//! # Purchase Repository
//!
//! Vendor bills as far as the ledger cares: their payments and whether
//! stock was posted. Deletion goes through the integrity checker.

use chrono::{NaiveDate, Utc};
use garage_core::integrity::check_purchase_deletion;
use garage_core::validation::{validate_payment_amount, validate_reason};
use garage_core::{
    CoreError, DependencyReport, Money, PaymentMode, Purchase, PurchasePayment, PurchaseStatus,
    RequestContext,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::repository::dependency::purchase_dependencies;
use crate::repository::inventory::MovementSource;

const PURCHASE_COLUMNS: &str =
    "id, company_id, branch_id, vendor_name, bill_number, status, stock_posted, grand_total";

/// Takes the writer lock on a purchase with a no-op write.
async fn touch(conn: &mut SqliteConnection, purchase_id: &str, company_id: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE purchases SET status = status WHERE id = ?1 AND company_id = ?2")
        .bind(purchase_id)
        .bind(company_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Purchase", purchase_id));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Records a DRAFT vendor bill.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        vendor_name: &str,
        bill_number: Option<&str>,
        grand_total: Money,
    ) -> DbResult<Purchase> {
        let purchase = Purchase {
            id: Uuid::new_v4().to_string(),
            company_id: ctx.company_id.clone(),
            branch_id: ctx.branch_id.clone(),
            vendor_name: vendor_name.trim().to_string(),
            bill_number: bill_number.map(str::to_string),
            status: PurchaseStatus::Draft,
            stock_posted: false,
            grand_total,
        };

        debug!(id = %purchase.id, vendor = %purchase.vendor_name, "Creating purchase");

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, company_id, branch_id, vendor_name, bill_number,
                status, stock_posted, grand_total, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.company_id)
        .bind(&purchase.branch_id)
        .bind(&purchase.vendor_name)
        .bind(&purchase.bill_number)
        .bind(purchase.status)
        .bind(purchase.stock_posted)
        .bind(purchase.grand_total)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(purchase)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    /// Finalizes a bill, optionally marking its stock as posted.
    pub async fn finalize(&self, ctx: &RequestContext, purchase_id: &str, stock_posted: bool) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE purchases SET status = ?3, stock_posted = ?4
            WHERE id = ?1 AND company_id = ?2 AND status = 'DRAFT'
            "#,
        )
        .bind(purchase_id)
        .bind(&ctx.company_id)
        .bind(PurchaseStatus::Finalized)
        .bind(stock_posted)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Draft purchase", purchase_id));
        }
        Ok(())
    }

    /// Records a payment made to the vendor and returns its id.
    pub async fn record_payment(
        &self,
        ctx: &RequestContext,
        purchase_id: &str,
        amount: Money,
        mode: PaymentMode,
        paid_on: NaiveDate,
    ) -> LedgerResult<String> {
        validate_payment_amount(amount)?;

        let mut tx = self.pool.begin().await?;
        touch(&mut tx, purchase_id, &ctx.company_id).await?;

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO purchase_payments (
                id, purchase_id, amount, paid_on, mode, is_reversed, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)
            "#,
        )
        .bind(&id)
        .bind(purchase_id)
        .bind(amount)
        .bind(paid_on)
        .bind(mode)
        .bind(&ctx.actor_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(purchase_id, payment_id = %id, %amount, "Purchase payment recorded");
        Ok(id)
    }

    /// Marks a purchase payment as reversed, recording who reversed it,
    /// when and why. The payment row itself is never removed.
    pub async fn reverse_payment(&self, ctx: &RequestContext, payment_id: &str, reason: &str) -> LedgerResult<()> {
        let reason = validate_reason("reversal reason", reason)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE purchase_payments
            SET is_reversed = 1, reversed_at = ?3, reversed_by = ?4, reversal_reason = ?5
            WHERE id = ?1
              AND is_reversed = 0
              AND purchase_id IN (SELECT id FROM purchases WHERE company_id = ?2)
            "#,
        )
        .bind(payment_id)
        .bind(&ctx.company_id)
        .bind(Utc::now())
        .bind(&ctx.actor_id)
        .bind(&reason)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT 1 FROM purchase_payments
                WHERE id = ?1 AND purchase_id IN (SELECT id FROM purchases WHERE company_id = ?2)
                "#,
            )
            .bind(payment_id)
            .bind(&ctx.company_id)
            .fetch_optional(&mut *tx)
            .await?;

            return Err(match exists {
                Some(_) => CoreError::AlreadyReversed(payment_id.to_string()).into(),
                None => DbError::not_found("Purchase payment", payment_id).into(),
            });
        }

        tx.commit().await?;

        info!(payment_id, actor = %ctx.actor_id, %reason, "Purchase payment reversed");
        Ok(())
    }

    /// Payment rows of a purchase, reversed ones included, oldest first.
    pub async fn payments(&self, purchase_id: &str) -> DbResult<Vec<PurchasePayment>> {
        let rows = sqlx::query_as::<_, PurchasePayment>(
            r#"
            SELECT id, purchase_id, amount, paid_on, mode, is_reversed,
                   reversed_at, reversed_by, reversal_reason, created_by, created_at
            FROM purchase_payments
            WHERE purchase_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Deletes a purchase when nothing depends on it.
    ///
    /// ## Errors
    /// `CancellationBlocked` with the checker's reasons.
    pub async fn delete(&self, ctx: &RequestContext, purchase_id: &str) -> LedgerResult<DependencyReport> {
        let mut tx = self.pool.begin().await?;
        touch(&mut tx, purchase_id, &ctx.company_id).await?;

        let deps = purchase_dependencies(&mut tx, purchase_id).await?;
        let report = check_purchase_deletion(purchase_id, &deps);
        if !report.can_proceed {
            return Err(CoreError::CancellationBlocked {
                reasons: report.blocking_reasons,
            }
            .into());
        }

        sqlx::query("DELETE FROM inventory_movements WHERE source_kind = ?1 AND source_id = ?2 AND is_posted = 0")
            .bind(MovementSource::Purchase)
            .bind(purchase_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM purchases WHERE id = ?1")
            .bind(purchase_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(purchase_id, actor = %ctx.actor_id, "Purchase deleted");
        Ok(report)
    }
}
