//! # Inventory Movement Repository
//!
//! Stock movements raised by jobs (parts issued) and purchases (parts
//! received). The ledger never computes stock levels; it only needs to know
//! whether posted movements exist before a job or purchase is deleted.

use chrono::Utc;
use garage_core::Quantity;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

/// Document that raised a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementSource {
    Job,
    Purchase,
}

/// Number of posted movements raised by one document.
pub async fn posted_count(
    conn: &mut SqliteConnection,
    source: MovementSource,
    source_id: &str,
) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM inventory_movements WHERE source_kind = ?1 AND source_id = ?2 AND is_posted = 1",
    )
    .bind(source)
    .bind(source_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Records a movement and returns its id.
    pub async fn record(
        &self,
        company_id: &str,
        source: MovementSource,
        source_id: &str,
        part_id: &str,
        quantity: Quantity,
        posted: bool,
    ) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        debug!(%id, ?source, source_id, part_id, %quantity, posted, "Recording inventory movement");

        sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                id, company_id, source_kind, source_id, part_id, quantity, is_posted, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&id)
        .bind(company_id)
        .bind(source)
        .bind(source_id)
        .bind(part_id)
        .bind(quantity)
        .bind(posted)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn posted_count(&self, source: MovementSource, source_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        posted_count(&mut conn, source, source_id).await
    }
}
