//! # Batch Repository
//!
//! The stock store: one row per received lot with its cached on-hand
//! quantity.
//!
//! ## Conditional Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE batches SET quantity = quantity + :change                       │
//! │  WHERE id = :id AND quantity + :change >= 0                             │
//! │  RETURNING quantity                                                     │
//! │                                                                         │
//! │  row returned   ──► new quantity                                        │
//! │  no row         ──► change would go negative (or lost race): caller     │
//! │                     turns it into InsufficientStock / InvalidAdjustment │
//! │                     and the transaction rolls back. Never clamped.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantities change only through [`crate::workflow::stock::StockEngine`],
//! which writes the matching ledger entries in the same transaction.

use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{audit, product};
use pharmadist_core::{AuditAction, Batch};

const SELECT_BATCH: &str = r#"
    SELECT id, product_id, batch_number, quantity, unit_cost_cents,
           expiry_date, is_deleted, created_at, updated_at
    FROM batches
"#;

/// Repository for batch reads and soft deletion.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    /// Creates a new BatchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Gets a batch by ID, including soft-deleted ones.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Batch>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Live batches of one product, earliest expiry first.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<Batch>> {
        let sql = format!(
            "{SELECT_BATCH} WHERE product_id = ?1 AND is_deleted = 0 \
             ORDER BY expiry_date IS NULL, expiry_date, created_at"
        );
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(batches)
    }

    /// Live batches at or below `threshold` units.
    pub async fn list_low_stock(&self, threshold: i64) -> DbResult<Vec<Batch>> {
        let sql = format!(
            "{SELECT_BATCH} WHERE is_deleted = 0 AND quantity <= ?1 ORDER BY quantity, batch_number"
        );
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;

        Ok(batches)
    }

    /// Soft-deletes a batch. The row and its ledger history are kept.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let batch = fetch_live(&mut tx, id).await?;
        let product_name = product::name_of(&mut tx, &batch.product_id).await?;

        sqlx::query("UPDATE batches SET is_deleted = 1, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            AuditAction::Delete,
            "BATCH",
            id,
            &format!("{} / {}", product_name, batch.batch_number),
            json!({ "quantity": batch.quantity }),
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }
}

/// Loads a batch, deleted or not.
pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Batch>> {
    let sql = format!("{SELECT_BATCH} WHERE id = ?1");
    let batch = sqlx::query_as::<_, Batch>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(batch)
}

/// Loads a non-deleted batch or fails with NotFound.
pub(crate) async fn fetch_live(conn: &mut SqliteConnection, id: &str) -> DbResult<Batch> {
    fetch(conn, id)
        .await?
        .filter(|batch| !batch.is_deleted)
        .ok_or_else(|| DbError::not_found("Batch", id))
}

/// Finds the live batch of a product with a given batch number.
pub(crate) async fn fetch_by_number(
    conn: &mut SqliteConnection,
    product_id: &str,
    batch_number: &str,
) -> DbResult<Option<Batch>> {
    let sql = format!("{SELECT_BATCH} WHERE product_id = ?1 AND batch_number = ?2 AND is_deleted = 0");
    let batch = sqlx::query_as::<_, Batch>(&sql)
        .bind(product_id)
        .bind(batch_number)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(batch)
}

/// Inserts a batch row as given.
pub(crate) async fn insert(conn: &mut SqliteConnection, batch: &Batch) -> DbResult<()> {
    debug!(id = %batch.id, batch_number = %batch.batch_number, "Inserting batch");

    sqlx::query(
        r#"
        INSERT INTO batches (
            id, product_id, batch_number, quantity, unit_cost_cents,
            expiry_date, is_deleted, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&batch.id)
    .bind(&batch.product_id)
    .bind(&batch.batch_number)
    .bind(batch.quantity)
    .bind(batch.unit_cost_cents)
    .bind(batch.expiry_date)
    .bind(batch.is_deleted)
    .bind(batch.created_at)
    .bind(batch.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Applies a signed change unless it would take the batch below zero.
///
/// Returns the new quantity, or `None` when the guard rejected the update.
pub(crate) async fn apply_change(
    conn: &mut SqliteConnection,
    id: &str,
    change: i64,
) -> DbResult<Option<i64>> {
    debug!(batch_id = %id, change, "Applying batch quantity change");

    let new_quantity: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE batches SET
            quantity = quantity + ?2,
            updated_at = ?3
        WHERE id = ?1 AND quantity + ?2 >= 0
        RETURNING quantity
        "#,
    )
    .bind(id)
    .bind(change)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(new_quantity)
}

/// Current cached quantity, used to report a lost conditional update.
pub(crate) async fn current_quantity(conn: &mut SqliteConnection, id: &str) -> DbResult<i64> {
    let quantity: Option<i64> = sqlx::query_scalar("SELECT quantity FROM batches WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    quantity.ok_or_else(|| DbError::not_found("Batch", id))
}
