//! # Ledger Repository
//!
//! The append-only stock ledger. This module offers inserts and reads only;
//! the schema additionally rejects UPDATE and DELETE with triggers.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use pharmadist_core::{LedgerDraft, LedgerEntry};

const SELECT_ENTRY: &str = r#"
    SELECT id, product_id, batch_id, movement_type, quantity, reference, notes, created_at
    FROM stock_ledger
"#;

/// Repository for reading ledger entries.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Entries of one batch in write order.
    pub async fn list_for_batch(&self, batch_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!("{SELECT_ENTRY} WHERE batch_id = ?1 ORDER BY created_at, rowid");
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Entries written under one reference (invoice number, sample number,
    /// adjustment id).
    pub async fn list_by_reference(&self, reference: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!("{SELECT_ENTRY} WHERE reference = ?1 ORDER BY created_at, rowid");
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Sum of the batch's entries: what its quantity should be.
    pub async fn balance_for_batch(&self, batch_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        balance(&mut conn, batch_id).await
    }
}

/// Appends one entry.
pub(crate) async fn append(conn: &mut SqliteConnection, draft: &LedgerDraft) -> DbResult<LedgerEntry> {
    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        product_id: draft.product_id.clone(),
        batch_id: draft.batch_id.clone(),
        movement_type: draft.movement_type,
        quantity: draft.quantity,
        reference: draft.reference.clone(),
        notes: draft.notes.clone(),
        created_at: Utc::now(),
    };

    debug!(
        batch_id = ?entry.batch_id,
        movement_type = %entry.movement_type,
        quantity = entry.quantity,
        reference = %entry.reference,
        "Appending ledger entry"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_ledger (
            id, product_id, batch_id, movement_type, quantity, reference, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.product_id)
    .bind(&entry.batch_id)
    .bind(entry.movement_type)
    .bind(entry.quantity)
    .bind(&entry.reference)
    .bind(&entry.notes)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

/// Ledger sum for one batch.
pub(crate) async fn balance(conn: &mut SqliteConnection, batch_id: &str) -> DbResult<i64> {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM stock_ledger WHERE batch_id = ?1",
    )
    .bind(batch_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sum)
}

/// Cached quantity next to ledger sum, for every batch.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct BatchBalance {
    pub batch_id: String,
    pub cached_quantity: i64,
    pub ledger_quantity: i64,
}

pub(crate) async fn all_balances(conn: &mut SqliteConnection) -> DbResult<Vec<BatchBalance>> {
    let rows = sqlx::query_as::<_, BatchBalance>(
        r#"
        SELECT b.id AS batch_id,
               b.quantity AS cached_quantity,
               COALESCE(SUM(l.quantity), 0) AS ledger_quantity
        FROM batches b
        LEFT JOIN stock_ledger l ON l.batch_id = b.id
        GROUP BY b.id, b.quantity
        ORDER BY b.id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}
