//! # Adjustment Repository

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use pharmadist_core::StockAdjustment;

const SELECT_ADJUSTMENT: &str = r#"
    SELECT id, batch_id, product_id, adjustment_type, quantity, quantity_change,
           reason, invoice_id, return_action, created_at
    FROM stock_adjustments
"#;

/// Repository for stock adjustment reads.
#[derive(Debug, Clone)]
pub struct AdjustmentRepository {
    pool: SqlitePool,
}

impl AdjustmentRepository {
    /// Creates a new AdjustmentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AdjustmentRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StockAdjustment>> {
        let sql = format!("{SELECT_ADJUSTMENT} WHERE id = ?1");
        let adjustment = sqlx::query_as::<_, StockAdjustment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(adjustment)
    }

    pub async fn list_for_batch(&self, batch_id: &str) -> DbResult<Vec<StockAdjustment>> {
        let sql = format!("{SELECT_ADJUSTMENT} WHERE batch_id = ?1 ORDER BY created_at, rowid");
        let adjustments = sqlx::query_as::<_, StockAdjustment>(&sql)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(adjustments)
    }

    /// Return adjustments recorded against an invoice.
    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<StockAdjustment>> {
        let sql = format!("{SELECT_ADJUSTMENT} WHERE invoice_id = ?1 ORDER BY created_at, rowid");
        let adjustments = sqlx::query_as::<_, StockAdjustment>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(adjustments)
    }
}

pub(crate) async fn insert(conn: &mut SqliteConnection, adjustment: &StockAdjustment) -> DbResult<()> {
    debug!(
        id = %adjustment.id,
        batch_id = %adjustment.batch_id,
        adjustment_type = %adjustment.adjustment_type,
        quantity_change = adjustment.quantity_change,
        "Inserting stock adjustment"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_adjustments (
            id, batch_id, product_id, adjustment_type, quantity, quantity_change,
            reason, invoice_id, return_action, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&adjustment.id)
    .bind(&adjustment.batch_id)
    .bind(&adjustment.product_id)
    .bind(adjustment.adjustment_type)
    .bind(adjustment.quantity)
    .bind(adjustment.quantity_change)
    .bind(&adjustment.reason)
    .bind(&adjustment.invoice_id)
    .bind(adjustment.return_action)
    .bind(adjustment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
