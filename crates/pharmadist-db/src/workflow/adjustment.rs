//! # Adjustment Workflow
//!
//! Damage, expiry write-offs, found/lost stock, corrections and customer
//! returns. One adjustment is one row, at most one ledger entry and one
//! audit record, committed together.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::stock::StockEngine;
use crate::error::{DbError, DbResult};
use crate::repository::{adjustment, audit, batch};
use pharmadist_core::validation::{validate_quantity, validate_reason};
use pharmadist_core::{
    AdjustmentType, AuditAction, LedgerEntry, ReturnAction, StockAdjustment, StockAdvisory,
    ValidationError,
};

/// Input for [`AdjustmentWorkflow::create_adjustment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub batch_id: String,
    pub product_id: String,
    pub adjustment_type: AdjustmentType,
    /// Entered quantity, always positive. The sign comes from the type.
    pub quantity: i64,
    pub reason: String,
    pub invoice_id: Option<String>,
    /// RETURN adjustments only. SCRAP records the return without moving stock.
    pub return_action: Option<ReturnAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    pub adjustment: StockAdjustment,
    pub new_quantity: i64,
    /// None for scrapped returns.
    pub entry: Option<LedgerEntry>,
    pub advisory: Option<StockAdvisory>,
}

/// Records an adjustment on the caller's transaction.
pub(crate) async fn record_adjustment(
    engine: &StockEngine,
    conn: &mut SqliteConnection,
    input: &NewAdjustment,
) -> DbResult<AdjustmentOutcome> {
    validate_quantity(input.quantity)?;
    validate_reason(&input.reason)?;

    // Invoice returns follow `restore`: units sold from a batch that was
    // trashed since can still come back onto it.
    let invoice_return = input.adjustment_type == AdjustmentType::Return && input.invoice_id.is_some();
    let target = if invoice_return {
        batch::fetch(conn, &input.batch_id)
            .await?
            .ok_or_else(|| DbError::not_found("Batch", &input.batch_id))?
    } else {
        batch::fetch_live(conn, &input.batch_id).await?
    };
    if target.product_id != input.product_id {
        return Err(ValidationError::InvalidFormat {
            field: "product_id".to_string(),
            reason: format!("batch {} belongs to a different product", target.batch_number),
        }
        .into());
    }

    let scrapped = match input.return_action {
        Some(ReturnAction::Scrap) => true,
        Some(ReturnAction::Restock) | None => false,
    };
    if input.return_action.is_some() && input.adjustment_type != AdjustmentType::Return {
        return Err(ValidationError::InvalidFormat {
            field: "return_action".to_string(),
            reason: format!("not allowed on a {} adjustment", input.adjustment_type),
        }
        .into());
    }

    let id = Uuid::new_v4().to_string();
    let reason = input.reason.trim();

    let (quantity_change, new_quantity, entry, advisory) = if scrapped {
        (0, target.quantity, None, None)
    } else {
        let mutation = engine
            .adjust_loaded(conn, &target, input.adjustment_type, input.quantity, reason, &id)
            .await?;
        (
            mutation.quantity_change,
            mutation.new_quantity,
            Some(mutation.entry),
            mutation.advisory,
        )
    };

    let row = StockAdjustment {
        id,
        batch_id: input.batch_id.clone(),
        product_id: input.product_id.clone(),
        adjustment_type: input.adjustment_type,
        quantity: input.quantity,
        quantity_change,
        reason: reason.to_string(),
        invoice_id: input.invoice_id.clone(),
        return_action: input.return_action,
        created_at: Utc::now(),
    };
    adjustment::insert(conn, &row).await?;

    audit::record(
        conn,
        AuditAction::Create,
        "STOCK_ADJUSTMENT",
        &row.id,
        &target.batch_number,
        json!({
            "adjustment_type": row.adjustment_type,
            "quantity": row.quantity,
            "quantity_change": quantity_change,
            "new_quantity": new_quantity,
            "return_action": row.return_action,
        }),
    )
    .await?;

    Ok(AdjustmentOutcome {
        adjustment: row,
        new_quantity,
        entry,
        advisory,
    })
}

/// Standalone adjustments.
#[derive(Debug, Clone)]
pub struct AdjustmentWorkflow {
    pool: SqlitePool,
    engine: StockEngine,
}

impl AdjustmentWorkflow {
    pub fn new(pool: SqlitePool, engine: StockEngine) -> Self {
        AdjustmentWorkflow { pool, engine }
    }

    /// Applies one adjustment in its own transaction.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive quantity, a blank reason or a
    ///   batch/product mismatch
    /// - `NotFound` for a missing batch
    /// - `InvalidAdjustment` when the batch would go negative
    pub async fn create_adjustment(&self, input: &NewAdjustment) -> DbResult<AdjustmentOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = record_adjustment(&self.engine, &mut tx, input).await?;
        tx.commit().await?;

        info!(
            adjustment_id = %outcome.adjustment.id,
            batch_id = %input.batch_id,
            adjustment_type = %input.adjustment_type,
            quantity_change = outcome.adjustment.quantity_change,
            new_quantity = outcome.new_quantity,
            "Stock adjusted"
        );
        Ok(outcome)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::workflow::testing::{seed_batch, seed_product};
    use pharmadist_core::{CoreError, MovementType};

    fn adjustment(batch_id: &str, product_id: &str, kind: AdjustmentType, quantity: i64) -> NewAdjustment {
        NewAdjustment {
            batch_id: batch_id.to_string(),
            product_id: product_id.to_string(),
            adjustment_type: kind,
            quantity,
            reason: "Cycle count".to_string(),
            invoice_id: None,
            return_action: None,
        }
    }

    #[tokio::test]
    async fn test_adjustment_sign_rule() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let workflow = db.adjustment_workflow();

        let damaged = workflow
            .create_adjustment(&adjustment(&batch.id, &product.id, AdjustmentType::Damage, 3))
            .await
            .unwrap();
        assert_eq!(damaged.new_quantity, 7);
        assert_eq!(damaged.adjustment.quantity_change, -3);
        let entry = damaged.entry.unwrap();
        assert_eq!(entry.movement_type, MovementType::Damage);
        assert_eq!(entry.quantity, -3);
        assert_eq!(entry.reference, damaged.adjustment.id);

        let found = workflow
            .create_adjustment(&adjustment(&batch.id, &product.id, AdjustmentType::Found, 3))
            .await
            .unwrap();
        assert_eq!(found.new_quantity, 10);
        assert_eq!(found.adjustment.quantity_change, 3);
        assert_eq!(found.entry.unwrap().movement_type, MovementType::Adjustment);

        assert_eq!(db.ledger().balance_for_batch(&batch.id).await.unwrap(), 10);
        assert_eq!(db.adjustments().list_for_batch(&batch.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_adjustment_cannot_go_negative() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 2).await;

        let err = db
            .adjustment_workflow()
            .create_adjustment(&adjustment(&batch.id, &product.id, AdjustmentType::Lost, 5))
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::InvalidAdjustment { available: 2, change: -5, .. })
        ));

        assert!(db.adjustments().list_for_batch(&batch.id).await.unwrap().is_empty());
        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 2);
    }

    #[tokio::test]
    async fn test_adjustment_rejects_wrong_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let napa = seed_product(&db, "Napa 500mg", 110).await;
        let seclo = seed_product(&db, "Seclo 20mg", 500).await;
        let batch = seed_batch(&db, &napa.id, "NP-01", 10).await;

        let err = db
            .adjustment_workflow()
            .create_adjustment(&adjustment(&batch.id, &seclo.id, AdjustmentType::Damage, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_scrapped_return_moves_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;

        let mut input = adjustment(&batch.id, &product.id, AdjustmentType::Return, 4);
        input.return_action = Some(ReturnAction::Scrap);
        let outcome = db.adjustment_workflow().create_adjustment(&input).await.unwrap();

        assert_eq!(outcome.adjustment.quantity_change, 0);
        assert_eq!(outcome.new_quantity, 10);
        assert!(outcome.entry.is_none());
        assert_eq!(db.ledger().list_for_batch(&batch.id).await.unwrap().len(), 1);
    }
}
