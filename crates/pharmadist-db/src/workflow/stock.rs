//! # Stock Mutation Engine
//!
//! The only code that changes `batches.quantity`. Every call validates the
//! balance, applies a guarded update and appends the matching ledger entries
//! on the caller's connection. The engine never commits.
//!
//! ## Call Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut tx = pool.begin().await?;                                      │
//! │                                                                         │
//! │  engine.deduct(&mut tx, batch, qty, "INV-…")  ─┐                        │
//! │  engine.deduct(&mut tx, batch, qty, "INV-…")   ├─ any Err: tx dropped,  │
//! │  invoice::update_status(&mut tx, …)           ─┘   everything rolls back│
//! │                                                                         │
//! │  tx.commit().await?;                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`StockService`] wraps single engine calls in their own transaction for
//! callers that move stock outside a document workflow.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{audit, batch, ledger, product};
use pharmadist_core::stock::{
    advisory_kind, check_deduction, deduction_entries, plan_adjustment, receipt_entry,
    restoration_entries,
};
use pharmadist_core::validation::{validate_batch_number, validate_price_cents, validate_quantity, validate_reference};
use pharmadist_core::{
    AdjustmentType, AuditAction, Batch, CoreError, LedgerEntry, LineQuantity, MovementType,
    StockAdvisory,
};

// =============================================================================
// Results
// =============================================================================

/// Outcome of a deduct or restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMutation {
    pub batch_id: String,
    pub new_quantity: i64,
    pub entries: Vec<LedgerEntry>,
    /// Low / out-of-stock warning. Never blocks the mutation.
    pub advisory: Option<StockAdvisory>,
}

/// Outcome of an adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentMutation {
    pub batch_id: String,
    pub quantity_change: i64,
    pub new_quantity: i64,
    pub entry: LedgerEntry,
    pub advisory: Option<StockAdvisory>,
}

/// Stock arriving in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub product_id: String,
    pub batch_number: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub expiry_date: Option<NaiveDate>,
    /// OPENING or PURCHASE.
    pub kind: MovementType,
    /// Supplier invoice, GRN or "OPENING".
    pub reference: String,
}

/// Outcome of a receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReceipt {
    pub batch: Batch,
    /// True when a new batch row was created.
    pub created: bool,
    pub entry: LedgerEntry,
}

// =============================================================================
// Engine
// =============================================================================

/// Transaction-scoped stock mutations.
#[derive(Debug, Clone, Copy)]
pub struct StockEngine {
    low_stock_threshold: i64,
}

impl StockEngine {
    pub fn new(low_stock_threshold: i64) -> Self {
        StockEngine { low_stock_threshold }
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    /// Removes `paid + free` units from a batch.
    ///
    /// Writes a SALE entry for paid units and a FREE entry for free units.
    ///
    /// ## Errors
    /// - `Validation` for negative or all-zero quantities
    /// - `NotFound` for a missing or soft-deleted batch
    /// - `OutOfStock` when the batch is empty
    /// - `InsufficientStock` when it holds less than required, including when
    ///   a concurrent writer drained it between check and update
    pub async fn deduct(
        &self,
        conn: &mut SqliteConnection,
        batch_id: &str,
        qty: LineQuantity,
        reference: &str,
    ) -> DbResult<StockMutation> {
        qty.validate()?;

        let batch = batch::fetch_live(conn, batch_id).await?;
        let product_name = product::name_of(conn, &batch.product_id).await?;
        check_deduction(&product_name, batch.quantity, qty.total())?;

        let new_quantity = match batch::apply_change(conn, batch_id, -qty.total()).await? {
            Some(quantity) => quantity,
            None => {
                let available = batch::current_quantity(conn, batch_id).await?;
                check_deduction(&product_name, available, qty.total())?;
                return Err(CoreError::InsufficientStock {
                    product: product_name,
                    available,
                    required: qty.total(),
                }
                .into());
            }
        };

        let mut entries = Vec::with_capacity(2);
        for draft in deduction_entries(&batch.product_id, batch_id, qty, reference) {
            entries.push(ledger::append(conn, &draft).await?);
        }

        let advisory = self.advisory(&batch, &product_name, new_quantity);

        Ok(StockMutation {
            batch_id: batch_id.to_string(),
            new_quantity,
            entries,
            advisory,
        })
    }

    /// Exact reverse of [`Self::deduct`]: puts `paid + free` back and writes
    /// RETURN entries mirroring the split, noted "reversal".
    ///
    /// Soft-deleted batches still accept restorations so that documents
    /// confirmed before the delete can be reversed.
    pub async fn restore(
        &self,
        conn: &mut SqliteConnection,
        batch_id: &str,
        qty: LineQuantity,
        reference: &str,
    ) -> DbResult<StockMutation> {
        qty.validate()?;

        let batch = batch::fetch(conn, batch_id)
            .await?
            .ok_or_else(|| DbError::not_found("Batch", batch_id))?;

        let new_quantity = batch::apply_change(conn, batch_id, qty.total())
            .await?
            .ok_or_else(|| DbError::not_found("Batch", batch_id))?;

        let mut entries = Vec::with_capacity(2);
        for draft in restoration_entries(&batch.product_id, batch_id, qty, reference) {
            entries.push(ledger::append(conn, &draft).await?);
        }

        Ok(StockMutation {
            batch_id: batch_id.to_string(),
            new_quantity,
            entries,
            advisory: None,
        })
    }

    /// Applies a typed adjustment and writes exactly one ledger entry.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive quantity
    /// - `NotFound` for a missing batch
    /// - `InvalidAdjustment` when the result would be negative
    pub async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        batch_id: &str,
        adjustment_type: AdjustmentType,
        quantity: i64,
        reason: &str,
        reference: &str,
    ) -> DbResult<AdjustmentMutation> {
        let batch = batch::fetch_live(conn, batch_id).await?;
        self.adjust_loaded(conn, &batch, adjustment_type, quantity, reason, reference)
            .await
    }

    /// [`adjust`](Self::adjust) on a batch the caller already loaded, which
    /// may be soft-deleted when the caller allows it.
    pub(crate) async fn adjust_loaded(
        &self,
        conn: &mut SqliteConnection,
        batch: &Batch,
        adjustment_type: AdjustmentType,
        quantity: i64,
        reason: &str,
        reference: &str,
    ) -> DbResult<AdjustmentMutation> {
        let batch_id = batch.id.as_str();
        let product_name = product::name_of(conn, &batch.product_id).await?;
        let plan = plan_adjustment(
            &product_name,
            &batch.product_id,
            batch_id,
            batch.quantity,
            adjustment_type,
            quantity,
            reference,
            reason,
        )?;

        let new_quantity = match batch::apply_change(conn, batch_id, plan.quantity_change).await? {
            Some(quantity) => quantity,
            None => {
                let available = batch::current_quantity(conn, batch_id).await?;
                return Err(CoreError::InvalidAdjustment {
                    product: product_name,
                    available,
                    change: plan.quantity_change,
                }
                .into());
            }
        };

        let entry = ledger::append(conn, &plan.entry).await?;
        let advisory = if plan.quantity_change < 0 {
            self.advisory(batch, &product_name, new_quantity)
        } else {
            None
        };

        Ok(AdjustmentMutation {
            batch_id: batch_id.to_string(),
            quantity_change: plan.quantity_change,
            new_quantity,
            entry,
            advisory,
        })
    }

    /// Receives stock into a new batch, or tops up the live batch with the
    /// same product and batch number. Writes one OPENING/PURCHASE entry.
    pub async fn receive(
        &self,
        conn: &mut SqliteConnection,
        input: &ReceiveStock,
    ) -> DbResult<StockReceipt> {
        validate_batch_number(&input.batch_number)?;
        validate_quantity(input.quantity)?;
        validate_price_cents(input.unit_cost_cents)?;
        validate_reference(&input.reference)?;

        product::fetch(conn, &input.product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &input.product_id))?;

        let batch_number = input.batch_number.trim();
        let (batch_id, created) =
            match batch::fetch_by_number(conn, &input.product_id, batch_number).await? {
                Some(existing) => (existing.id, false),
                None => {
                    let now = Utc::now();
                    let new_batch = Batch {
                        id: Uuid::new_v4().to_string(),
                        product_id: input.product_id.clone(),
                        batch_number: batch_number.to_string(),
                        quantity: 0,
                        unit_cost_cents: input.unit_cost_cents,
                        expiry_date: input.expiry_date,
                        is_deleted: false,
                        created_at: now,
                        updated_at: now,
                    };
                    batch::insert(conn, &new_batch).await?;
                    (new_batch.id, true)
                }
            };

        let draft = receipt_entry(
            &input.product_id,
            &batch_id,
            input.kind,
            input.quantity,
            &input.reference,
        )?;
        batch::apply_change(conn, &batch_id, input.quantity)
            .await?
            .ok_or_else(|| DbError::not_found("Batch", &batch_id))?;
        let entry = ledger::append(conn, &draft).await?;

        let batch = batch::fetch_live(conn, &batch_id).await?;
        Ok(StockReceipt {
            batch,
            created,
            entry,
        })
    }

    fn advisory(&self, batch: &Batch, product_name: &str, remaining: i64) -> Option<StockAdvisory> {
        let kind = advisory_kind(remaining, self.low_stock_threshold)?;
        warn!(
            batch_id = %batch.id,
            product = %product_name,
            remaining,
            ?kind,
            "Stock advisory"
        );
        Some(StockAdvisory {
            kind,
            product_id: batch.product_id.clone(),
            product_name: product_name.to_string(),
            batch_id: batch.id.clone(),
            batch_number: batch.batch_number.clone(),
            remaining,
        })
    }
}

// =============================================================================
// Single-call Service
// =============================================================================

/// Engine calls that open and commit their own transaction, with an audit
/// record on the batch.
#[derive(Debug, Clone)]
pub struct StockService {
    pool: SqlitePool,
    engine: StockEngine,
}

impl StockService {
    pub fn new(pool: SqlitePool, engine: StockEngine) -> Self {
        StockService { pool, engine }
    }

    pub async fn deduct(&self, batch_id: &str, qty: LineQuantity, reference: &str) -> DbResult<StockMutation> {
        let mut tx = self.pool.begin().await?;
        let mutation = self.engine.deduct(&mut tx, batch_id, qty, reference).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "BATCH",
            batch_id,
            reference,
            json!({ "paid": qty.paid, "free": qty.free, "new_quantity": mutation.new_quantity }),
        )
        .await?;
        tx.commit().await?;

        info!(batch_id, reference, new_quantity = mutation.new_quantity, "Stock deducted");
        Ok(mutation)
    }

    pub async fn restore(&self, batch_id: &str, qty: LineQuantity, reference: &str) -> DbResult<StockMutation> {
        let mut tx = self.pool.begin().await?;
        let mutation = self.engine.restore(&mut tx, batch_id, qty, reference).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "BATCH",
            batch_id,
            reference,
            json!({ "restored_paid": qty.paid, "restored_free": qty.free, "new_quantity": mutation.new_quantity }),
        )
        .await?;
        tx.commit().await?;

        info!(batch_id, reference, new_quantity = mutation.new_quantity, "Stock restored");
        Ok(mutation)
    }

    /// Receives stock (OPENING / PURCHASE).
    pub async fn receive(&self, input: &ReceiveStock) -> DbResult<StockReceipt> {
        let mut tx = self.pool.begin().await?;
        let receipt = self.engine.receive(&mut tx, input).await?;
        let action = if receipt.created {
            AuditAction::Create
        } else {
            AuditAction::Update
        };
        audit::record(
            &mut tx,
            action,
            "BATCH",
            &receipt.batch.id,
            &receipt.batch.batch_number,
            json!({
                "movement_type": input.kind,
                "received": input.quantity,
                "new_quantity": receipt.batch.quantity,
                "reference": input.reference,
            }),
        )
        .await?;
        tx.commit().await?;

        info!(
            batch_id = %receipt.batch.id,
            batch_number = %receipt.batch.batch_number,
            quantity = input.quantity,
            "Stock received"
        );
        Ok(receipt)
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
    use pharmadist_core::AdvisoryKind;

    #[tokio::test]
    async fn test_paid_free_split() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;

        let mutation = db
            .stock()
            .deduct(&batch.id, LineQuantity::new(3, 2), "INV-T-1")
            .await
            .unwrap();

        assert_eq!(mutation.new_quantity, 5);
        assert_eq!(mutation.entries.len(), 2);
        assert_eq!(mutation.entries[0].movement_type, MovementType::Sale);
        assert_eq!(mutation.entries[0].quantity, -3);
        assert_eq!(mutation.entries[1].movement_type, MovementType::Free);
        assert_eq!(mutation.entries[1].quantity, -2);
        assert_eq!(mutation.advisory.unwrap().kind, AdvisoryKind::LowStock);

        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
        assert_eq!(db.ledger().balance_for_batch(&batch.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_reversal_exactness() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let stock = db.stock();

        stock.deduct(&batch.id, LineQuantity::new(3, 2), "INV-T-2").await.unwrap();
        let restored = stock
            .restore(&batch.id, LineQuantity::new(3, 2), "INV-T-2")
            .await
            .unwrap();

        assert_eq!(restored.new_quantity, 10);
        assert!(restored
            .entries
            .iter()
            .all(|e| e.movement_type == MovementType::Return && e.notes.as_deref() == Some("reversal")));
        assert_eq!(restored.entries.iter().map(|e| e.quantity).sum::<i64>(), 5);

        let entries = db.ledger().list_by_reference("INV-T-2").await.unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries.iter().map(|e| e.quantity).sum::<i64>(), 0);
    }

    #[tokio::test]
    async fn test_zero_floor() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Seclo 20mg", 500).await;
        let batch = seed_batch(&db, &product.id, "SC-01", 5).await;

        let err = db
            .stock()
            .deduct(&batch.id, LineQuantity::new(7, 0), "INV-T-3")
            .await
            .unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&CoreError::InsufficientStock {
                product: "Seclo 20mg".to_string(),
                available: 5,
                required: 7,
            })
        );

        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
        assert!(db.ledger().list_by_reference("INV-T-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_stock_gate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Seclo 20mg", 500).await;
        let batch = seed_batch(&db, &product.id, "SC-02", 2).await;
        let stock = db.stock();

        let drained = stock.deduct(&batch.id, LineQuantity::new(2, 0), "INV-T-4").await.unwrap();
        assert_eq!(drained.advisory.unwrap().kind, AdvisoryKind::OutOfStock);

        let err = stock
            .deduct(&batch.id, LineQuantity::new(1, 0), "INV-T-5")
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::OutOfStock { .. })));
    }

    #[tokio::test]
    async fn test_deduct_rejects_empty_line_and_missing_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let stock = db.stock();

        let err = stock.deduct(&batch.id, LineQuantity::new(0, 0), "X").await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::Validation(_))));

        let err = stock.deduct("missing", LineQuantity::new(1, 0), "X").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_receive_creates_then_tops_up() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let stock = db.stock();

        let mut input = ReceiveStock {
            product_id: product.id.clone(),
            batch_number: "NP-09".to_string(),
            quantity: 100,
            unit_cost_cents: 90,
            expiry_date: NaiveDate::from_ymd_opt(2027, 12, 31),
            kind: MovementType::Opening,
            reference: "OPENING".to_string(),
        };
        let first = stock.receive(&input).await.unwrap();
        assert!(first.created);
        assert_eq!(first.batch.quantity, 100);
        assert_eq!(first.entry.movement_type, MovementType::Opening);

        input.kind = MovementType::Purchase;
        input.quantity = 40;
        input.reference = "GRN-77".to_string();
        let second = stock.receive(&input).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.batch.id, first.batch.id);
        assert_eq!(second.batch.quantity, 140);
        assert_eq!(db.ledger().balance_for_batch(&first.batch.id).await.unwrap(), 140);
    }

    #[tokio::test]
    async fn test_ledger_rejects_updates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;

        let err = sqlx::query("UPDATE stock_ledger SET quantity = 99 WHERE batch_id = ?1")
            .bind(&batch.id)
            .execute(db.pool())
            .await
            .map_err(DbError::from)
            .unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));

        let err = sqlx::query("DELETE FROM stock_ledger")
            .execute(db.pool())
            .await
            .map_err(DbError::from)
            .unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));
    }
}
