//! # Invoice Workflow
//!
//! Drives invoices through the status table in `pharmadist_core::invoice`
//! and applies the stock effect each transition names.
//!
//! ```text
//!   create ──► DRAFT ──confirm──► CONFIRMED ──payment──► PARTIAL / PAID
//!                │  (deduct)          │                       │
//!                │                    └──cancel / delete──────┴──► CANCELLED
//!                │                            (restore outstanding units)
//!                └──cancel──► CANCELLED (no stock)
//!
//!   trash: delete ──► is_deleted = 1 ──restore_from_trash──► DRAFT
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::adjustment::{record_adjustment, AdjustmentOutcome, NewAdjustment};
use super::stock::StockEngine;
use super::{deduct_lines, restore_lines};
use crate::error::{DbError, DbResult};
use crate::repository::{audit, batch, invoice, next_document_number, product, DocumentSeries};
use pharmadist_core::invoice::{invoice_totals, price_line, InvoiceEvent};
use pharmadist_core::validation::{validate_line_count, validate_quantity, validate_reason};
use pharmadist_core::{
    AdjustmentType, AuditAction, CoreError, DiscountType, Invoice, InvoiceLine, InvoiceStatus,
    LineQuantity, Money, ReturnAction, StockAdvisory, StockEffect, ValidationError,
};

// =============================================================================
// Inputs & Outputs
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInvoice {
    pub customer_id: String,
    pub store_id: Option<String>,
    pub seller_id: Option<String>,
    /// Invoice-level discount in minor units.
    pub discount_cents: i64,
    pub notes: Option<String>,
    pub lines: Vec<NewInvoiceLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    pub product_id: String,
    pub batch_id: Option<String>,
    pub paid_quantity: i64,
    pub free_quantity: i64,
    pub discount_type: DiscountType,
    pub discount_value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
}

/// Invoice after a transition, with any stock advisories it raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceOutcome {
    pub invoice: Invoice,
    pub advisories: Vec<StockAdvisory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub invoice_id: String,
    pub line_id: String,
    pub quantity: i64,
    pub action: ReturnAction,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnOutcome {
    pub adjustment: AdjustmentOutcome,
    pub line: InvoiceLine,
}

// =============================================================================
// Workflow
// =============================================================================

#[derive(Debug, Clone)]
pub struct InvoiceWorkflow {
    pool: SqlitePool,
    engine: StockEngine,
}

impl InvoiceWorkflow {
    pub fn new(pool: SqlitePool, engine: StockEngine) -> Self {
        InvoiceWorkflow { pool, engine }
    }

    /// Creates a DRAFT invoice with its lines.
    ///
    /// Product prices are snapshotted onto each line. Line amounts, subtotal,
    /// total and due are computed here; nothing touches stock.
    pub async fn create(&self, input: &NewInvoice) -> DbResult<InvoiceDetails> {
        if input.customer_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "customer_id".to_string(),
            }
            .into());
        }
        validate_line_count(input.lines.len())?;

        let mut tx = self.pool.begin().await?;

        let now = Utc::now();
        let invoice_id = Uuid::new_v4().to_string();
        let mut lines = Vec::with_capacity(input.lines.len());

        for line in &input.lines {
            let qty = LineQuantity::new(line.paid_quantity, line.free_quantity);
            qty.validate()?;
            validate_quantity(qty.total())?;

            let item = product::fetch(&mut tx, &line.product_id)
                .await?
                .ok_or_else(|| DbError::not_found("Product", &line.product_id))?;

            if let Some(batch_id) = &line.batch_id {
                let source = batch::fetch_live(&mut tx, batch_id).await?;
                if source.product_id != item.id {
                    return Err(ValidationError::InvalidFormat {
                        field: "batch_id".to_string(),
                        reason: format!("batch {} is not a batch of {}", source.batch_number, item.name),
                    }
                    .into());
                }
            }

            let amount = price_line(
                item.tp_rate(),
                line.paid_quantity,
                line.discount_type,
                line.discount_value,
            )?;

            lines.push(InvoiceLine {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice_id.clone(),
                product_id: item.id.clone(),
                batch_id: line.batch_id.clone(),
                paid_quantity: line.paid_quantity,
                free_quantity: line.free_quantity,
                unit_price_cents: item.sales_price_cents,
                tp_rate_cents: item.tp_rate_cents,
                cost_price_cents: item.cost_price_cents,
                discount_type: line.discount_type,
                discount_value: line.discount_value,
                line_total_cents: amount.net.cents(),
                returned_quantity: 0,
                created_at: now,
            });
        }

        let totals = invoice_totals(
            lines.iter().map(|l| Money::from_cents(l.line_total_cents)),
            Money::from_cents(input.discount_cents),
        )?;

        let invoice_number = next_document_number(&mut tx, DocumentSeries::Invoice).await?;
        let header = Invoice {
            id: invoice_id,
            invoice_number,
            customer_id: input.customer_id.clone(),
            store_id: input.store_id.clone(),
            seller_id: input.seller_id.clone(),
            status: InvoiceStatus::Draft,
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            paid_cents: 0,
            due_cents: totals.total.cents(),
            notes: input.notes.clone(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        };

        invoice::insert(&mut tx, &header).await?;
        for line in &lines {
            invoice::insert_line(&mut tx, line).await?;
        }

        audit::record(
            &mut tx,
            AuditAction::Create,
            "INVOICE",
            &header.id,
            &header.invoice_number,
            json!({
                "customer_id": header.customer_id,
                "lines": lines.len(),
                "total_cents": header.total_cents,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(
            invoice_id = %header.id,
            invoice_number = %header.invoice_number,
            total = header.total_cents,
            "Invoice created"
        );
        Ok(InvoiceDetails {
            invoice: header,
            lines,
        })
    }

    /// Confirms a DRAFT invoice, deducting every line that names a batch.
    ///
    /// ## Errors
    /// - `NotFound` for a missing or trashed invoice
    /// - `InvalidTransition` unless DRAFT
    /// - `OutOfStock` / `InsufficientStock` from the validation pass; no
    ///   batch is touched when any line fails
    pub async fn confirm(&self, invoice_id: &str) -> DbResult<InvoiceOutcome> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_active(&mut tx, invoice_id).await?;
        let transition = current
            .status
            .apply(&current.invoice_number, InvoiceEvent::Confirm)?;

        let lines = invoice::fetch_lines(&mut tx, invoice_id).await?;
        let stock_lines: Vec<(&str, LineQuantity)> = lines
            .iter()
            .filter_map(|l| l.batch_id.as_deref().map(|b| (b, l.quantity())))
            .collect();

        let advisories = deduct_lines(&self.engine, &mut tx, &stock_lines, &current.invoice_number).await?;

        invoice::update_status(&mut tx, invoice_id, transition.next, Some(Utc::now())).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "INVOICE",
            invoice_id,
            &current.invoice_number,
            json!({ "status": { "from": current.status, "to": transition.next } }),
        )
        .await?;

        let updated = fetch_required(&mut tx, invoice_id).await?;
        tx.commit().await?;

        info!(
            invoice_number = %updated.invoice_number,
            lines = stock_lines.len(),
            advisories = advisories.len(),
            "Invoice confirmed"
        );
        Ok(InvoiceOutcome {
            invoice: updated,
            advisories,
        })
    }

    /// Cancels an invoice. Stock-holding invoices give back every unit still
    /// out with the customer.
    pub async fn cancel(&self, invoice_id: &str) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_active(&mut tx, invoice_id).await?;
        let transition = current
            .status
            .apply(&current.invoice_number, InvoiceEvent::Cancel)?;

        if transition.effect == StockEffect::Restore {
            self.restore_outstanding(&mut tx, &current).await?;
        }

        invoice::update_status(&mut tx, invoice_id, transition.next, None).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "INVOICE",
            invoice_id,
            &current.invoice_number,
            json!({
                "status": { "from": current.status, "to": transition.next },
                "stock_restored": transition.effect == StockEffect::Restore,
            }),
        )
        .await?;

        let updated = fetch_required(&mut tx, invoice_id).await?;
        tx.commit().await?;

        info!(invoice_number = %updated.invoice_number, from = %current.status, "Invoice cancelled");
        Ok(updated)
    }

    /// Moves an invoice to the trash. An invoice that held stock is restored
    /// and forced to CANCELLED on the way.
    pub async fn delete(&self, invoice_id: &str) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_active(&mut tx, invoice_id).await?;
        let transition = current
            .status
            .apply(&current.invoice_number, InvoiceEvent::Delete)?;

        if transition.effect == StockEffect::Restore {
            self.restore_outstanding(&mut tx, &current).await?;
        }

        invoice::set_deleted(&mut tx, invoice_id, true, transition.next).await?;
        audit::record(
            &mut tx,
            AuditAction::Delete,
            "INVOICE",
            invoice_id,
            &current.invoice_number,
            json!({ "status": { "from": current.status, "to": transition.next } }),
        )
        .await?;

        let updated = fetch_required(&mut tx, invoice_id).await?;
        tx.commit().await?;

        info!(invoice_number = %updated.invoice_number, "Invoice moved to trash");
        Ok(updated)
    }

    /// Takes an invoice out of the trash as a DRAFT. Never moves stock.
    ///
    /// Deleting already settled the old returns (restocked units came back,
    /// everything else was restored), so the revived draft starts with no
    /// returns against its lines.
    pub async fn restore_from_trash(&self, invoice_id: &str) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_required(&mut tx, invoice_id).await?;
        if !current.is_deleted {
            return Err(CoreError::InvalidTransition {
                entity: "Invoice".to_string(),
                id: current.invoice_number,
                status: current.status.to_string(),
                action: "restore an invoice that is not in the trash".to_string(),
            }
            .into());
        }
        let transition = current
            .status
            .apply(&current.invoice_number, InvoiceEvent::RestoreFromTrash)?;

        invoice::set_deleted(&mut tx, invoice_id, false, transition.next).await?;
        let cleared = invoice::clear_returned(&mut tx, invoice_id).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "INVOICE",
            invoice_id,
            &current.invoice_number,
            json!({
                "restored_from_trash": true,
                "status": transition.next,
                "lines_with_returns_cleared": cleared,
            }),
        )
        .await?;

        let updated = fetch_required(&mut tx, invoice_id).await?;
        tx.commit().await?;

        info!(invoice_number = %updated.invoice_number, "Invoice restored from trash");
        Ok(updated)
    }

    /// Takes goods back against one line of a stock-holding invoice.
    ///
    /// RESTOCK puts the units back on the line's batch with a RETURN entry;
    /// SCRAP only records them. Either way the line's returned quantity
    /// grows, so later cancellation restores only what is still outstanding.
    pub async fn record_return(&self, request: &ReturnRequest) -> DbResult<ReturnOutcome> {
        validate_quantity(request.quantity)?;
        validate_reason(&request.reason)?;

        let mut tx = self.pool.begin().await?;

        let current = fetch_active(&mut tx, &request.invoice_id).await?;
        if !current.status.holds_stock() {
            return Err(CoreError::InvalidTransition {
                entity: "Invoice".to_string(),
                id: current.invoice_number,
                status: current.status.to_string(),
                action: "accept a return".to_string(),
            }
            .into());
        }

        let line = fetch_line_of(&mut tx, &request.invoice_id, &request.line_id).await?;
        let batch_id = line.batch_id.clone().ok_or_else(|| ValidationError::InvalidFormat {
            field: "line_id".to_string(),
            reason: "line was sold without a batch".to_string(),
        })?;

        let product_name = product::name_of(&mut tx, &line.product_id).await?;
        if request.quantity > line.returnable() {
            return Err(CoreError::ReturnExceedsSale {
                product: product_name,
                returnable: line.returnable(),
                requested: request.quantity,
            }
            .into());
        }

        let adjustment = record_adjustment(
            &self.engine,
            &mut tx,
            &NewAdjustment {
                batch_id,
                product_id: line.product_id.clone(),
                adjustment_type: AdjustmentType::Return,
                quantity: request.quantity,
                reason: request.reason.clone(),
                invoice_id: Some(current.id.clone()),
                return_action: Some(request.action),
            },
        )
        .await?;

        if !invoice::add_returned(&mut tx, &line.id, request.quantity).await? {
            let latest = fetch_line_of(&mut tx, &request.invoice_id, &request.line_id).await?;
            return Err(CoreError::ReturnExceedsSale {
                product: product_name,
                returnable: latest.returnable(),
                requested: request.quantity,
            }
            .into());
        }

        audit::record(
            &mut tx,
            AuditAction::Update,
            "INVOICE",
            &current.id,
            &current.invoice_number,
            json!({
                "line_id": line.id,
                "returned": request.quantity,
                "action": request.action,
            }),
        )
        .await?;

        let line = fetch_line_of(&mut tx, &request.invoice_id, &request.line_id).await?;
        tx.commit().await?;

        info!(
            invoice_number = %current.invoice_number,
            line_id = %line.id,
            quantity = request.quantity,
            action = ?request.action,
            "Return recorded"
        );
        Ok(ReturnOutcome { adjustment, line })
    }

    async fn restore_outstanding(&self, conn: &mut SqliteConnection, current: &Invoice) -> DbResult<()> {
        let lines = invoice::fetch_lines(conn, &current.id).await?;
        let stock_lines: Vec<(&str, LineQuantity)> = lines
            .iter()
            .filter_map(|l| l.batch_id.as_deref().map(|b| (b, l.outstanding())))
            .collect();

        restore_lines(&self.engine, conn, &stock_lines, &current.invoice_number).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn fetch_required(conn: &mut SqliteConnection, id: &str) -> DbResult<Invoice> {
    invoice::fetch(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", id))
}

/// Loads an invoice that is not in the trash.
async fn fetch_active(conn: &mut SqliteConnection, id: &str) -> DbResult<Invoice> {
    let found = fetch_required(conn, id).await?;
    if found.is_deleted {
        return Err(DbError::not_found("Invoice", id));
    }
    Ok(found)
}

async fn fetch_line_of(conn: &mut SqliteConnection, invoice_id: &str, line_id: &str) -> DbResult<InvoiceLine> {
    invoice::fetch_line(conn, line_id)
        .await?
        .filter(|line| line.invoice_id == invoice_id)
        .ok_or_else(|| DbError::not_found("Invoice line", line_id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::workflow::testing::{seed_batch, seed_product};
    use pharmadist_core::{AdvisoryKind, MovementType};

    fn line(product_id: &str, batch_id: &str, paid: i64, free: i64) -> NewInvoiceLine {
        NewInvoiceLine {
            product_id: product_id.to_string(),
            batch_id: Some(batch_id.to_string()),
            paid_quantity: paid,
            free_quantity: free,
            ..Default::default()
        }
    }

    fn invoice_with(lines: Vec<NewInvoiceLine>) -> NewInvoice {
        NewInvoice {
            customer_id: "CUST-001".to_string(),
            lines,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_computes_totals() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 1250).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 100).await;

        let mut discounted = line(&product.id, &batch.id, 4, 1);
        discounted.discount_type = DiscountType::Percent;
        discounted.discount_value = 1000;
        let mut input = invoice_with(vec![discounted, line(&product.id, &batch.id, 2, 0)]);
        input.discount_cents = 500;

        let created = db.invoice_workflow().create(&input).await.unwrap();

        // 4 × 12.50 = 50.00 less 10% = 45.00; 2 × 12.50 = 25.00
        assert_eq!(created.lines[0].line_total_cents, 4500);
        assert_eq!(created.lines[1].line_total_cents, 2500);
        assert_eq!(created.invoice.subtotal_cents, 7000);
        assert_eq!(created.invoice.total_cents, 6500);
        assert_eq!(created.invoice.due_cents, 6500);
        assert_eq!(created.invoice.status, InvoiceStatus::Draft);
        assert!(created.invoice.invoice_number.starts_with("INV-"));

        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 100);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_invoice() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.invoice_workflow().create(&invoice_with(vec![])).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_confirm_splits_paid_and_free() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 3, 2)]))
            .await
            .unwrap();
        let outcome = workflow.confirm(&created.invoice.id).await.unwrap();

        assert_eq!(outcome.invoice.status, InvoiceStatus::Confirmed);
        assert!(outcome.invoice.confirmed_at.is_some());
        assert_eq!(outcome.advisories.len(), 1);
        assert_eq!(outcome.advisories[0].kind, AdvisoryKind::LowStock);
        assert_eq!(outcome.advisories[0].remaining, 5);

        let entries = db
            .ledger()
            .list_by_reference(&created.invoice.invoice_number)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].movement_type, entries[0].quantity), (MovementType::Sale, -3));
        assert_eq!((entries[1].movement_type, entries[1].quantity), (MovementType::Free, -2));

        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
    }

    #[tokio::test]
    async fn test_confirm_is_atomic_across_lines() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let napa = seed_product(&db, "Napa 500mg", 110).await;
        let seclo = seed_product(&db, "Seclo 20mg", 500).await;
        let plenty = seed_batch(&db, &napa.id, "NP-01", 100).await;
        let short = seed_batch(&db, &seclo.id, "SC-01", 5).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![
                line(&napa.id, &plenty.id, 10, 0),
                line(&seclo.id, &short.id, 7, 0),
            ]))
            .await
            .unwrap();

        let err = workflow.confirm(&created.invoice.id).await.unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&CoreError::InsufficientStock {
                product: "Seclo 20mg".to_string(),
                available: 5,
                required: 7,
            })
        );

        let untouched = db.batches().get_by_id(&plenty.id).await.unwrap().unwrap();
        assert_eq!(untouched.quantity, 100);
        let invoice = db.invoices().get_by_id(&created.invoice.id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert!(db
            .ledger()
            .list_by_reference(&created.invoice.invoice_number)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_confirm_aggregates_lines_on_same_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![
                line(&product.id, &batch.id, 6, 0),
                line(&product.id, &batch.id, 3, 2),
            ]))
            .await
            .unwrap();

        let err = workflow.confirm(&created.invoice.id).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::InsufficientStock { available: 10, required: 11, .. })
        ));
    }

    #[tokio::test]
    async fn test_confirm_twice_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 100).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 1, 0)]))
            .await
            .unwrap();
        workflow.confirm(&created.invoice.id).await.unwrap();

        let err = workflow.confirm(&created.invoice.id).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 99);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 3, 2)]))
            .await
            .unwrap();
        workflow.confirm(&created.invoice.id).await.unwrap();
        let cancelled = workflow.cancel(&created.invoice.id).await.unwrap();

        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 10);

        let entries = db
            .ledger()
            .list_by_reference(&created.invoice.invoice_number)
            .await
            .unwrap();
        let returns: Vec<_> = entries
            .iter()
            .filter(|e| e.movement_type == MovementType::Return)
            .collect();
        assert_eq!(returns.len(), 2);
        assert_eq!(returns.iter().map(|e| e.quantity).sum::<i64>(), 5);

        let err = workflow.cancel(&created.invoice.id).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_cancel_draft_moves_no_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 3, 0)]))
            .await
            .unwrap();
        let cancelled = workflow.cancel(&created.invoice.id).await.unwrap();

        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert!(db
            .ledger()
            .list_by_reference(&created.invoice.invoice_number)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_restore_from_trash() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 4, 0)]))
            .await
            .unwrap();
        workflow.confirm(&created.invoice.id).await.unwrap();

        let deleted = workflow.delete(&created.invoice.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.status, InvoiceStatus::Cancelled);
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 10);
        assert_eq!(db.invoices().list_trash().await.unwrap().len(), 1);

        let err = workflow.confirm(&created.invoice.id).await.unwrap_err();
        assert!(err.is_not_found());

        let restored = workflow.restore_from_trash(&created.invoice.id).await.unwrap();
        assert!(!restored.is_deleted);
        assert_eq!(restored.status, InvoiceStatus::Draft);
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 10);

        let err = workflow.restore_from_trash(&created.invoice.id).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_return_then_cancel_restores_only_outstanding() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 100).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 10, 2)]))
            .await
            .unwrap();
        workflow.confirm(&created.invoice.id).await.unwrap();
        let line_id = created.lines[0].id.clone();

        let restocked = workflow
            .record_return(&ReturnRequest {
                invoice_id: created.invoice.id.clone(),
                line_id: line_id.clone(),
                quantity: 4,
                action: ReturnAction::Restock,
                reason: "Near expiry".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(restocked.adjustment.new_quantity, 92);
        assert_eq!(restocked.line.returned_quantity, 4);

        let scrapped = workflow
            .record_return(&ReturnRequest {
                invoice_id: created.invoice.id.clone(),
                line_id: line_id.clone(),
                quantity: 3,
                action: ReturnAction::Scrap,
                reason: "Broken strips".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(scrapped.adjustment.new_quantity, 92);
        assert_eq!(scrapped.line.returnable(), 5);

        let err = workflow
            .record_return(&ReturnRequest {
                invoice_id: created.invoice.id.clone(),
                line_id,
                quantity: 6,
                action: ReturnAction::Restock,
                reason: "Too many".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::ReturnExceedsSale { returnable: 5, requested: 6, .. })
        ));

        workflow.cancel(&created.invoice.id).await.unwrap();
        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 97);
        assert_eq!(db.ledger().balance_for_batch(&batch.id).await.unwrap(), 97);
        assert_eq!(
            db.adjustments()
                .list_for_invoice(&created.invoice.id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_reconfirm_after_trash_reverses_exactly() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 100).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 10, 0)]))
            .await
            .unwrap();
        let invoice_id = created.invoice.id.clone();
        workflow.confirm(&invoice_id).await.unwrap();
        workflow
            .record_return(&ReturnRequest {
                invoice_id: invoice_id.clone(),
                line_id: created.lines[0].id.clone(),
                quantity: 4,
                action: ReturnAction::Restock,
                reason: "Customer overstock".to_string(),
            })
            .await
            .unwrap();

        workflow.delete(&invoice_id).await.unwrap();
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 100);

        workflow.restore_from_trash(&invoice_id).await.unwrap();
        let lines = db.invoices().get_lines(&invoice_id).await.unwrap();
        assert_eq!(lines[0].returned_quantity, 0);
        assert_eq!(lines[0].returnable(), 10);

        workflow.confirm(&invoice_id).await.unwrap();
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 90);

        workflow.cancel(&invoice_id).await.unwrap();
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 100);
        assert_eq!(db.ledger().balance_for_batch(&batch.id).await.unwrap(), 100);
        assert!(db.reconciler().reconcile_batch(&batch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restock_return_reaches_trashed_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 100).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&invoice_with(vec![line(&product.id, &batch.id, 10, 0)]))
            .await
            .unwrap();
        workflow.confirm(&created.invoice.id).await.unwrap();
        db.batches().soft_delete(&batch.id).await.unwrap();

        let returned = workflow
            .record_return(&ReturnRequest {
                invoice_id: created.invoice.id.clone(),
                line_id: created.lines[0].id.clone(),
                quantity: 4,
                action: ReturnAction::Restock,
                reason: "Customer overstock".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(returned.adjustment.new_quantity, 94);
        assert!(db.reconciler().reconcile_batch(&batch.id).await.unwrap().is_none());

        // Manual adjustments still refuse a trashed batch
        let err = db
            .adjustment_workflow()
            .create_adjustment(&NewAdjustment {
                batch_id: batch.id.clone(),
                product_id: product.id.clone(),
                adjustment_type: AdjustmentType::Found,
                quantity: 1,
                reason: "Recount".to_string(),
                invoice_id: None,
                return_action: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_return_requires_confirmed_invoice() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 10).await;

        let created = db
            .invoice_workflow()
            .create(&invoice_with(vec![line(&product.id, &batch.id, 2, 0)]))
            .await
            .unwrap();
        let err = db
            .invoice_workflow()
            .record_return(&ReturnRequest {
                invoice_id: created.invoice.id.clone(),
                line_id: created.lines[0].id.clone(),
                quantity: 1,
                action: ReturnAction::Restock,
                reason: "Wrong item".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
    }
}
