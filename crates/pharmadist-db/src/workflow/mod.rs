//! # Workflow Module
//!
//! Multi-step operations that move stock. Each public workflow call is one
//! SQLite transaction: validate, mutate through the [`StockEngine`], update
//! the document, write the audit record, commit.
//!
//! ## Confirmation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    │                                                                    │
//! │    ├─ 1. load document + lines                    NotFound              │
//! │    ├─ 2. transition table lookup                  InvalidTransition     │
//! │    ├─ 3. validation pass (aggregated per batch)   OutOfStock / Insuff.  │
//! │    ├─ 4. mutation pass: engine.deduct per line    (guarded updates)     │
//! │    ├─ 5. status update + audit                                          │
//! │  COMMIT ──► document + advisories                                       │
//! │                                                                         │
//! │  any Err before COMMIT: transaction dropped, nothing applied            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod adjustment;
pub mod invoice;
pub mod payment;
pub mod raw_material;
pub mod reconcile;
pub mod sample;
pub mod stock;

pub use adjustment::{AdjustmentOutcome, AdjustmentWorkflow, NewAdjustment};
pub use invoice::{InvoiceDetails, InvoiceOutcome, InvoiceWorkflow, NewInvoice, NewInvoiceLine, ReturnOutcome, ReturnRequest};
pub use payment::{NewPayment, PaymentOutcome, PaymentWorkflow};
pub use raw_material::{LotIssue, RawMaterialWorkflow, ReceiveLot};
pub use reconcile::Reconciler;
pub use sample::{NewSample, NewSampleLine, SampleOutcome, SampleWorkflow};
pub use stock::{AdjustmentMutation, ReceiveStock, StockEngine, StockMutation, StockReceipt, StockService};

use sqlx::SqliteConnection;

use crate::error::DbResult;
use crate::repository::{batch, product};
use pharmadist_core::stock::{aggregate_demand, check_deduction};
use pharmadist_core::{LineQuantity, StockAdvisory};

/// Keeps one advisory per batch, the most recent winning.
pub(crate) fn merge_advisory(advisories: &mut Vec<StockAdvisory>, advisory: StockAdvisory) {
    advisories.retain(|existing| existing.batch_id != advisory.batch_id);
    advisories.push(advisory);
}

/// Deducts every `(batch_id, quantity)` line of a document.
///
/// All batches are checked against their aggregated demand before the first
/// deduction, so a document whose third line is short leaves the first two
/// batches untouched.
pub(crate) async fn deduct_lines(
    engine: &StockEngine,
    conn: &mut SqliteConnection,
    lines: &[(&str, LineQuantity)],
    reference: &str,
) -> DbResult<Vec<StockAdvisory>> {
    for (batch_id, demand) in aggregate_demand(lines.iter().copied()) {
        let batch = batch::fetch_live(conn, batch_id).await?;
        let product_name = product::name_of(conn, &batch.product_id).await?;
        check_deduction(&product_name, batch.quantity, demand.total())?;
    }

    let mut advisories = Vec::new();
    for (batch_id, qty) in lines {
        let mutation = engine.deduct(conn, batch_id, *qty, reference).await?;
        if let Some(advisory) = mutation.advisory {
            merge_advisory(&mut advisories, advisory);
        }
    }

    Ok(advisories)
}

/// Reverses [`deduct_lines`]. Lines with nothing outstanding are skipped.
pub(crate) async fn restore_lines(
    engine: &StockEngine,
    conn: &mut SqliteConnection,
    lines: &[(&str, LineQuantity)],
    reference: &str,
) -> DbResult<()> {
    for (batch_id, qty) in lines {
        if qty.total() == 0 {
            continue;
        }
        engine.restore(conn, batch_id, *qty, reference).await?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the workflow tests.

    use chrono::NaiveDate;

    use super::ReceiveStock;
    use crate::pool::Database;
    use crate::repository::NewProduct;
    use pharmadist_core::{Batch, MovementType, Product};

    pub async fn seed_product(db: &Database, name: &str, tp_rate_cents: i64) -> Product {
        db.products()
            .create(&NewProduct {
                name: name.to_string(),
                category: Some("Tablet".to_string()),
                unit: "strip".to_string(),
                cost_price_cents: tp_rate_cents * 8 / 10,
                tp_rate_cents,
                sales_price_cents: tp_rate_cents * 12 / 10,
            })
            .await
            .unwrap()
    }

    /// Creates a batch holding `quantity` through an OPENING receipt.
    pub async fn seed_batch(db: &Database, product_id: &str, batch_number: &str, quantity: i64) -> Batch {
        db.stock()
            .receive(&ReceiveStock {
                product_id: product_id.to_string(),
                batch_number: batch_number.to_string(),
                quantity,
                unit_cost_cents: 90,
                expiry_date: NaiveDate::from_ymd_opt(2028, 6, 30),
                kind: MovementType::Opening,
                reference: "OPENING".to_string(),
            })
            .await
            .unwrap()
            .batch
    }
}
