//! # Payment Workflow
//!
//! Settles money against a confirmed invoice. Never touches stock.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{audit, invoice, payment};
use pharmadist_core::payment::settle;
use pharmadist_core::{AuditAction, Invoice, Money, Payment, PaymentMethod};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub invoice_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub invoice: Invoice,
}

#[derive(Debug, Clone)]
pub struct PaymentWorkflow {
    pool: SqlitePool,
}

impl PaymentWorkflow {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentWorkflow { pool }
    }

    /// Applies a payment.
    ///
    /// ## Errors
    /// - `Validation` when the amount is not positive
    /// - `NotFound` for a missing or trashed invoice
    /// - `InvalidTransition` unless the invoice is CONFIRMED or PARTIAL
    pub async fn apply_payment(&self, input: &NewPayment) -> DbResult<PaymentOutcome> {
        let mut tx = self.pool.begin().await?;

        let current = invoice::fetch(&mut tx, &input.invoice_id)
            .await?
            .filter(|found| !found.is_deleted)
            .ok_or_else(|| DbError::not_found("Invoice", &input.invoice_id))?;

        let settlement = settle(
            &current.invoice_number,
            current.status,
            current.paid(),
            current.due(),
            Money::from_cents(input.amount_cents),
        )?;

        let row = Payment {
            id: Uuid::new_v4().to_string(),
            invoice_id: current.id.clone(),
            amount_cents: input.amount_cents,
            method: input.method,
            reference: input.reference.clone(),
            created_at: Utc::now(),
        };
        payment::insert(&mut tx, &row).await?;
        invoice::update_balances(
            &mut tx,
            &current.id,
            settlement.paid.cents(),
            settlement.due.cents(),
            settlement.status,
        )
        .await?;

        audit::record(
            &mut tx,
            AuditAction::Create,
            "PAYMENT",
            &row.id,
            &current.invoice_number,
            json!({
                "amount_cents": row.amount_cents,
                "method": row.method,
                "paid_cents": settlement.paid.cents(),
                "due_cents": settlement.due.cents(),
                "status": { "from": current.status, "to": settlement.status },
            }),
        )
        .await?;

        let updated = invoice::fetch(&mut tx, &current.id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", &current.id))?;
        tx.commit().await?;

        info!(
            invoice_number = %updated.invoice_number,
            amount = row.amount_cents,
            due = updated.due_cents,
            status = %updated.status,
            "Payment applied"
        );
        Ok(PaymentOutcome {
            payment: row,
            invoice: updated,
        })
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
    use crate::workflow::{NewInvoice, NewInvoiceLine};
    use pharmadist_core::{CoreError, InvoiceStatus};

    /// Confirmed invoice with a total of 100.00.
    async fn confirmed_invoice(db: &Database) -> Invoice {
        let product = seed_product(db, "Napa 500mg", 1000).await;
        let batch = seed_batch(db, &product.id, "NP-01", 100).await;
        let workflow = db.invoice_workflow();

        let created = workflow
            .create(&NewInvoice {
                customer_id: "CUST-001".to_string(),
                lines: vec![NewInvoiceLine {
                    product_id: product.id.clone(),
                    batch_id: Some(batch.id.clone()),
                    paid_quantity: 10,
                    ..Default::default()
                }],
                ..Default::default()
            })
            .await
            .unwrap();
        workflow.confirm(&created.invoice.id).await.unwrap().invoice
    }

    fn pay(invoice_id: &str, amount_cents: i64) -> NewPayment {
        NewPayment {
            invoice_id: invoice_id.to_string(),
            amount_cents,
            method: PaymentMethod::Cash,
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_full_payment_marks_paid() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let invoice = confirmed_invoice(&db).await;
        assert_eq!(invoice.due_cents, 10_000);

        let outcome = db.payment_workflow().apply_payment(&pay(&invoice.id, 10_000)).await.unwrap();
        assert_eq!(outcome.invoice.status, InvoiceStatus::Paid);
        assert_eq!(outcome.invoice.due_cents, 0);
        assert_eq!(outcome.invoice.paid_cents, 10_000);
    }

    #[tokio::test]
    async fn test_partial_then_settled() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let invoice = confirmed_invoice(&db).await;
        let workflow = db.payment_workflow();

        let partial = workflow.apply_payment(&pay(&invoice.id, 4_000)).await.unwrap();
        assert_eq!(partial.invoice.status, InvoiceStatus::Partial);
        assert_eq!(partial.invoice.due_cents, 6_000);

        let settled = workflow.apply_payment(&pay(&invoice.id, 8_000)).await.unwrap();
        assert_eq!(settled.invoice.status, InvoiceStatus::Paid);
        assert_eq!(settled.invoice.due_cents, 0);
        assert_eq!(settled.invoice.paid_cents, 12_000);

        assert_eq!(db.payments().total_paid(&invoice.id).await.unwrap(), 12_000);
        assert_eq!(db.payments().list_for_invoice(&invoice.id).await.unwrap().len(), 2);

        let err = workflow.apply_payment(&pay(&invoice.id, 100)).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_payment_rejects_bad_amount_and_draft() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let invoice = confirmed_invoice(&db).await;
        let workflow = db.payment_workflow();

        let err = workflow.apply_payment(&pay(&invoice.id, 0)).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::Validation(_))));

        let product = seed_product(&db, "Seclo 20mg", 500).await;
        let draft = db
            .invoice_workflow()
            .create(&NewInvoice {
                customer_id: "CUST-002".to_string(),
                lines: vec![NewInvoiceLine {
                    product_id: product.id,
                    paid_quantity: 1,
                    ..Default::default()
                }],
                ..Default::default()
            })
            .await
            .unwrap();
        let err = workflow.apply_payment(&pay(&draft.invoice.id, 500)).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));

        let err = workflow.apply_payment(&pay("missing", 500)).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
