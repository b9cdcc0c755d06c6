//! # Payment Repository

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use pharmadist_core::Payment;

/// Repository for payment reads.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets all payments for an invoice.
    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, invoice_id, amount_cents, method, reference, created_at
            FROM payments
            WHERE invoice_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Gets total amount paid against an invoice.
    pub async fn total_paid(&self, invoice_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE invoice_id = ?1",
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

pub(crate) async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(invoice_id = %payment.invoice_id, amount = payment.amount_cents, "Recording payment");

    sqlx::query(
        r#"
        INSERT INTO payments (id, invoice_id, amount_cents, method, reference, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.invoice_id)
    .bind(payment.amount_cents)
    .bind(payment.method)
    .bind(&payment.reference)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
