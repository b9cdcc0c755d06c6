//! # Invoice Repository
//!
//! Persistence for invoices and their lines. Status changes are decided by
//! [`pharmadist_core::invoice`] and applied by the invoice workflow; this
//! module only reads and writes rows.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use pharmadist_core::{Invoice, InvoiceLine, InvoiceStatus};

const SELECT_INVOICE: &str = r#"
    SELECT id, invoice_number, customer_id, store_id, seller_id, status,
           subtotal_cents, discount_cents, total_cents, paid_cents, due_cents,
           notes, is_deleted, created_at, updated_at, confirmed_at
    FROM invoices
"#;

const SELECT_LINE: &str = r#"
    SELECT id, invoice_id, product_id, batch_id, paid_quantity, free_quantity,
           unit_price_cents, tp_rate_cents, cost_price_cents,
           discount_type, discount_value, line_total_cents, returned_quantity, created_at
    FROM invoice_lines
"#;

/// Repository for invoice reads.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Gets an invoice by ID, including trashed ones.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lines of an invoice in entry order.
    pub async fn get_lines(&self, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lines(&mut conn, invoice_id).await
    }

    /// Non-deleted invoices, newest first.
    pub async fn list(&self, limit: i64) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "{SELECT_INVOICE} WHERE is_deleted = 0 ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    /// Trashed invoices, newest first.
    pub async fn list_trash(&self) -> DbResult<Vec<Invoice>> {
        let sql = format!("{SELECT_INVOICE} WHERE is_deleted = 1 ORDER BY updated_at DESC, rowid DESC");
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    /// Invoices of one customer that still have something due.
    pub async fn list_outstanding(&self, customer_id: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "{SELECT_INVOICE} WHERE customer_id = ?1 AND is_deleted = 0 \
             AND status IN ('CONFIRMED', 'PARTIAL') ORDER BY created_at, rowid"
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Invoice>> {
    let sql = format!("{SELECT_INVOICE} WHERE id = ?1");
    let invoice = sqlx::query_as::<_, Invoice>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(invoice)
}

pub(crate) async fn fetch_lines(
    conn: &mut SqliteConnection,
    invoice_id: &str,
) -> DbResult<Vec<InvoiceLine>> {
    let sql = format!("{SELECT_LINE} WHERE invoice_id = ?1 ORDER BY created_at, rowid");
    let lines = sqlx::query_as::<_, InvoiceLine>(&sql)
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(lines)
}

pub(crate) async fn fetch_line(
    conn: &mut SqliteConnection,
    line_id: &str,
) -> DbResult<Option<InvoiceLine>> {
    let sql = format!("{SELECT_LINE} WHERE id = ?1");
    let line = sqlx::query_as::<_, InvoiceLine>(&sql)
        .bind(line_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(line)
}

pub(crate) async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
    debug!(id = %invoice.id, invoice_number = %invoice.invoice_number, "Inserting invoice");

    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, invoice_number, customer_id, store_id, seller_id, status,
            subtotal_cents, discount_cents, total_cents, paid_cents, due_cents,
            notes, is_deleted, created_at, updated_at, confirmed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&invoice.id)
    .bind(&invoice.invoice_number)
    .bind(&invoice.customer_id)
    .bind(&invoice.store_id)
    .bind(&invoice.seller_id)
    .bind(invoice.status)
    .bind(invoice.subtotal_cents)
    .bind(invoice.discount_cents)
    .bind(invoice.total_cents)
    .bind(invoice.paid_cents)
    .bind(invoice.due_cents)
    .bind(&invoice.notes)
    .bind(invoice.is_deleted)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .bind(invoice.confirmed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn insert_line(conn: &mut SqliteConnection, line: &InvoiceLine) -> DbResult<()> {
    debug!(invoice_id = %line.invoice_id, product_id = %line.product_id, "Inserting invoice line");

    sqlx::query(
        r#"
        INSERT INTO invoice_lines (
            id, invoice_id, product_id, batch_id, paid_quantity, free_quantity,
            unit_price_cents, tp_rate_cents, cost_price_cents,
            discount_type, discount_value, line_total_cents, returned_quantity, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&line.id)
    .bind(&line.invoice_id)
    .bind(&line.product_id)
    .bind(&line.batch_id)
    .bind(line.paid_quantity)
    .bind(line.free_quantity)
    .bind(line.unit_price_cents)
    .bind(line.tp_rate_cents)
    .bind(line.cost_price_cents)
    .bind(line.discount_type)
    .bind(line.discount_value)
    .bind(line.line_total_cents)
    .bind(line.returned_quantity)
    .bind(line.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Sets status (and `confirmed_at` when given).
pub(crate) async fn update_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: InvoiceStatus,
    confirmed_at: Option<DateTime<Utc>>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices SET
            status = ?2,
            confirmed_at = COALESCE(?3, confirmed_at),
            updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(confirmed_at)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Moves an invoice into or out of the trash, setting its status.
pub(crate) async fn set_deleted(
    conn: &mut SqliteConnection,
    id: &str,
    deleted: bool,
    status: InvoiceStatus,
) -> DbResult<()> {
    sqlx::query("UPDATE invoices SET is_deleted = ?2, status = ?3, updated_at = ?4 WHERE id = ?1")
        .bind(id)
        .bind(deleted)
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub(crate) async fn update_balances(
    conn: &mut SqliteConnection,
    id: &str,
    paid_cents: i64,
    due_cents: i64,
    status: InvoiceStatus,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices SET
            paid_cents = ?2,
            due_cents = ?3,
            status = ?4,
            updated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(paid_cents)
    .bind(due_cents)
    .bind(status)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Adds to a line's returned quantity unless that would exceed what was
/// sold. Returns false when the guard rejected the update.
pub(crate) async fn add_returned(
    conn: &mut SqliteConnection,
    line_id: &str,
    quantity: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_lines SET returned_quantity = returned_quantity + ?2
        WHERE id = ?1 AND returned_quantity + ?2 <= paid_quantity + free_quantity
        "#,
    )
    .bind(line_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Zeroes the returned quantity on every line of an invoice. Returns the
/// number of lines that had returns.
pub(crate) async fn clear_returned(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<u64> {
    let result = sqlx::query(
        "UPDATE invoice_lines SET returned_quantity = 0 WHERE invoice_id = ?1 AND returned_quantity > 0",
    )
    .bind(invoice_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
