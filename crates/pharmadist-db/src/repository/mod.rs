//! # Repository Module
//!
//! Row-level database access for the distribution backend.
//!
//! ## Two Entry Points
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reads & catalogue edits             Transactional helpers              │
//! │  ───────────────────────             ─────────────────────              │
//! │  db.batches().get_by_id(id)          batch::apply_change(&mut *tx, ..)  │
//! │  db.ledger().list_for_batch(id)      ledger::append(&mut *tx, draft)    │
//! │  db.invoices().get_lines(id)         audit::record(&mut *tx, ..)        │
//! │       │                                   │                             │
//! │       │ own pooled connection             │ caller's transaction        │
//! │       ▼                                   ▼                             │
//! │  SQLite Database                     committed by the workflow          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The helpers take `&mut SqliteConnection` so that every step of a workflow
//! runs on the same transaction. Nothing in this module opens a transaction
//! on behalf of a workflow.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - Catalogue CRUD
//! - [`BatchRepository`] - Stock store reads, soft delete
//! - [`LedgerRepository`] - Append-only ledger reads
//! - [`InvoiceRepository`] / [`SampleRepository`] - Document reads
//! - [`AdjustmentRepository`] / [`PaymentRepository`] - History reads
//! - [`AuditRepository`] - Audit trail
//! - [`RawMaterialRepository`] - Raw materials and lots

pub mod adjustment;
pub mod audit;
pub mod batch;
pub mod invoice;
pub mod ledger;
pub mod payment;
pub mod product;
pub mod raw_material;
pub mod sample;

pub use adjustment::AdjustmentRepository;
pub use audit::AuditRepository;
pub use batch::BatchRepository;
pub use invoice::InvoiceRepository;
pub use ledger::LedgerRepository;
pub use payment::PaymentRepository;
pub use product::{NewProduct, ProductRepository};
pub use raw_material::RawMaterialRepository;
pub use sample::SampleRepository;

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::DbResult;

/// Tables that carry a generated document number.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DocumentSeries {
    Invoice,
    Sample,
}

impl DocumentSeries {
    const fn prefix(&self) -> &'static str {
        match self {
            DocumentSeries::Invoice => "INV",
            DocumentSeries::Sample => "SMP",
        }
    }

    const fn count_sql(&self) -> &'static str {
        match self {
            DocumentSeries::Invoice => "SELECT COUNT(*) FROM invoices WHERE invoice_number LIKE ?1",
            DocumentSeries::Sample => "SELECT COUNT(*) FROM samples WHERE sample_number LIKE ?1",
        }
    }
}

/// Next number in the `PREFIX-YYYYMMDD-NNNN` series for today.
///
/// ## Example
/// `INV-20260131-0001`
pub(crate) async fn next_document_number(
    conn: &mut SqliteConnection,
    series: DocumentSeries,
) -> DbResult<String> {
    let stem = format!("{}-{}-", series.prefix(), Utc::now().format("%Y%m%d"));
    let count: i64 = sqlx::query_scalar(series.count_sql())
        .bind(format!("{stem}%"))
        .fetch_one(&mut *conn)
        .await?;

    Ok(format!("{}{:04}", stem, count + 1))
}
