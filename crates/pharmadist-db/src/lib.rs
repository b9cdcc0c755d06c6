//! # pharmadist-db: Persistence and Stock Workflows
//!
//! SQLite storage for the distribution ledger, plus the transactional
//! workflows (invoices, samples, adjustments, payments, raw materials) that
//! keep batch quantities and the stock ledger in step.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Distribution Ledger Data Flow                      │
//! │                                                                         │
//! │  UI command (confirm invoice)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                   pharmadist-db (THIS CRATE)                    │    │
//! │  │                                                                 │    │
//! │  │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐    │    │
//! │  │   │  Workflows   │──►│ StockEngine  │──►│  Repositories    │    │    │
//! │  │   │ invoice,     │   │ deduct       │   │ batch, ledger,   │    │    │
//! │  │   │ sample, ...  │   │ restore      │   │ invoice, audit   │    │    │
//! │  │   └──────────────┘   │ adjust       │   └────────┬─────────┘    │    │
//! │  │          │           └──────────────┘            │              │    │
//! │  │          └── rules from pharmadist-core ─────────┘              │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │   SQLite (WAL): batches, stock_ledger (append-only), invoices…  │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - TOML / environment configuration
//! - [`pool`] - Connection pool and the [`Database`] handle
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Row-level access
//! - [`workflow`] - Transactional stock workflows
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pharmadist_db::{AppConfig, Database};
//!
//! let config = AppConfig::load(None)?;
//! let db = Database::new(config.to_db_config()).await?;
//!
//! let outcome = db.invoice_workflow().confirm(&invoice_id).await?;
//! for advisory in &outcome.advisories {
//!     println!("{:?}: {} left of {}", advisory.kind, advisory.remaining, advisory.product_name);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod workflow;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::AppConfig;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::{
    AdjustmentRepository, AuditRepository, BatchRepository, InvoiceRepository, LedgerRepository,
    NewProduct, PaymentRepository, ProductRepository, RawMaterialRepository, SampleRepository,
};
pub use workflow::{
    AdjustmentWorkflow, InvoiceWorkflow, PaymentWorkflow, RawMaterialWorkflow, Reconciler,
    SampleWorkflow, StockEngine, StockService,
};
