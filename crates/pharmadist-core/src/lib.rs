//! # pharmadist-core: Pure Inventory Ledger Logic
//!
//! The rules of the distribution backend as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     PharmaDist Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            UI layer (TypeScript, via ts-rs bindings)            │   │
//! │  │   Invoices ──► Confirm ──► Payments      Samples    Adjustments │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          pharmadist-db (transactions, repositories)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ asks for plans                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ pharmadist-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  money  │ │  stock  │ │ invoice │ │ sample  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────────┐          │   │
//! │  │   │  error  │ │ payment │ │adjustment│ │ validation │          │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └────────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Product, Batch, LedgerEntry, Invoice, ...)
//! - [`money`] - Integer minor-unit money
//! - [`error`] - Domain error types
//! - [`stock`] - Availability checks and ledger entry plans
//! - [`adjustment`] - Adjustment types and their sign table
//! - [`invoice`] - Invoice status machine and pricing
//! - [`sample`] - Sample status machine
//! - [`payment`] - Payment settlement
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use pharmadist_core::stock::{check_deduction, deduction_entries};
//! use pharmadist_core::types::{LineQuantity, MovementType};
//!
//! let qty = LineQuantity::new(3, 2);
//! check_deduction("Napa 500mg", 10, qty.total()).unwrap();
//!
//! let entries = deduction_entries("product-id", "batch-id", qty, "INV-0001");
//! assert_eq!(entries[0].movement_type, MovementType::Sale);
//! assert_eq!(entries[1].movement_type, MovementType::Free);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adjustment;
pub mod error;
pub mod invoice;
pub mod money;
pub mod payment;
pub mod sample;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use adjustment::{AdjustmentType, ReturnAction};
pub use error::{CoreError, CoreResult, ValidationError};
pub use invoice::{InvoiceEvent, InvoiceStatus};
pub use money::Money;
pub use sample::{SampleEvent, SampleStatus};
pub use stock::{BalanceMismatch, StockEffect};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Remaining quantity at or below which a deduction raises a LowStock
/// advisory. Overridable per database through `DbConfig`.
pub const LOW_STOCK_THRESHOLD: i64 = 50;

/// Maximum lines on one invoice or sample.
pub const MAX_INVOICE_LINES: usize = 200;

/// Maximum units on a single line, receipt or adjustment.
///
/// Catches keying slips (100000 instead of 1000).
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;
