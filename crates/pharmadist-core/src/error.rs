//! # Error Types
//!
//! Domain-specific error types for pharmadist-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pharmadist-core errors (this file)                                    │
//! │  ├── CoreError        - Ledger / workflow rule violations              │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  pharmadist-db errors (separate crate)                                 │
//! │  └── DbError          - Persistence failures, wraps CoreError          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → UI (message verbatim)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant aborts the whole transition that raised it. Low-stock and
//! out-of-stock *advisories* are not errors; see [`crate::types::StockAdvisory`].

use chrono::NaiveDate;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger and workflow rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The batch has nothing on hand.
    ///
    /// Raised before any mutation, regardless of the requested amount.
    #[error("{product} is out of stock")]
    OutOfStock { product: String },

    /// Requested quantity exceeds what the batch holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Confirm invoice (line: paid 7, free 0)
    ///      │
    ///      ▼
    /// Check batch: quantity=5
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Napa 500mg", available: 5, required: 7 }
    ///      │
    ///      ▼
    /// UI shows: "Insufficient stock for Napa 500mg: available 5, required 7"
    /// ```
    #[error("Insufficient stock for {product}: available {available}, required {required}")]
    InsufficientStock {
        product: String,
        available: i64,
        required: i64,
    },

    /// An adjustment would drive the batch below zero.
    #[error("Invalid adjustment for {product}: {available} on hand, change of {change} would go negative")]
    InvalidAdjustment {
        product: String,
        available: i64,
        change: i64,
    },

    /// Stock-out attempted against a lot past its expiry date.
    #[error("Lot {lot_number} expired on {expired_on}")]
    ExpiredLot {
        lot_number: String,
        expired_on: NaiveDate,
    },

    /// Referenced batch, invoice, sample, line or lot does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The entity's current status does not accept the requested event.
    #[error("{entity} {id} is {status}, cannot {action}")]
    InvalidTransition {
        entity: String,
        id: String,
        status: String,
        action: String,
    },

    /// A return asks for more than was sold and not yet returned.
    #[error("Cannot return {requested} of {product}: only {returnable} returnable")]
    ReturnExceedsSale {
        product: String,
        returnable: i64,
        requested: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true for the stock-availability failures that block a
    /// deduction (`OutOfStock`, `InsufficientStock`).
    pub fn is_stock_shortage(&self) -> bool {
        matches!(
            self,
            CoreError::OutOfStock { .. } | CoreError::InsufficientStock { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised by [`crate::validation`] before any business rule runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or positive.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
