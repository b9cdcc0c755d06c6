//! # Validation Module
//!
//! Input validation run before any ledger rule.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE                                                   │
//! │  ├── Required fields, lengths, identifier formats                      │
//! │  └── Quantity and money ranges                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger rules (stock, invoice, sample, payment)               │
//! │  ├── Availability, expiry                                              │
//! │  └── Status transitions                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── UNIQUE (product_id, batch_number), invoice_number                 │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_INVOICE_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a batch or lot number.
///
/// ## Rules
/// - Must not be empty, at most 50 characters
/// - Letters, digits, `-`, `_`, `/` and `.` only
///
/// ## Example
/// ```rust
/// use pharmadist_core::validation::validate_batch_number;
///
/// assert!(validate_batch_number("NP-2401/A").is_ok());
/// assert!(validate_batch_number("").is_err());
/// assert!(validate_batch_number("has space").is_err());
/// ```
pub fn validate_batch_number(batch_number: &str) -> ValidationResult<()> {
    required("batch_number", batch_number, 50)?;

    if !batch_number
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "batch_number".to_string(),
            reason: "must contain only letters, numbers, '-', '_', '/' and '.'".to_string(),
        });
    }

    Ok(())
}

/// Validates a product or raw-material name (1-200 characters).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required("name", name, 200)
}

/// Validates a document number or ledger reference (1-64 characters).
pub fn validate_reference(reference: &str) -> ValidationResult<()> {
    required("reference", reference, 64)
}

/// Validates an adjustment or return reason (1-500 characters).
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    required("reason", reason, 500)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity entered on a line, receipt or adjustment.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price or cost in minor units. Zero is allowed.
///
/// ## Example
/// ```rust
/// use pharmadist_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1250).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount in minor units (must be > 0).
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on an invoice or sample.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if lines > MAX_INVOICE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_INVOICE_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ## Example
/// ```rust
/// use pharmadist_core::validation::validate_uuid;
///
/// assert!(validate_uuid("batch_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("batch_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
