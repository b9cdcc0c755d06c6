//! # Domain Types
//!
//! Entities and value types shared by the ledger, the workflows and the
//! persistence layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────┐  1..n  ┌───────────────┐  1..n  ┌────────────────┐  │
//! │  │   Product     │◄───────│    Batch      │◄───────│  LedgerEntry   │  │
//! │  │  tp_rate      │        │  batch_number │        │  movement_type │  │
//! │  │  sales_price  │        │  quantity ≥ 0 │        │  quantity ±    │  │
//! │  └───────────────┘        └───────▲───────┘        └────────────────┘  │
//! │                                   │ draws on                            │
//! │  ┌───────────────┐  owns  ┌───────┴───────┐                            │
//! │  │   Invoice     │───────►│  InvoiceLine  │  paid_qty / free_qty       │
//! │  │  status, due  │        └───────────────┘                            │
//! │  └───────┬───────┘                                                      │
//! │          │ 1..n                                                         │
//! │  ┌───────▼───────┐   ┌───────────────┐   ┌─────────────────────────┐  │
//! │  │   Payment     │   │ Sample(+Line) │   │ StockAdjustment         │  │
//! │  └───────────────┘   └───────────────┘   └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Batch::quantity` is a cached projection of the ledger: it must always
//! equal the sum of that batch's ledger entry quantities.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::adjustment::{AdjustmentType, ReturnAction};
use crate::error::{CoreResult, ValidationError};
use crate::invoice::InvoiceStatus;
use crate::money::Money;
use crate::sample::SampleStatus;

// =============================================================================
// Product
// =============================================================================

/// A catalogue product. Prices change independently of stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    /// Unit of measure ("strip", "bottle", "box").
    pub unit: String,
    /// Internal cost price, used for margin reporting only.
    pub cost_price_cents: i64,
    /// Trade price: the rate customers are billed at.
    pub tp_rate_cents: i64,
    /// MRP, printed on the pack. Informational.
    pub sales_price_cents: i64,
    pub is_active: bool,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn tp_rate(&self) -> Money {
        Money::from_cents(self.tp_rate_cents)
    }

    #[inline]
    pub fn cost_price(&self) -> Money {
        Money::from_cents(self.cost_price_cents)
    }
}

// =============================================================================
// Batch
// =============================================================================

/// A received lot of one product sharing cost and expiry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Batch {
    pub id: String,
    pub product_id: String,
    pub batch_number: String,
    /// Units on hand. Never negative.
    pub quantity: i64,
    pub unit_cost_cents: i64,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// True when the batch carries an expiry date strictly before `as_of`.
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < as_of)
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Ledger movement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// First stock recorded for a batch.
    Opening,
    /// Stock received from a supplier.
    Purchase,
    /// Paid quantity leaving on an invoice.
    Sale,
    /// Stock coming back (reversal or customer return).
    Return,
    /// Found / lost / correction adjustments.
    Adjustment,
    Damage,
    Expired,
    /// Free quantity leaving on an invoice or sample.
    Free,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::Opening => "OPENING",
            MovementType::Purchase => "PURCHASE",
            MovementType::Sale => "SALE",
            MovementType::Return => "RETURN",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Damage => "DAMAGE",
            MovementType::Expired => "EXPIRED",
            MovementType::Free => "FREE",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable, signed stock movement.
///
/// Negative quantity = stock leaving, positive = stock entering.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    pub product_id: String,
    pub batch_id: Option<String>,
    pub movement_type: MovementType,
    pub quantity: i64,
    /// Invoice number, sample number or adjustment id.
    pub reference: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A ledger entry planned by the core, not yet assigned an id or timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDraft {
    pub product_id: String,
    pub batch_id: Option<String>,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference: String,
    pub notes: Option<String>,
}

// =============================================================================
// Line Quantity
// =============================================================================

/// The paid/free split of one line.
///
/// Paid units drive revenue and SALE entries; free units drive FREE entries
/// and leave stock without earning anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineQuantity {
    pub paid: i64,
    pub free: i64,
}

impl LineQuantity {
    pub const fn new(paid: i64, free: i64) -> Self {
        LineQuantity { paid, free }
    }

    /// Only free units (samples).
    pub const fn free_only(free: i64) -> Self {
        LineQuantity { paid: 0, free }
    }

    /// Units that physically leave the batch.
    #[inline]
    pub const fn total(&self) -> i64 {
        self.paid + self.free
    }

    /// Rejects negative parts and an all-zero split.
    pub fn validate(&self) -> CoreResult<()> {
        if self.paid < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "paid quantity".to_string(),
            }
            .into());
        }
        if self.free < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "free quantity".to_string(),
            }
            .into());
        }
        if self.total() == 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl std::ops::Add for LineQuantity {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        LineQuantity {
            paid: self.paid + other.paid,
            free: self.free + other.free,
        }
    }
}

// =============================================================================
// Advisories
// =============================================================================

/// Kind of post-mutation stock advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisoryKind {
    /// Remaining quantity is positive but at or below the threshold.
    LowStock,
    /// Remaining quantity reached zero.
    OutOfStock,
}

/// Non-blocking warning raised after a deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdvisory {
    pub kind: AdvisoryKind,
    pub product_id: String,
    pub product_name: String,
    pub batch_id: String,
    pub batch_number: String,
    pub remaining: i64,
}

// =============================================================================
// Invoice
// =============================================================================

/// A sales invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub customer_id: String,
    pub store_id: Option<String>,
    pub seller_id: Option<String>,
    pub status: InvoiceStatus,
    pub subtotal_cents: i64,
    /// Invoice-level discount on top of line discounts.
    pub discount_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    /// `total - paid`, floored at zero.
    pub due_cents: i64,
    pub notes: Option<String>,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Invoice {
    #[inline]
    pub fn due(&self) -> Money {
        Money::from_cents(self.due_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }
}

/// How a line discount is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `discount_value` is minor units off the line.
    #[default]
    Amount,
    /// `discount_value` is basis points of the gross line amount.
    Percent,
}

/// A line on an invoice. Product prices are snapshotted at sale time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_id: String,
    pub product_id: String,
    /// Lines without a batch do not move stock.
    pub batch_id: Option<String>,
    pub paid_quantity: i64,
    pub free_quantity: i64,
    /// MRP at sale time (informational).
    pub unit_price_cents: i64,
    /// Billing rate at sale time.
    pub tp_rate_cents: i64,
    /// Cost at sale time, for margin reporting.
    pub cost_price_cents: i64,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    /// `paid_quantity × tp_rate − discount`.
    pub line_total_cents: i64,
    pub returned_quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InvoiceLine {
    #[inline]
    pub fn quantity(&self) -> LineQuantity {
        LineQuantity::new(self.paid_quantity, self.free_quantity)
    }

    /// Units sold (paid + free) that have not come back yet.
    #[inline]
    pub fn returnable(&self) -> i64 {
        self.quantity().total() - self.returned_quantity
    }

    /// Units still out with the customer. Returned units are taken off the
    /// paid part first, then the free part.
    pub fn outstanding(&self) -> LineQuantity {
        let returned_paid = self.returned_quantity.min(self.paid_quantity);
        let returned_free = (self.returned_quantity - returned_paid).min(self.free_quantity);
        LineQuantity::new(
            self.paid_quantity - returned_paid,
            self.free_quantity - returned_free,
        )
    }
}

// =============================================================================
// Sample
// =============================================================================

/// A free-of-charge sample issue (e.g., to a physician).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sample {
    pub id: String,
    pub sample_number: String,
    pub recipient: String,
    pub status: SampleStatus,
    /// When false, no status change ever moves stock.
    pub affects_inventory: bool,
    pub notes: Option<String>,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SampleLine {
    pub id: String,
    pub sample_id: String,
    pub product_id: String,
    pub batch_id: Option<String>,
    pub quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Adjustment
// =============================================================================

/// A recorded stock adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustment {
    pub id: String,
    pub batch_id: String,
    pub product_id: String,
    pub adjustment_type: AdjustmentType,
    /// Quantity as entered (positive).
    pub quantity: i64,
    /// Signed change actually applied to the batch.
    pub quantity_change: i64,
    pub reason: String,
    /// Invoice a return-driven adjustment refers to.
    pub invoice_id: Option<String>,
    pub return_action: Option<ReturnAction>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Cheque,
    MobileBanking,
}

/// A payment against an invoice. Never touches the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub invoice_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    /// Cheque number, transaction id, etc.
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit Trail
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

/// One audit log row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditRecord {
    pub id: String,
    pub action: AuditAction,
    /// "INVOICE", "BATCH", "SAMPLE", ...
    pub entity_type: String,
    pub entity_id: String,
    pub entity_name: String,
    /// JSON object describing the change.
    pub changes: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Raw Materials
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RawMaterial {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A received lot of a raw material.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RawMaterialLot {
    pub id: String,
    pub raw_material_id: String,
    pub lot_number: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RawMaterialMovement {
    pub id: String,
    pub lot_id: String,
    pub direction: MovementDirection,
    /// Signed: negative for OUT.
    pub quantity: i64,
    pub reference: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
