//! # Invoice State Machine
//!
//! Invoice statuses, the central transition table and line pricing.
//!
//! ## Transition Table
//! ```text
//! ┌───────────────────────────┬───────────────────┬───────────┬────────────┐
//! │ From                      │ Event             │ To        │ Stock      │
//! ├───────────────────────────┼───────────────────┼───────────┼────────────┤
//! │ DRAFT                     │ Confirm           │ CONFIRMED │ deduct     │
//! │ CONFIRMED, PARTIAL        │ Payment(settled)  │ PAID      │ -          │
//! │ CONFIRMED, PARTIAL        │ Payment(open)     │ PARTIAL   │ -          │
//! │ CONFIRMED, PARTIAL, PAID  │ Cancel            │ CANCELLED │ restore    │
//! │ DRAFT                     │ Cancel            │ CANCELLED │ -          │
//! │ CONFIRMED, PARTIAL, PAID  │ Delete            │ CANCELLED │ restore    │
//! │ DRAFT, CANCELLED          │ Delete            │ (same)    │ -          │
//! │ DRAFT, CANCELLED          │ RestoreFromTrash  │ DRAFT     │ -          │
//! └───────────────────────────┴───────────────────┴───────────┴────────────┘
//! ```
//! Every other pair is rejected with `InvalidTransition`.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, BPS_PER_WHOLE};
use crate::stock::StockEffect;
use crate::types::DiscountType;

// =============================================================================
// Status & Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Confirmed,
    Paid,
    Partial,
    Cancelled,
}

impl InvoiceStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Confirmed => "CONFIRMED",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    /// True when the invoice's lines are currently deducted from stock.
    pub const fn holds_stock(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Confirmed | InvoiceStatus::Partial | InvoiceStatus::Paid
        )
    }

    /// Looks up the transition table.
    pub fn transition(&self, event: InvoiceEvent) -> Option<Transition<InvoiceStatus>> {
        use InvoiceEvent as E;
        use InvoiceStatus as S;

        let (next, effect) = match (*self, event) {
            (S::Draft, E::Confirm) => (S::Confirmed, StockEffect::Deduct),
            (S::Confirmed | S::Partial, E::Payment { settled: true }) => (S::Paid, StockEffect::None),
            (S::Confirmed | S::Partial, E::Payment { settled: false }) => {
                (S::Partial, StockEffect::None)
            }
            (S::Confirmed | S::Partial | S::Paid, E::Cancel | E::Delete) => {
                (S::Cancelled, StockEffect::Restore)
            }
            (S::Draft, E::Cancel) => (S::Cancelled, StockEffect::None),
            (S::Draft | S::Cancelled, E::Delete) => (*self, StockEffect::None),
            (S::Draft | S::Cancelled, E::RestoreFromTrash) => (S::Draft, StockEffect::None),
            _ => return None,
        };
        Some(Transition { next, effect })
    }

    /// Like [`Self::transition`], failing with `InvalidTransition` for
    /// pairs the table does not list.
    pub fn apply(&self, invoice_number: &str, event: InvoiceEvent) -> CoreResult<Transition<InvoiceStatus>> {
        self.transition(event).ok_or_else(|| CoreError::InvalidTransition {
            entity: "Invoice".to_string(),
            id: invoice_number.to_string(),
            status: self.to_string(),
            action: event.action().to_string(),
        })
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceEvent {
    Confirm,
    /// A payment was applied; `settled` when nothing remains due.
    Payment { settled: bool },
    Cancel,
    Delete,
    RestoreFromTrash,
}

impl InvoiceEvent {
    pub const fn action(&self) -> &'static str {
        match self {
            InvoiceEvent::Confirm => "confirm",
            InvoiceEvent::Payment { .. } => "accept payment",
            InvoiceEvent::Cancel => "cancel",
            InvoiceEvent::Delete => "delete",
            InvoiceEvent::RestoreFromTrash => "restore",
        }
    }
}

/// Result of a table lookup: where the entity goes and what stock does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    pub next: S,
    pub effect: StockEffect,
}

// =============================================================================
// Pricing
// =============================================================================

/// Priced amounts of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    /// `paid_quantity × tp_rate`.
    pub gross: Money,
    pub discount: Money,
    /// `gross - discount`.
    pub net: Money,
}

/// Prices a line. Free units never contribute.
///
/// ## Example
/// ```rust
/// use pharmadist_core::invoice::price_line;
/// use pharmadist_core::money::Money;
/// use pharmadist_core::types::DiscountType;
///
/// // 3 paid at 12.50, 10% off; free units are not billed
/// let amount = price_line(Money::from_cents(1250), 3, DiscountType::Percent, 1000).unwrap();
/// assert_eq!(amount.gross.cents(), 3750);
/// assert_eq!(amount.net.cents(), 3375);
/// ```
pub fn price_line(
    tp_rate: Money,
    paid_quantity: i64,
    discount_type: DiscountType,
    discount_value: i64,
) -> CoreResult<LineAmount> {
    if discount_value < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "discount".to_string(),
        }
        .into());
    }

    let gross = tp_rate.multiply_quantity(paid_quantity);
    let discount = match discount_type {
        DiscountType::Amount => Money::from_cents(discount_value),
        DiscountType::Percent => {
            if discount_value > BPS_PER_WHOLE {
                return Err(ValidationError::OutOfRange {
                    field: "discount percent".to_string(),
                    min: 0,
                    max: BPS_PER_WHOLE,
                }
                .into());
            }
            gross.percentage(discount_value)
        }
    };

    if discount > gross {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: gross.cents(),
        }
        .into());
    }

    Ok(LineAmount {
        gross,
        discount,
        net: gross - discount,
    })
}

/// Invoice header amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    /// Sum of line nets.
    pub subtotal: Money,
    /// Invoice-level discount.
    pub discount: Money,
    pub total: Money,
}

/// Totals an invoice from its line nets and an invoice-level discount.
pub fn invoice_totals<I>(line_nets: I, discount: Money) -> CoreResult<InvoiceTotals>
where
    I: IntoIterator<Item = Money>,
{
    let subtotal: Money = line_nets.into_iter().sum();
    if discount.is_negative() || discount > subtotal {
        return Err(ValidationError::OutOfRange {
            field: "invoice discount".to_string(),
            min: 0,
            max: subtotal.cents(),
        }
        .into());
    }
    Ok(InvoiceTotals {
        subtotal,
        discount,
        total: subtotal - discount,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Confirmed,
        InvoiceStatus::Paid,
        InvoiceStatus::Partial,
        InvoiceStatus::Cancelled,
    ];

    #[test]
    fn test_only_draft_confirms() {
        for status in ALL {
            let t = status.transition(InvoiceEvent::Confirm);
            if status == InvoiceStatus::Draft {
                assert_eq!(t.unwrap().effect, StockEffect::Deduct);
            } else {
                assert!(t.is_none(), "{status} should not confirm");
            }
        }
    }

    #[test]
    fn test_cancel_restores_only_when_stock_held() {
        for status in ALL {
            match status.transition(InvoiceEvent::Cancel) {
                Some(t) => {
                    assert_eq!(t.next, InvoiceStatus::Cancelled);
                    let expected = if status.holds_stock() {
                        StockEffect::Restore
                    } else {
                        StockEffect::None
                    };
                    assert_eq!(t.effect, expected);
                }
                None => assert_eq!(status, InvoiceStatus::Cancelled),
            }
        }
    }

    #[test]
    fn test_delete_forces_cancelled_for_stock_holders() {
        let t = InvoiceStatus::Paid.transition(InvoiceEvent::Delete).unwrap();
        assert_eq!(t.next, InvoiceStatus::Cancelled);
        assert_eq!(t.effect, StockEffect::Restore);

        let t = InvoiceStatus::Draft.transition(InvoiceEvent::Delete).unwrap();
        assert_eq!(t.next, InvoiceStatus::Draft);
        assert_eq!(t.effect, StockEffect::None);
    }

    #[test]
    fn test_payment_transitions() {
        let paid = InvoiceStatus::Confirmed
            .transition(InvoiceEvent::Payment { settled: true })
            .unwrap();
        assert_eq!(paid.next, InvoiceStatus::Paid);

        let partial = InvoiceStatus::Partial
            .transition(InvoiceEvent::Payment { settled: false })
            .unwrap();
        assert_eq!(partial.next, InvoiceStatus::Partial);

        assert!(InvoiceStatus::Draft
            .transition(InvoiceEvent::Payment { settled: true })
            .is_none());
        assert!(InvoiceStatus::Paid
            .transition(InvoiceEvent::Payment { settled: true })
            .is_none());
    }

    #[test]
    fn test_apply_reports_invalid_transition() {
        let err = InvoiceStatus::Cancelled
            .apply("INV-0007", InvoiceEvent::Confirm)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invoice INV-0007 is CANCELLED, cannot confirm");
    }

    #[test]
    fn test_price_line_amount_discount() {
        let amount = price_line(Money::from_cents(1000), 5, DiscountType::Amount, 500).unwrap();
        assert_eq!(amount.net.cents(), 4500);

        let amount = price_line(Money::from_cents(1000), 0, DiscountType::Amount, 0).unwrap();
        assert!(amount.net.is_zero());
    }

    #[test]
    fn test_price_line_rejects_bad_discounts() {
        assert!(price_line(Money::from_cents(1000), 1, DiscountType::Amount, 1001).is_err());
        assert!(price_line(Money::from_cents(1000), 1, DiscountType::Percent, 10_001).is_err());
        assert!(price_line(Money::from_cents(1000), 1, DiscountType::Amount, -1).is_err());
    }

    #[test]
    fn test_invoice_totals() {
        let totals = invoice_totals(
            [Money::from_cents(3375), Money::from_cents(4500)],
            Money::from_cents(875),
        )
        .unwrap();
        assert_eq!(totals.subtotal.cents(), 7875);
        assert_eq!(totals.total.cents(), 7000);

        assert!(invoice_totals([Money::from_cents(100)], Money::from_cents(101)).is_err());
    }
}
