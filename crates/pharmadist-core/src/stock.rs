//! # Stock Planning
//!
//! Pure decisions behind every stock mutation: may this batch give up these
//! units, which ledger entries does the movement produce, and does the
//! resulting quantity deserve an advisory.
//!
//! The database layer loads the batch, asks this module for a plan, then
//! applies it inside one transaction.
//!
//! ## Deduction Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deduct(batch, paid=3, free=2)          batch.quantity = 10             │
//! │                                                                         │
//! │  check_deduction(10, 5)                                                 │
//! │     ├── 10 <= 0 ? ──► OutOfStock                                        │
//! │     └── 10 <  5 ? ──► InsufficientStock { available, required }         │
//! │                                                                         │
//! │  deduction_entries                                                      │
//! │     ├── SALE  -3   (paid > 0)                                           │
//! │     └── FREE  -2   (free > 0)      never merged into one entry          │
//! │                                                                         │
//! │  new quantity 5 ──► advisory_kind(5, 50) = LowStock                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every forward plan has an exact reverse: [`restoration_entries`] mirrors the
//! paid/free split of [`deduction_entries`] with positive RETURN entries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::adjustment::AdjustmentType;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{AdvisoryKind, LedgerDraft, LineQuantity, MovementType};

/// Note attached to RETURN entries written by a reversal.
pub const REVERSAL_NOTE: &str = "reversal";

/// What a status transition does to the stock of every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockEffect {
    None,
    /// Deduct every line (SALE / FREE entries).
    Deduct,
    /// Put every line back (RETURN entries).
    Restore,
}

// =============================================================================
// Availability Checks
// =============================================================================

/// Checks that `available` units can cover `required`.
///
/// An empty batch is reported as `OutOfStock` no matter what was asked for.
pub fn check_deduction(product: &str, available: i64, required: i64) -> CoreResult<()> {
    if available <= 0 {
        return Err(CoreError::OutOfStock {
            product: product.to_string(),
        });
    }
    if available < required {
        return Err(CoreError::InsufficientStock {
            product: product.to_string(),
            available,
            required,
        });
    }
    Ok(())
}

/// Checks a raw-material lot before issuing stock from it.
///
/// Expiry is checked first: an expired lot is never issued from, even if it
/// holds enough.
pub fn check_lot_issue(
    lot_number: &str,
    expiry_date: Option<NaiveDate>,
    as_of: NaiveDate,
    available: i64,
    required: i64,
) -> CoreResult<()> {
    if required <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if let Some(expired_on) = expiry_date.filter(|expiry| *expiry < as_of) {
        return Err(CoreError::ExpiredLot {
            lot_number: lot_number.to_string(),
            expired_on,
        });
    }
    check_deduction(lot_number, available, required)
}

/// Sums demand per batch, keeping the order in which batches first appear.
///
/// Two lines of one invoice drawing on the same batch must be validated
/// against their combined quantity.
pub fn aggregate_demand<'a, I>(lines: I) -> Vec<(&'a str, LineQuantity)>
where
    I: IntoIterator<Item = (&'a str, LineQuantity)>,
{
    let mut demand: Vec<(&'a str, LineQuantity)> = Vec::new();
    for (batch_id, qty) in lines {
        match demand.iter_mut().find(|(id, _)| *id == batch_id) {
            Some((_, total)) => *total = *total + qty,
            None => demand.push((batch_id, qty)),
        }
    }
    demand
}

// =============================================================================
// Ledger Plans
// =============================================================================

/// Entries for a deduction: SALE for paid units, FREE for free units.
pub fn deduction_entries(
    product_id: &str,
    batch_id: &str,
    qty: LineQuantity,
    reference: &str,
) -> Vec<LedgerDraft> {
    let mut entries = Vec::with_capacity(2);
    if qty.paid > 0 {
        entries.push(draft(product_id, batch_id, MovementType::Sale, -qty.paid, reference, None));
    }
    if qty.free > 0 {
        entries.push(draft(product_id, batch_id, MovementType::Free, -qty.free, reference, None));
    }
    entries
}

/// Entries for the exact reverse of a deduction.
///
/// Paid and free parts come back as separate RETURN entries.
pub fn restoration_entries(
    product_id: &str,
    batch_id: &str,
    qty: LineQuantity,
    reference: &str,
) -> Vec<LedgerDraft> {
    [qty.paid, qty.free]
        .into_iter()
        .filter(|units| *units > 0)
        .map(|units| {
            draft(
                product_id,
                batch_id,
                MovementType::Return,
                units,
                reference,
                Some(REVERSAL_NOTE),
            )
        })
        .collect()
}

/// A planned adjustment: the signed change and its single ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentPlan {
    pub quantity_change: i64,
    pub new_quantity: i64,
    pub entry: LedgerDraft,
}

/// Plans an adjustment against a batch holding `available` units.
#[allow(clippy::too_many_arguments)]
pub fn plan_adjustment(
    product: &str,
    product_id: &str,
    batch_id: &str,
    available: i64,
    adjustment_type: AdjustmentType,
    quantity: i64,
    reference: &str,
    reason: &str,
) -> CoreResult<AdjustmentPlan> {
    let change = adjustment_type.signed_change(quantity)?;
    let new_quantity = available + change;
    if new_quantity < 0 {
        return Err(CoreError::InvalidAdjustment {
            product: product.to_string(),
            available,
            change,
        });
    }

    let notes = (!reason.trim().is_empty()).then_some(reason);
    Ok(AdjustmentPlan {
        quantity_change: change,
        new_quantity,
        entry: draft(
            product_id,
            batch_id,
            adjustment_type.ledger_type(),
            change,
            reference,
            notes,
        ),
    })
}

/// The single entry recording newly received stock.
///
/// Only OPENING and PURCHASE describe a receipt.
pub fn receipt_entry(
    product_id: &str,
    batch_id: &str,
    kind: MovementType,
    quantity: i64,
    reference: &str,
) -> CoreResult<LedgerDraft> {
    if !matches!(kind, MovementType::Opening | MovementType::Purchase) {
        return Err(ValidationError::InvalidFormat {
            field: "movement type".to_string(),
            reason: format!("{kind} is not a receipt"),
        }
        .into());
    }
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    Ok(draft(product_id, batch_id, kind, quantity, reference, None))
}

fn draft(
    product_id: &str,
    batch_id: &str,
    movement_type: MovementType,
    quantity: i64,
    reference: &str,
    notes: Option<&str>,
) -> LedgerDraft {
    LedgerDraft {
        product_id: product_id.to_string(),
        batch_id: Some(batch_id.to_string()),
        movement_type,
        quantity,
        reference: reference.to_string(),
        notes: notes.map(str::to_string),
    }
}

// =============================================================================
// Advisories & Reconciliation
// =============================================================================

/// Advisory for a batch left with `new_quantity` units.
pub fn advisory_kind(new_quantity: i64, threshold: i64) -> Option<AdvisoryKind> {
    if new_quantity == 0 {
        Some(AdvisoryKind::OutOfStock)
    } else if new_quantity > 0 && new_quantity <= threshold {
        Some(AdvisoryKind::LowStock)
    } else {
        None
    }
}

/// A batch whose cached quantity disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BalanceMismatch {
    pub batch_id: String,
    pub cached_quantity: i64,
    pub ledger_quantity: i64,
}

impl BalanceMismatch {
    /// `cached - ledger`.
    pub fn drift(&self) -> i64 {
        self.cached_quantity - self.ledger_quantity
    }
}

pub fn check_balance(batch_id: &str, cached: i64, ledger: i64) -> Option<BalanceMismatch> {
    (cached != ledger).then(|| BalanceMismatch {
        batch_id: batch_id.to_string(),
        cached_quantity: cached,
        ledger_quantity: ledger,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_deduction() {
        assert!(check_deduction("Napa", 10, 10).is_ok());
        assert_eq!(
            check_deduction("Napa", 0, 1),
            Err(CoreError::OutOfStock {
                product: "Napa".to_string()
            })
        );
        assert_eq!(
            check_deduction("Napa", 5, 7),
            Err(CoreError::InsufficientStock {
                product: "Napa".to_string(),
                available: 5,
                required: 7
            })
        );
    }

    #[test]
    fn test_paid_and_free_split_into_two_entries() {
        let entries = deduction_entries("p-1", "b-1", LineQuantity::new(3, 2), "INV-1");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].movement_type, MovementType::Sale);
        assert_eq!(entries[0].quantity, -3);
        assert_eq!(entries[1].movement_type, MovementType::Free);
        assert_eq!(entries[1].quantity, -2);
    }

    #[test]
    fn test_zero_parts_are_skipped() {
        let entries = deduction_entries("p-1", "b-1", LineQuantity::free_only(4), "SMP-1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].movement_type, MovementType::Free);

        let entries = restoration_entries("p-1", "b-1", LineQuantity::new(5, 0), "INV-1");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_restoration_mirrors_deduction() {
        let qty = LineQuantity::new(3, 2);
        let out: i64 = deduction_entries("p", "b", qty, "R").iter().map(|e| e.quantity).sum();
        let back = restoration_entries("p", "b", qty, "R");
        assert!(back.iter().all(|e| e.movement_type == MovementType::Return));
        assert!(back.iter().all(|e| e.notes.as_deref() == Some(REVERSAL_NOTE)));
        assert_eq!(back.iter().map(|e| e.quantity).sum::<i64>(), -out);
    }

    #[test]
    fn test_plan_adjustment_signs() {
        let plan =
            plan_adjustment("Napa", "p", "b", 10, AdjustmentType::Damage, 3, "ADJ", "broken")
                .unwrap();
        assert_eq!(plan.new_quantity, 7);
        assert_eq!(plan.entry.quantity, -3);
        assert_eq!(plan.entry.movement_type, MovementType::Damage);

        let plan =
            plan_adjustment("Napa", "p", "b", 7, AdjustmentType::Found, 3, "ADJ", "").unwrap();
        assert_eq!(plan.new_quantity, 10);
        assert_eq!(plan.entry.quantity, 3);
        assert_eq!(plan.entry.notes, None);
    }

    #[test]
    fn test_plan_adjustment_cannot_go_negative() {
        let err = plan_adjustment("Napa", "p", "b", 2, AdjustmentType::Lost, 3, "ADJ", "")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAdjustment { change: -3, .. }));
    }

    #[test]
    fn test_receipt_entry_kinds() {
        assert!(receipt_entry("p", "b", MovementType::Opening, 10, "OPEN").is_ok());
        assert!(receipt_entry("p", "b", MovementType::Purchase, 10, "PO-1").is_ok());
        assert!(receipt_entry("p", "b", MovementType::Sale, 10, "X").is_err());
        assert!(receipt_entry("p", "b", MovementType::Purchase, 0, "PO-1").is_err());
    }

    #[test]
    fn test_aggregate_demand_keeps_first_order() {
        let demand = aggregate_demand(vec![
            ("b-2", LineQuantity::new(1, 0)),
            ("b-1", LineQuantity::new(2, 1)),
            ("b-2", LineQuantity::new(3, 2)),
        ]);
        assert_eq!(
            demand,
            vec![("b-2", LineQuantity::new(4, 2)), ("b-1", LineQuantity::new(2, 1))]
        );
    }

    #[test]
    fn test_advisory_thresholds() {
        assert_eq!(advisory_kind(0, 50), Some(AdvisoryKind::OutOfStock));
        assert_eq!(advisory_kind(1, 50), Some(AdvisoryKind::LowStock));
        assert_eq!(advisory_kind(50, 50), Some(AdvisoryKind::LowStock));
        assert_eq!(advisory_kind(51, 50), None);
    }

    #[test]
    fn test_lot_issue_checks_expiry_first() {
        let as_of = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let expired = NaiveDate::from_ymd_opt(2026, 4, 30);
        let err = check_lot_issue("L-1", expired, as_of, 100, 5).unwrap_err();
        assert!(matches!(err, CoreError::ExpiredLot { .. }));

        assert!(check_lot_issue("L-1", Some(as_of), as_of, 100, 5).is_ok());
        assert!(check_lot_issue("L-1", None, as_of, 3, 5).unwrap_err().is_stock_shortage());
    }

    #[test]
    fn test_check_balance() {
        assert_eq!(check_balance("b", 10, 10), None);
        let mismatch = check_balance("b", 12, 10).unwrap();
        assert_eq!(mismatch.drift(), 2);
    }
}
