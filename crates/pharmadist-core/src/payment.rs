//! # Payment Settlement
//!
//! Applying a payment never touches stock; it only moves `paid`, `due` and
//! the invoice status.
//!
//! ```text
//!   due 100, pay 100 ──► paid +100, due 0   ──► PAID
//!   due 100, pay 40  ──► paid +40,  due 60  ──► PARTIAL
//!   due 60,  pay 80  ──► paid +80,  due 0   ──► PAID   (due floors at 0)
//! ```

use crate::error::CoreResult;
use crate::invoice::{InvoiceEvent, InvoiceStatus};
use crate::money::Money;
use crate::validation::validate_payment_amount;

/// New invoice balances after a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub paid: Money,
    pub due: Money,
    pub status: InvoiceStatus,
}

/// Settles `amount` against an invoice.
///
/// ## Errors
/// - `Validation` when `amount <= 0`
/// - `InvalidTransition` unless the invoice is CONFIRMED or PARTIAL
pub fn settle(
    invoice_number: &str,
    status: InvoiceStatus,
    paid: Money,
    due: Money,
    amount: Money,
) -> CoreResult<Settlement> {
    validate_payment_amount(amount.cents())?;

    let new_due = due.saturating_sub_floor(amount);
    let transition = status.apply(
        invoice_number,
        InvoiceEvent::Payment {
            settled: new_due.is_zero(),
        },
    )?;

    Ok(Settlement {
        paid: paid + amount,
        due: new_due,
        status: transition.next,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
