//! # Adjustment Rules
//!
//! Typed stock adjustments and the static table that decides which ledger
//! movement they produce and in which direction they move stock.
//!
//! ```text
//! ┌──────────────┬──────────────┬──────┐
//! │ Adjustment   │ Ledger type  │ Sign │
//! ├──────────────┼──────────────┼──────┤
//! │ DAMAGE       │ DAMAGE       │  −   │
//! │ EXPIRED      │ EXPIRED      │  −   │
//! │ LOST         │ ADJUSTMENT   │  −   │
//! │ FOUND        │ ADJUSTMENT   │  +   │
//! │ CORRECTION   │ ADJUSTMENT   │  −   │
//! │ RETURN       │ RETURN       │  +   │
//! └──────────────┴──────────────┴──────┘
//! ```
//!
//! A CORRECTION always removes stock. Upward corrections are entered as FOUND.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::types::MovementType;

/// Kind of stock adjustment.
///
/// The discriminant order indexes [`ADJUSTMENT_RULES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Damage = 0,
    Expired = 1,
    Lost = 2,
    Found = 3,
    Correction = 4,
    Return = 5,
}

/// What happens to goods a customer returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnAction {
    /// Goods go back on the shelf (stock increases).
    Restock,
    /// Goods are destroyed; recorded, no stock change.
    Scrap,
}

/// Ledger movement type and direction for one adjustment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentRule {
    pub ledger_type: MovementType,
    /// +1 adds stock, -1 removes it.
    pub sign: i64,
}

/// Indexed by `AdjustmentType as usize`.
pub const ADJUSTMENT_RULES: [AdjustmentRule; 6] = [
    AdjustmentRule { ledger_type: MovementType::Damage, sign: -1 },
    AdjustmentRule { ledger_type: MovementType::Expired, sign: -1 },
    AdjustmentRule { ledger_type: MovementType::Adjustment, sign: -1 },
    AdjustmentRule { ledger_type: MovementType::Adjustment, sign: 1 },
    AdjustmentRule { ledger_type: MovementType::Adjustment, sign: -1 },
    AdjustmentRule { ledger_type: MovementType::Return, sign: 1 },
];

impl AdjustmentType {
    pub const ALL: [AdjustmentType; 6] = [
        AdjustmentType::Damage,
        AdjustmentType::Expired,
        AdjustmentType::Lost,
        AdjustmentType::Found,
        AdjustmentType::Correction,
        AdjustmentType::Return,
    ];

    #[inline]
    pub const fn rule(&self) -> AdjustmentRule {
        ADJUSTMENT_RULES[*self as usize]
    }

    #[inline]
    pub const fn ledger_type(&self) -> MovementType {
        self.rule().ledger_type
    }

    /// Signed change for an entered quantity.
    ///
    /// ## Example
    /// ```rust
    /// use pharmadist_core::adjustment::AdjustmentType;
    ///
    /// assert_eq!(AdjustmentType::Damage.signed_change(3).unwrap(), -3);
    /// assert_eq!(AdjustmentType::Found.signed_change(3).unwrap(), 3);
    /// assert!(AdjustmentType::Found.signed_change(0).is_err());
    /// ```
    pub fn signed_change(&self, quantity: i64) -> CoreResult<i64> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "adjustment quantity".to_string(),
            }
            .into());
        }
        Ok(self.rule().sign * quantity)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Damage => "DAMAGE",
            AdjustmentType::Expired => "EXPIRED",
            AdjustmentType::Lost => "LOST",
            AdjustmentType::Found => "FOUND",
            AdjustmentType::Correction => "CORRECTION",
            AdjustmentType::Return => "RETURN",
        }
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_variants() {
        assert_eq!(AdjustmentType::Damage.ledger_type(), MovementType::Damage);
        assert_eq!(AdjustmentType::Expired.ledger_type(), MovementType::Expired);
        assert_eq!(AdjustmentType::Return.ledger_type(), MovementType::Return);
        assert_eq!(AdjustmentType::Lost.ledger_type(), MovementType::Adjustment);
        assert_eq!(AdjustmentType::Found.ledger_type(), MovementType::Adjustment);
        assert_eq!(AdjustmentType::Correction.ledger_type(), MovementType::Adjustment);
    }

    #[test]
    fn test_only_found_and_return_add_stock() {
        let adding: Vec<_> = AdjustmentType::ALL
            .iter()
            .filter(|t| t.rule().sign > 0)
            .copied()
            .collect();
        assert_eq!(adding, vec![AdjustmentType::Found, AdjustmentType::Return]);
    }

    #[test]
    fn test_signed_change_rejects_non_positive() {
        assert!(AdjustmentType::Lost.signed_change(0).is_err());
        assert!(AdjustmentType::Lost.signed_change(-4).is_err());
        assert_eq!(AdjustmentType::Lost.signed_change(4).unwrap(), -4);
    }
}
