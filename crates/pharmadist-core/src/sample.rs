//! # Sample State Machine
//!
//! Samples are free issues: every deducted unit is written as FREE, every
//! restored unit as RETURN. A sample created with `affects_inventory = false`
//! walks the same statuses without ever touching stock.
//!
//! ```text
//!   DRAFT ──Confirm──► CONFIRMED ──Cancel──► CANCELLED
//!     │   (deduct)         │     (restore)       ▲
//!     └──────Cancel────────┼─────────────────────┘
//!                          └─Delete─► CANCELLED (restore)
//!
//!   deleted DRAFT / CANCELLED ──RestoreFromTrash──► DRAFT
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::invoice::Transition;
use crate::stock::StockEffect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleStatus {
    Draft,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEvent {
    Confirm,
    Cancel,
    Delete,
    RestoreFromTrash,
}

impl SampleEvent {
    pub const fn action(&self) -> &'static str {
        match self {
            SampleEvent::Confirm => "confirm",
            SampleEvent::Cancel => "cancel",
            SampleEvent::Delete => "delete",
            SampleEvent::RestoreFromTrash => "restore",
        }
    }
}

impl SampleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Draft => "DRAFT",
            SampleStatus::Confirmed => "CONFIRMED",
            SampleStatus::Cancelled => "CANCELLED",
        }
    }

    /// Table lookup. `affects_inventory = false` zeroes every stock effect.
    pub fn transition(
        &self,
        event: SampleEvent,
        affects_inventory: bool,
    ) -> Option<Transition<SampleStatus>> {
        use SampleEvent as E;
        use SampleStatus as S;

        let (next, effect) = match (*self, event) {
            (S::Draft, E::Confirm) => (S::Confirmed, StockEffect::Deduct),
            (S::Confirmed, E::Cancel | E::Delete) => (S::Cancelled, StockEffect::Restore),
            (S::Draft, E::Cancel) => (S::Cancelled, StockEffect::None),
            (S::Draft | S::Cancelled, E::Delete) => (*self, StockEffect::None),
            (S::Draft | S::Cancelled, E::RestoreFromTrash) => (S::Draft, StockEffect::None),
            _ => return None,
        };
        let effect = if affects_inventory { effect } else { StockEffect::None };
        Some(Transition { next, effect })
    }

    pub fn apply(
        &self,
        sample_number: &str,
        event: SampleEvent,
        affects_inventory: bool,
    ) -> CoreResult<Transition<SampleStatus>> {
        self.transition(event, affects_inventory)
            .ok_or_else(|| CoreError::InvalidTransition {
                entity: "Sample".to_string(),
                id: sample_number.to_string(),
                status: self.to_string(),
                action: event.action().to_string(),
            })
    }

    /// Event that moves a sample into `target` through `update_status`.
    pub fn event_towards(&self, sample_number: &str, target: SampleStatus) -> CoreResult<SampleEvent> {
        match target {
            SampleStatus::Confirmed => Ok(SampleEvent::Confirm),
            SampleStatus::Cancelled => Ok(SampleEvent::Cancel),
            SampleStatus::Draft => Err(CoreError::InvalidTransition {
                entity: "Sample".to_string(),
                id: sample_number.to_string(),
                status: self.to_string(),
                action: "return to draft".to_string(),
            }),
        }
    }

    /// Stock effect of creating a sample directly in this status.
    pub fn creation_effect(&self, affects_inventory: bool) -> CoreResult<StockEffect> {
        match self {
            SampleStatus::Draft => Ok(StockEffect::None),
            SampleStatus::Confirmed if affects_inventory => Ok(StockEffect::Deduct),
            SampleStatus::Confirmed => Ok(StockEffect::None),
            SampleStatus::Cancelled => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: "a sample cannot be created cancelled".to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for SampleStatus {
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
    fn test_confirm_then_cancel_round_trip() {
        let confirm = SampleStatus::Draft.transition(SampleEvent::Confirm, true).unwrap();
        assert_eq!(confirm.effect, StockEffect::Deduct);

        let cancel = confirm.next.transition(SampleEvent::Cancel, true).unwrap();
        assert_eq!(cancel.next, SampleStatus::Cancelled);
        assert_eq!(cancel.effect, StockEffect::Restore);
    }

    #[test]
    fn test_non_inventory_sample_never_moves_stock() {
        for event in [SampleEvent::Confirm, SampleEvent::Cancel, SampleEvent::Delete] {
            for status in [SampleStatus::Draft, SampleStatus::Confirmed] {
                if let Some(t) = status.transition(event, false) {
                    assert_eq!(t.effect, StockEffect::None);
                }
            }
        }
    }

    #[test]
    fn test_cancelled_is_terminal_except_trash() {
        let err = SampleStatus::Cancelled
            .apply("SMP-3", SampleEvent::Confirm, true)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert!(SampleStatus::Cancelled
            .transition(SampleEvent::Cancel, true)
            .is_none());
    }

    #[test]
    fn test_creation_effect() {
        assert_eq!(
            SampleStatus::Confirmed.creation_effect(true).unwrap(),
            StockEffect::Deduct
        );
        assert_eq!(
            SampleStatus::Confirmed.creation_effect(false).unwrap(),
            StockEffect::None
        );
        assert!(SampleStatus::Cancelled.creation_effect(true).is_err());
    }

    #[test]
    fn test_event_towards() {
        let status = SampleStatus::Draft;
        assert_eq!(
            status.event_towards("S", SampleStatus::Confirmed).unwrap(),
            SampleEvent::Confirm
        );
        assert!(status.event_towards("S", SampleStatus::Draft).is_err());
    }
}
