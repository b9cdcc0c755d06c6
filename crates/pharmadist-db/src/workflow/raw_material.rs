//! # Raw Material Workflow
//!
//! Lot-tracked raw materials: receipts add an IN movement, issues check
//! expiry and availability before a guarded decrement and an OUT movement.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{audit, raw_material};
use pharmadist_core::stock::check_lot_issue;
use pharmadist_core::validation::{
    validate_batch_number, validate_price_cents, validate_product_name, validate_quantity,
    validate_reference,
};
use pharmadist_core::{
    AuditAction, CoreError, MovementDirection, RawMaterial, RawMaterialLot, RawMaterialMovement,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveLot {
    pub raw_material_id: String,
    pub lot_number: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub expiry_date: Option<NaiveDate>,
}

/// Outcome of a lot stock-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotIssue {
    pub lot_id: String,
    pub new_quantity: i64,
    pub movement: RawMaterialMovement,
}

#[derive(Debug, Clone)]
pub struct RawMaterialWorkflow {
    pool: SqlitePool,
}

impl RawMaterialWorkflow {
    pub fn new(pool: SqlitePool) -> Self {
        RawMaterialWorkflow { pool }
    }

    pub async fn create_material(&self, name: &str, unit: &str) -> DbResult<RawMaterial> {
        validate_product_name(name)?;

        let material = RawMaterial {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            unit: unit.trim().to_string(),
            is_deleted: false,
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        raw_material::insert_material(&mut tx, &material).await?;
        audit::record(
            &mut tx,
            AuditAction::Create,
            "RAW_MATERIAL",
            &material.id,
            &material.name,
            json!({ "unit": material.unit }),
        )
        .await?;
        tx.commit().await?;

        info!(raw_material_id = %material.id, name = %material.name, "Raw material created");
        Ok(material)
    }

    /// Receives a lot. A second receipt under the same lot number tops the
    /// existing lot up.
    pub async fn receive_lot(&self, input: &ReceiveLot) -> DbResult<RawMaterialLot> {
        validate_batch_number(&input.lot_number)?;
        validate_quantity(input.quantity)?;
        validate_price_cents(input.unit_cost_cents)?;

        let mut tx = self.pool.begin().await?;

        let material = raw_material::fetch_material(&mut tx, &input.raw_material_id)
            .await?
            .ok_or_else(|| DbError::not_found("Raw material", &input.raw_material_id))?;

        let lot_number = input.lot_number.trim();
        let lot_id = match raw_material::fetch_lot_by_number(&mut tx, &material.id, lot_number).await? {
            Some(existing) => {
                raw_material::apply_lot_change(&mut tx, &existing.id, input.quantity)
                    .await?
                    .ok_or_else(|| DbError::not_found("Raw material lot", &existing.id))?;
                existing.id
            }
            None => {
                let now = Utc::now();
                let lot = RawMaterialLot {
                    id: Uuid::new_v4().to_string(),
                    raw_material_id: material.id.clone(),
                    lot_number: lot_number.to_string(),
                    quantity: input.quantity,
                    unit_cost_cents: input.unit_cost_cents,
                    expiry_date: input.expiry_date,
                    created_at: now,
                    updated_at: now,
                };
                raw_material::insert_lot(&mut tx, &lot).await?;
                lot.id
            }
        };

        raw_material::insert_movement(
            &mut tx,
            &RawMaterialMovement {
                id: Uuid::new_v4().to_string(),
                lot_id: lot_id.clone(),
                direction: MovementDirection::In,
                quantity: input.quantity,
                reference: lot_number.to_string(),
                created_at: Utc::now(),
            },
        )
        .await?;

        let lot = raw_material::fetch_lot_required(&mut tx, &lot_id).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "RAW_MATERIAL_LOT",
            &lot.id,
            &format!("{} / {}", material.name, lot.lot_number),
            json!({ "received": input.quantity, "new_quantity": lot.quantity }),
        )
        .await?;
        tx.commit().await?;

        info!(lot_id = %lot.id, lot_number = %lot.lot_number, quantity = lot.quantity, "Raw material lot received");
        Ok(lot)
    }

    /// Issues `quantity` from a lot.
    ///
    /// ## Errors
    /// - `ExpiredLot` when the lot's expiry is before `as_of`
    /// - `OutOfStock` / `InsufficientStock` when the lot is short
    pub async fn stock_out(
        &self,
        lot_id: &str,
        quantity: i64,
        reference: &str,
        as_of: NaiveDate,
    ) -> DbResult<LotIssue> {
        validate_reference(reference)?;

        let mut tx = self.pool.begin().await?;

        let lot = raw_material::fetch_lot_required(&mut tx, lot_id).await?;
        check_lot_issue(&lot.lot_number, lot.expiry_date, as_of, lot.quantity, quantity)?;

        let new_quantity = match raw_material::apply_lot_change(&mut tx, lot_id, -quantity).await? {
            Some(remaining) => remaining,
            None => {
                let latest = raw_material::fetch_lot_required(&mut tx, lot_id).await?;
                return Err(CoreError::InsufficientStock {
                    product: lot.lot_number,
                    available: latest.quantity,
                    required: quantity,
                }
                .into());
            }
        };

        let movement = RawMaterialMovement {
            id: Uuid::new_v4().to_string(),
            lot_id: lot_id.to_string(),
            direction: MovementDirection::Out,
            quantity: -quantity,
            reference: reference.to_string(),
            created_at: Utc::now(),
        };
        raw_material::insert_movement(&mut tx, &movement).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "RAW_MATERIAL_LOT",
            lot_id,
            &lot.lot_number,
            json!({ "issued": quantity, "new_quantity": new_quantity, "reference": reference }),
        )
        .await?;
        tx.commit().await?;

        info!(lot_id, reference, quantity, new_quantity, "Raw material issued");
        Ok(LotIssue {
            lot_id: lot_id.to_string(),
            new_quantity,
            movement,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn lot(db: &Database, quantity: i64, expiry: NaiveDate) -> RawMaterialLot {
        let workflow = db.raw_material_workflow();
        let material = workflow.create_material("Paracetamol BP", "kg").await.unwrap();
        workflow
            .receive_lot(&ReceiveLot {
                raw_material_id: material.id,
                lot_number: "PCM-2601".to_string(),
                quantity,
                unit_cost_cents: 45_000,
                expiry_date: Some(expiry),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_receive_and_issue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let received = lot(&db, 50, day(2027, 1, 31)).await;
        assert_eq!(received.quantity, 50);

        let issue = db
            .raw_material_workflow()
            .stock_out(&received.id, 20, "BATCH-RUN-7", day(2026, 10, 1))
            .await
            .unwrap();
        assert_eq!(issue.new_quantity, 30);
        assert_eq!(issue.movement.direction, MovementDirection::Out);
        assert_eq!(issue.movement.quantity, -20);

        let movements = db.raw_materials().list_movements(&received.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements.iter().map(|m| m.quantity).sum::<i64>(), 30);
    }

    #[tokio::test]
    async fn test_expired_lot_is_blocked() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let received = lot(&db, 50, day(2026, 3, 31)).await;

        let err = db
            .raw_material_workflow()
            .stock_out(&received.id, 5, "BATCH-RUN-8", day(2026, 4, 1))
            .await
            .unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&CoreError::ExpiredLot {
                lot_number: "PCM-2601".to_string(),
                expired_on: day(2026, 3, 31),
            })
        );

        let stored = db.raw_materials().get_lot(&received.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 50);
    }

    #[tokio::test]
    async fn test_issue_beyond_lot_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let received = lot(&db, 10, day(2027, 1, 31)).await;

        let err = db
            .raw_material_workflow()
            .stock_out(&received.id, 11, "BATCH-RUN-9", day(2026, 10, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::InsufficientStock { available: 10, required: 11, .. })
        ));
    }
}
