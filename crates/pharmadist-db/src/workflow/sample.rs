//! # Sample Workflow
//!
//! Free issues to physicians and institutions. Every unit leaves as FREE and
//! comes back as RETURN; samples flagged `affects_inventory = false` never
//! move stock at all.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::stock::StockEngine;
use super::{deduct_lines, restore_lines};
use crate::error::{DbError, DbResult};
use crate::repository::{audit, batch, next_document_number, product, sample, DocumentSeries};
use pharmadist_core::validation::{validate_line_count, validate_quantity};
use pharmadist_core::{
    AuditAction, CoreError, LineQuantity, Sample, SampleEvent, SampleLine, SampleStatus,
    StockAdvisory, StockEffect, ValidationError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSample {
    pub recipient: String,
    pub notes: Option<String>,
    /// DRAFT or CONFIRMED.
    pub status: SampleStatus,
    pub affects_inventory: bool,
    pub lines: Vec<NewSampleLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSampleLine {
    pub product_id: String,
    pub batch_id: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleOutcome {
    pub sample: Sample,
    pub advisories: Vec<StockAdvisory>,
}

#[derive(Debug, Clone)]
pub struct SampleWorkflow {
    pool: SqlitePool,
    engine: StockEngine,
}

impl SampleWorkflow {
    pub fn new(pool: SqlitePool, engine: StockEngine) -> Self {
        SampleWorkflow { pool, engine }
    }

    /// Creates a sample. Created CONFIRMED with `affects_inventory`, it
    /// deducts its lines immediately.
    pub async fn create(&self, input: &NewSample) -> DbResult<SampleOutcome> {
        if input.recipient.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "recipient".to_string(),
            }
            .into());
        }
        validate_line_count(input.lines.len())?;
        let effect = input.status.creation_effect(input.affects_inventory)?;

        let mut tx = self.pool.begin().await?;

        let now = Utc::now();
        let sample_id = Uuid::new_v4().to_string();
        let mut lines = Vec::with_capacity(input.lines.len());

        for line in &input.lines {
            validate_quantity(line.quantity)?;
            let item = product::fetch(&mut tx, &line.product_id)
                .await?
                .ok_or_else(|| DbError::not_found("Product", &line.product_id))?;
            if let Some(batch_id) = &line.batch_id {
                let source = batch::fetch_live(&mut tx, batch_id).await?;
                if source.product_id != item.id {
                    return Err(ValidationError::InvalidFormat {
                        field: "batch_id".to_string(),
                        reason: format!("batch {} is not a batch of {}", source.batch_number, item.name),
                    }
                    .into());
                }
            }
            lines.push(SampleLine {
                id: Uuid::new_v4().to_string(),
                sample_id: sample_id.clone(),
                product_id: item.id,
                batch_id: line.batch_id.clone(),
                quantity: line.quantity,
                created_at: now,
            });
        }

        let header = Sample {
            id: sample_id,
            sample_number: next_document_number(&mut tx, DocumentSeries::Sample).await?,
            recipient: input.recipient.trim().to_string(),
            status: input.status,
            affects_inventory: input.affects_inventory,
            notes: input.notes.clone(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        sample::insert(&mut tx, &header).await?;
        for line in &lines {
            sample::insert_line(&mut tx, line).await?;
        }

        let advisories = if effect == StockEffect::Deduct {
            deduct_lines(&self.engine, &mut tx, &stock_lines(&lines), &header.sample_number).await?
        } else {
            Vec::new()
        };

        audit::record(
            &mut tx,
            AuditAction::Create,
            "SAMPLE",
            &header.id,
            &header.sample_number,
            json!({
                "recipient": header.recipient,
                "status": header.status,
                "affects_inventory": header.affects_inventory,
                "lines": lines.len(),
            }),
        )
        .await?;

        tx.commit().await?;

        info!(
            sample_number = %header.sample_number,
            status = %header.status,
            deducted = effect == StockEffect::Deduct,
            "Sample created"
        );
        Ok(SampleOutcome {
            sample: header,
            advisories,
        })
    }

    /// Moves a sample to CONFIRMED (deducts) or CANCELLED (restores when it
    /// had been confirmed).
    pub async fn update_status(&self, sample_id: &str, target: SampleStatus) -> DbResult<SampleOutcome> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_active(&mut tx, sample_id).await?;
        let event = current.status.event_towards(&current.sample_number, target)?;
        let transition = current
            .status
            .apply(&current.sample_number, event, current.affects_inventory)?;

        let lines = sample::fetch_lines(&mut tx, sample_id).await?;
        let advisories = match transition.effect {
            StockEffect::Deduct => {
                deduct_lines(&self.engine, &mut tx, &stock_lines(&lines), &current.sample_number).await?
            }
            StockEffect::Restore => {
                restore_lines(&self.engine, &mut tx, &stock_lines(&lines), &current.sample_number).await?;
                Vec::new()
            }
            StockEffect::None => Vec::new(),
        };

        sample::update_state(&mut tx, sample_id, transition.next, false).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "SAMPLE",
            sample_id,
            &current.sample_number,
            json!({ "status": { "from": current.status, "to": transition.next }, "effect": transition.effect }),
        )
        .await?;

        let updated = fetch_required(&mut tx, sample_id).await?;
        tx.commit().await?;

        info!(
            sample_number = %updated.sample_number,
            from = %current.status,
            to = %updated.status,
            "Sample status changed"
        );
        Ok(SampleOutcome {
            sample: updated,
            advisories,
        })
    }

    /// Moves a sample to the trash, restoring stock of a confirmed one.
    pub async fn delete(&self, sample_id: &str) -> DbResult<Sample> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_active(&mut tx, sample_id).await?;
        let transition = current
            .status
            .apply(&current.sample_number, SampleEvent::Delete, current.affects_inventory)?;

        if transition.effect == StockEffect::Restore {
            let lines = sample::fetch_lines(&mut tx, sample_id).await?;
            restore_lines(&self.engine, &mut tx, &stock_lines(&lines), &current.sample_number).await?;
        }

        sample::update_state(&mut tx, sample_id, transition.next, true).await?;
        audit::record(
            &mut tx,
            AuditAction::Delete,
            "SAMPLE",
            sample_id,
            &current.sample_number,
            json!({ "status": { "from": current.status, "to": transition.next } }),
        )
        .await?;

        let updated = fetch_required(&mut tx, sample_id).await?;
        tx.commit().await?;

        info!(sample_number = %updated.sample_number, "Sample moved to trash");
        Ok(updated)
    }

    pub async fn restore_from_trash(&self, sample_id: &str) -> DbResult<Sample> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_required(&mut tx, sample_id).await?;
        if !current.is_deleted {
            return Err(CoreError::InvalidTransition {
                entity: "Sample".to_string(),
                id: current.sample_number,
                status: current.status.to_string(),
                action: "restore a sample that is not in the trash".to_string(),
            }
            .into());
        }
        let transition = current.status.apply(
            &current.sample_number,
            SampleEvent::RestoreFromTrash,
            current.affects_inventory,
        )?;

        sample::update_state(&mut tx, sample_id, transition.next, false).await?;
        audit::record(
            &mut tx,
            AuditAction::Update,
            "SAMPLE",
            sample_id,
            &current.sample_number,
            json!({ "restored_from_trash": true, "status": transition.next }),
        )
        .await?;

        let updated = fetch_required(&mut tx, sample_id).await?;
        tx.commit().await?;

        info!(sample_number = %updated.sample_number, "Sample restored from trash");
        Ok(updated)
    }
}

fn stock_lines(lines: &[SampleLine]) -> Vec<(&str, LineQuantity)> {
    lines
        .iter()
        .filter_map(|l| l.batch_id.as_deref().map(|b| (b, LineQuantity::free_only(l.quantity))))
        .collect()
}

async fn fetch_required(conn: &mut SqliteConnection, id: &str) -> DbResult<Sample> {
    sample::fetch(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Sample", id))
}

async fn fetch_active(conn: &mut SqliteConnection, id: &str) -> DbResult<Sample> {
    let found = fetch_required(conn, id).await?;
    if found.is_deleted {
        return Err(DbError::not_found("Sample", id));
    }
    Ok(found)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::workflow::testing::{seed_batch, seed_product};
    use pharmadist_core::MovementType;

    fn sample_of(product_id: &str, batch_id: &str, quantity: i64, status: SampleStatus, affects: bool) -> NewSample {
        NewSample {
            recipient: "Dr. Rahman".to_string(),
            notes: None,
            status,
            affects_inventory: affects,
            lines: vec![NewSampleLine {
                product_id: product_id.to_string(),
                batch_id: Some(batch_id.to_string()),
                quantity,
            }],
        }
    }

    #[tokio::test]
    async fn test_sample_cancel_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 20).await;
        let workflow = db.sample_workflow();

        let created = workflow
            .create(&sample_of(&product.id, &batch.id, 4, SampleStatus::Confirmed, true))
            .await
            .unwrap();
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 16);

        let cancelled = workflow
            .update_status(&created.sample.id, SampleStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.sample.status, SampleStatus::Cancelled);
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 20);

        let entries = db
            .ledger()
            .list_by_reference(&created.sample.sample_number)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].movement_type, entries[0].quantity), (MovementType::Free, -4));
        assert_eq!((entries[1].movement_type, entries[1].quantity), (MovementType::Return, 4));
    }

    #[tokio::test]
    async fn test_draft_sample_confirms_later() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 20).await;
        let workflow = db.sample_workflow();

        let created = workflow
            .create(&sample_of(&product.id, &batch.id, 5, SampleStatus::Draft, true))
            .await
            .unwrap();
        assert!(created.sample.sample_number.starts_with("SMP-"));
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 20);

        let confirmed = workflow
            .update_status(&created.sample.id, SampleStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.sample.status, SampleStatus::Confirmed);
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 15);

        let err = workflow
            .update_status(&created.sample.id, SampleStatus::Draft)
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_non_inventory_sample_never_moves_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 20).await;
        let workflow = db.sample_workflow();

        let created = workflow
            .create(&sample_of(&product.id, &batch.id, 5, SampleStatus::Confirmed, false))
            .await
            .unwrap();
        workflow.delete(&created.sample.id).await.unwrap();

        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 20);
        assert!(db
            .ledger()
            .list_by_reference(&created.sample.sample_number)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_confirmed_sample_and_restore_from_trash() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 20).await;
        let workflow = db.sample_workflow();

        let created = workflow
            .create(&sample_of(&product.id, &batch.id, 6, SampleStatus::Confirmed, true))
            .await
            .unwrap();
        let deleted = workflow.delete(&created.sample.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.status, SampleStatus::Cancelled);
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 20);

        let restored = workflow.restore_from_trash(&created.sample.id).await.unwrap();
        assert_eq!(restored.status, SampleStatus::Draft);
        assert!(!restored.is_deleted);
        assert_eq!(db.batches().get_by_id(&batch.id).await.unwrap().unwrap().quantity, 20);
    }

    #[tokio::test]
    async fn test_confirmed_sample_over_stock_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "Napa 500mg", 110).await;
        let batch = seed_batch(&db, &product.id, "NP-01", 3).await;

        let err = db
            .sample_workflow()
            .create(&sample_of(&product.id, &batch.id, 5, SampleStatus::Confirmed, true))
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::InsufficientStock { available: 3, required: 5, .. })
        ));
        assert!(db.samples().list(10).await.unwrap().is_empty());
    }
}
