//! # Audit Repository
//!
//! One row per mutating operation, written on the same connection (and so in
//! the same transaction) as the change it describes.

use chrono::Utc;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use pharmadist_core::{AuditAction, AuditRecord};

/// Repository for reading the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Audit rows for one entity, oldest first.
    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> DbResult<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT id, action, entity_type, entity_id, entity_name, changes, created_at
            FROM audit_logs
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Most recent audit rows across all entities.
    pub async fn list_recent(&self, limit: i64) -> DbResult<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT id, action, entity_type, entity_id, entity_name, changes, created_at
            FROM audit_logs
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Appends an audit row.
pub(crate) async fn record(
    conn: &mut SqliteConnection,
    action: AuditAction,
    entity_type: &str,
    entity_id: &str,
    entity_name: &str,
    changes: Value,
) -> DbResult<()> {
    let id = Uuid::new_v4().to_string();
    let changes = serde_json::to_string(&changes)?;

    debug!(?action, entity_type, entity_id, "Recording audit entry");

    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, action, entity_type, entity_id, entity_name, changes, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(entity_name)
    .bind(&changes)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
