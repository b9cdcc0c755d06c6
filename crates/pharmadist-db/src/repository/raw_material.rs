//! # Raw Material Repository
//!
//! Raw materials, their received lots and the IN/OUT movement trail.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use pharmadist_core::{RawMaterial, RawMaterialLot, RawMaterialMovement};

const SELECT_LOT: &str = r#"
    SELECT id, raw_material_id, lot_number, quantity, unit_cost_cents,
           expiry_date, created_at, updated_at
    FROM raw_material_lots
"#;

/// Repository for raw-material reads.
#[derive(Debug, Clone)]
pub struct RawMaterialRepository {
    pool: SqlitePool,
}

impl RawMaterialRepository {
    /// Creates a new RawMaterialRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RawMaterialRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<RawMaterial>> {
        let mut conn = self.pool.acquire().await?;
        fetch_material(&mut conn, id).await
    }

    pub async fn get_lot(&self, lot_id: &str) -> DbResult<Option<RawMaterialLot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lot(&mut conn, lot_id).await
    }

    /// Lots of a material, earliest expiry first.
    pub async fn list_lots(&self, raw_material_id: &str) -> DbResult<Vec<RawMaterialLot>> {
        let sql = format!(
            "{SELECT_LOT} WHERE raw_material_id = ?1 \
             ORDER BY expiry_date IS NULL, expiry_date, created_at"
        );
        let lots = sqlx::query_as::<_, RawMaterialLot>(&sql)
            .bind(raw_material_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(lots)
    }

    pub async fn list_movements(&self, lot_id: &str) -> DbResult<Vec<RawMaterialMovement>> {
        let movements = sqlx::query_as::<_, RawMaterialMovement>(
            r#"
            SELECT id, lot_id, direction, quantity, reference, created_at
            FROM raw_material_movements
            WHERE lot_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(lot_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}

/// Loads a non-deleted raw material.
pub(crate) async fn fetch_material(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<RawMaterial>> {
    let material = sqlx::query_as::<_, RawMaterial>(
        r#"
        SELECT id, name, unit, is_deleted, created_at
        FROM raw_materials
        WHERE id = ?1 AND is_deleted = 0
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(material)
}

pub(crate) async fn insert_material(conn: &mut SqliteConnection, material: &RawMaterial) -> DbResult<()> {
    debug!(id = %material.id, name = %material.name, "Inserting raw material");

    sqlx::query(
        r#"
        INSERT INTO raw_materials (id, name, unit, is_deleted, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&material.id)
    .bind(&material.name)
    .bind(&material.unit)
    .bind(material.is_deleted)
    .bind(material.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn fetch_lot(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<RawMaterialLot>> {
    let sql = format!("{SELECT_LOT} WHERE id = ?1");
    let lot = sqlx::query_as::<_, RawMaterialLot>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(lot)
}

pub(crate) async fn fetch_lot_by_number(
    conn: &mut SqliteConnection,
    raw_material_id: &str,
    lot_number: &str,
) -> DbResult<Option<RawMaterialLot>> {
    let sql = format!("{SELECT_LOT} WHERE raw_material_id = ?1 AND lot_number = ?2");
    let lot = sqlx::query_as::<_, RawMaterialLot>(&sql)
        .bind(raw_material_id)
        .bind(lot_number)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(lot)
}

pub(crate) async fn insert_lot(conn: &mut SqliteConnection, lot: &RawMaterialLot) -> DbResult<()> {
    debug!(id = %lot.id, lot_number = %lot.lot_number, "Inserting raw material lot");

    sqlx::query(
        r#"
        INSERT INTO raw_material_lots (
            id, raw_material_id, lot_number, quantity, unit_cost_cents,
            expiry_date, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&lot.id)
    .bind(&lot.raw_material_id)
    .bind(&lot.lot_number)
    .bind(lot.quantity)
    .bind(lot.unit_cost_cents)
    .bind(lot.expiry_date)
    .bind(lot.created_at)
    .bind(lot.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Guarded signed change on a lot. `None` when it would go negative.
pub(crate) async fn apply_lot_change(
    conn: &mut SqliteConnection,
    id: &str,
    change: i64,
) -> DbResult<Option<i64>> {
    let new_quantity: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE raw_material_lots SET
            quantity = quantity + ?2,
            updated_at = ?3
        WHERE id = ?1 AND quantity + ?2 >= 0
        RETURNING quantity
        "#,
    )
    .bind(id)
    .bind(change)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(new_quantity)
}

pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &RawMaterialMovement,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO raw_material_movements (id, lot_id, direction, quantity, reference, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.lot_id)
    .bind(movement.direction)
    .bind(movement.quantity)
    .bind(&movement.reference)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Loads a lot or fails with NotFound.
pub(crate) async fn fetch_lot_required(conn: &mut SqliteConnection, id: &str) -> DbResult<RawMaterialLot> {
    fetch_lot(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Raw material lot", id))
}
