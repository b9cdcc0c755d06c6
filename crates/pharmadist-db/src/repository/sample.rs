//! # Sample Repository
//!
//! Persistence for sample issues and their lines.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use pharmadist_core::{Sample, SampleLine, SampleStatus};

const SELECT_SAMPLE: &str = r#"
    SELECT id, sample_number, recipient, status, affects_inventory,
           notes, is_deleted, created_at, updated_at
    FROM samples
"#;

/// Repository for sample reads.
#[derive(Debug, Clone)]
pub struct SampleRepository {
    pool: SqlitePool,
}

impl SampleRepository {
    /// Creates a new SampleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SampleRepository { pool }
    }

    /// Gets a sample by ID, including trashed ones.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sample>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn get_lines(&self, sample_id: &str) -> DbResult<Vec<SampleLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lines(&mut conn, sample_id).await
    }

    /// Non-deleted samples, newest first.
    pub async fn list(&self, limit: i64) -> DbResult<Vec<Sample>> {
        let sql = format!(
            "{SELECT_SAMPLE} WHERE is_deleted = 0 ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        );
        let samples = sqlx::query_as::<_, Sample>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(samples)
    }
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sample>> {
    let sql = format!("{SELECT_SAMPLE} WHERE id = ?1");
    let sample = sqlx::query_as::<_, Sample>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sample)
}

pub(crate) async fn fetch_lines(
    conn: &mut SqliteConnection,
    sample_id: &str,
) -> DbResult<Vec<SampleLine>> {
    let lines = sqlx::query_as::<_, SampleLine>(
        r#"
        SELECT id, sample_id, product_id, batch_id, quantity, created_at
        FROM sample_lines
        WHERE sample_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(sample_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

pub(crate) async fn insert(conn: &mut SqliteConnection, sample: &Sample) -> DbResult<()> {
    debug!(id = %sample.id, sample_number = %sample.sample_number, "Inserting sample");

    sqlx::query(
        r#"
        INSERT INTO samples (
            id, sample_number, recipient, status, affects_inventory,
            notes, is_deleted, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&sample.id)
    .bind(&sample.sample_number)
    .bind(&sample.recipient)
    .bind(sample.status)
    .bind(sample.affects_inventory)
    .bind(&sample.notes)
    .bind(sample.is_deleted)
    .bind(sample.created_at)
    .bind(sample.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn insert_line(conn: &mut SqliteConnection, line: &SampleLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sample_lines (id, sample_id, product_id, batch_id, quantity, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&line.id)
    .bind(&line.sample_id)
    .bind(&line.product_id)
    .bind(&line.batch_id)
    .bind(line.quantity)
    .bind(line.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Sets status and trash flag together.
pub(crate) async fn update_state(
    conn: &mut SqliteConnection,
    id: &str,
    status: SampleStatus,
    deleted: bool,
) -> DbResult<()> {
    sqlx::query("UPDATE samples SET status = ?2, is_deleted = ?3, updated_at = ?4 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .bind(deleted)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    Ok(())
}
