//! # Product Repository
//!
//! Catalogue CRUD. Prices are changed here; stock never is.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::audit;
use pharmadist_core::validation::{validate_price_cents, validate_product_name};
use pharmadist_core::{AuditAction, CoreError, Product};

const SELECT_PRODUCT: &str = r#"
    SELECT id, name, category, unit,
           cost_price_cents, tp_rate_cents, sales_price_cents,
           is_active, is_deleted, created_at, updated_at
    FROM products
"#;

/// Input for a new catalogue product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub cost_price_cents: i64,
    pub tp_rate_cents: i64,
    pub sales_price_cents: i64,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let product = db.products().create(&new_product).await?;
/// let active = db.products().list_active(50).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product and its CREATE audit row.
    pub async fn create(&self, new: &NewProduct) -> DbResult<Product> {
        validate_product_name(&new.name).map_err(CoreError::from)?;
        for cents in [new.cost_price_cents, new.tp_rate_cents, new.sales_price_cents] {
            validate_price_cents(cents).map_err(CoreError::from)?;
        }

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            category: new.category.clone(),
            unit: new.unit.clone(),
            cost_price_cents: new.cost_price_cents,
            tp_rate_cents: new.tp_rate_cents,
            sales_price_cents: new.sales_price_cents,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, category, unit,
                cost_price_cents, tp_rate_cents, sales_price_cents,
                is_active, is_deleted, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(product.cost_price_cents)
        .bind(product.tp_rate_cents)
        .bind(product.sales_price_cents)
        .bind(product.is_active)
        .bind(product.is_deleted)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            AuditAction::Create,
            "PRODUCT",
            &product.id,
            &product.name,
            json!({ "tp_rate_cents": product.tp_rate_cents }),
        )
        .await?;
        tx.commit().await?;

        Ok(product)
    }

    /// Gets a non-deleted product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lists active, non-deleted products by name.
    pub async fn list_active(&self, limit: i64) -> DbResult<Vec<Product>> {
        let sql = format!(
            "{SELECT_PRODUCT} WHERE is_active = 1 AND is_deleted = 0 ORDER BY name LIMIT ?1"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Updates cost, TP rate and MRP. Existing invoice lines keep their
    /// snapshots.
    pub async fn update_prices(
        &self,
        id: &str,
        cost_price_cents: i64,
        tp_rate_cents: i64,
        sales_price_cents: i64,
    ) -> DbResult<Product> {
        for cents in [cost_price_cents, tp_rate_cents, sales_price_cents] {
            validate_price_cents(cents).map_err(CoreError::from)?;
        }

        let mut tx = self.pool.begin().await?;
        let before = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        sqlx::query(
            r#"
            UPDATE products SET
                cost_price_cents = ?2,
                tp_rate_cents = ?3,
                sales_price_cents = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(cost_price_cents)
        .bind(tp_rate_cents)
        .bind(sales_price_cents)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            AuditAction::Update,
            "PRODUCT",
            id,
            &before.name,
            json!({
                "tp_rate_cents": { "from": before.tp_rate_cents, "to": tp_rate_cents },
                "sales_price_cents": { "from": before.sales_price_cents, "to": sales_price_cents },
                "cost_price_cents": { "from": before.cost_price_cents, "to": cost_price_cents },
            }),
        )
        .await?;

        let product = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;
        tx.commit().await?;

        Ok(product)
    }

    /// Soft-deletes a product. Its batches and ledger stay untouched.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let product = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        sqlx::query("UPDATE products SET is_deleted = 1, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        audit::record(&mut tx, AuditAction::Delete, "PRODUCT", id, &product.name, json!({})).await?;
        tx.commit().await?;

        Ok(())
    }
}

/// Loads a non-deleted product.
pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let sql = format!("{SELECT_PRODUCT} WHERE id = ?1 AND is_deleted = 0");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(product)
}

/// Display name of a product, deleted or not. Used in error messages.
pub(crate) async fn name_of(conn: &mut SqliteConnection, id: &str) -> DbResult<String> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    name.ok_or_else(|| DbError::not_found("Product", id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn napa() -> NewProduct {
        NewProduct {
            name: "Napa 500mg".to_string(),
            category: Some("Analgesic".to_string()),
            unit: "strip".to_string(),
            cost_price_cents: 90,
            tp_rate_cents: 110,
            sales_price_cents: 120,
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let product = repo.create(&napa()).await.unwrap();
        let fetched = repo.get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Napa 500mg");
        assert_eq!(fetched.tp_rate_cents, 110);

        let audit = db.audit_log().list_for_entity("PRODUCT", &product.id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Create);
    }

    #[tokio::test]
    async fn test_rejects_blank_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut input = napa();
        input.name = "  ".to_string();
        let err = db.products().create(&input).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_prices_and_soft_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let product = repo.create(&napa()).await.unwrap();

        let updated = repo.update_prices(&product.id, 95, 115, 125).await.unwrap();
        assert_eq!(updated.tp_rate_cents, 115);

        repo.soft_delete(&product.id).await.unwrap();
        assert!(repo.get_by_id(&product.id).await.unwrap().is_none());
        assert!(repo.list_active(10).await.unwrap().is_empty());
        assert!(repo.soft_delete(&product.id).await.unwrap_err().is_not_found());
    }
}
