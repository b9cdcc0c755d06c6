//! # Database Pool Management
//!
//! Connection pool creation and the [`Database`] handle that hands out
//! repositories and workflows.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  AppConfig::load(..)?.to_db_config()                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations             │
//! │       │                                                                 │
//! │       ├──► db.batches() / db.ledger() / db.invoices() ...  (reads)      │
//! │       │                                                                 │
//! │       └──► db.invoice_workflow() / db.sample_workflow() ...             │
//! │                 │                                                       │
//! │                 │ pool.begin() per call, StockEngine inside             │
//! │                 ▼                                                       │
//! │  ┌─────────────────────────────────────────┐                            │
//! │  │            SqlitePool (WAL)              │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐         │  one writer at a time,    │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...     │  readers never blocked    │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘         │                           │
//! │  └─────────────────────────────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{
    AdjustmentRepository, AuditRepository, BatchRepository, InvoiceRepository, LedgerRepository,
    PaymentRepository, ProductRepository, RawMaterialRepository, SampleRepository,
};
use crate::workflow::{
    AdjustmentWorkflow, InvoiceWorkflow, PaymentWorkflow, RawMaterialWorkflow, Reconciler,
    SampleWorkflow, StockEngine, StockService,
};
use pharmadist_core::LOW_STOCK_THRESHOLD;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/pharmadist/pharmadist.db")
///     .max_connections(5)
///     .low_stock_threshold(100);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Remaining quantity at or below which a deduction raises a
    /// low-stock advisory.
    /// Default: 50
    pub low_stock_threshold: i64,
}

impl DbConfig {
    /// Creates a new database configuration with the given path. The file
    /// is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
            low_stock_threshold: LOW_STOCK_THRESHOLD,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    /// Creates an isolated in-memory database configuration (for tests).
    ///
    /// A single connection: every workflow transaction and every read
    /// share it, so tests never open a second connection while a
    /// transaction is in flight.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
            low_stock_threshold: LOW_STOCK_THRESHOLD,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository and workflow access.
///
/// Cheap to clone: the pool is reference counted.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    engine: StockEngine,
}

impl Database {
    /// Creates the connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            low_stock_threshold = config.low_stock_threshold,
            "Database pool created"
        );

        let db = Database {
            pool,
            engine: StockEngine::new(config.low_stock_threshold),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Raw pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.engine.low_stock_threshold()
    }

    // -------------------------------------------------------------------------
    // Repositories
    // -------------------------------------------------------------------------

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn batches(&self) -> BatchRepository {
        BatchRepository::new(self.pool.clone())
    }

    pub fn ledger(&self) -> LedgerRepository {
        LedgerRepository::new(self.pool.clone())
    }

    pub fn invoices(&self) -> InvoiceRepository {
        InvoiceRepository::new(self.pool.clone())
    }

    pub fn samples(&self) -> SampleRepository {
        SampleRepository::new(self.pool.clone())
    }

    pub fn adjustments(&self) -> AdjustmentRepository {
        AdjustmentRepository::new(self.pool.clone())
    }

    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository::new(self.pool.clone())
    }

    pub fn audit_log(&self) -> AuditRepository {
        AuditRepository::new(self.pool.clone())
    }

    pub fn raw_materials(&self) -> RawMaterialRepository {
        RawMaterialRepository::new(self.pool.clone())
    }

    // -------------------------------------------------------------------------
    // Workflows
    // -------------------------------------------------------------------------

    /// Single-call stock mutations (receipts, manual deduct/restore).
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mutation = db.stock().deduct(&batch_id, LineQuantity::new(3, 2), "INV-20260131-0001").await?;
    /// if let Some(advisory) = mutation.advisory { /* show warning */ }
    /// ```
    pub fn stock(&self) -> StockService {
        StockService::new(self.pool.clone(), self.engine)
    }

    pub fn invoice_workflow(&self) -> InvoiceWorkflow {
        InvoiceWorkflow::new(self.pool.clone(), self.engine)
    }

    pub fn sample_workflow(&self) -> SampleWorkflow {
        SampleWorkflow::new(self.pool.clone(), self.engine)
    }

    pub fn adjustment_workflow(&self) -> AdjustmentWorkflow {
        AdjustmentWorkflow::new(self.pool.clone(), self.engine)
    }

    pub fn payment_workflow(&self) -> PaymentWorkflow {
        PaymentWorkflow::new(self.pool.clone())
    }

    pub fn raw_material_workflow(&self) -> RawMaterialWorkflow {
        RawMaterialWorkflow::new(self.pool.clone())
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.pool.clone())
    }

    /// Closes the pool. Every later operation fails.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// True when the database answers a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert_eq!(db.low_stock_threshold(), 50);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/pharmadist-test.db")
            .max_connections(10)
            .min_connections(2)
            .low_stock_threshold(120);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.low_stock_threshold, 120);
        assert!(config.run_migrations);
    }

    #[tokio::test]
    async fn test_threshold_reaches_engine() {
        let db = Database::new(DbConfig::in_memory().low_stock_threshold(5))
            .await
            .unwrap();

        assert_eq!(db.low_stock_threshold(), 5);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
    }
}
