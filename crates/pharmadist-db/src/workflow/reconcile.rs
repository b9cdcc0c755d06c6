//! # Reconciliation
//!
//! Health check for the cached `batches.quantity` projection: every batch
//! must hold exactly the sum of its ledger entries. An empty report means
//! the store is consistent.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{batch, ledger};
use pharmadist_core::stock::check_balance;
use pharmadist_core::BalanceMismatch;

#[derive(Debug, Clone)]
pub struct Reconciler {
    pool: SqlitePool,
}

impl Reconciler {
    pub fn new(pool: SqlitePool) -> Self {
        Reconciler { pool }
    }

    /// Compares one batch against its ledger.
    pub async fn reconcile_batch(&self, batch_id: &str) -> DbResult<Option<BalanceMismatch>> {
        let mut conn = self.pool.acquire().await?;

        let cached = batch::fetch(&mut conn, batch_id)
            .await?
            .ok_or_else(|| DbError::not_found("Batch", batch_id))?;
        let ledger_quantity = ledger::balance(&mut conn, batch_id).await?;

        let mismatch = check_balance(batch_id, cached.quantity, ledger_quantity);
        if let Some(found) = &mismatch {
            warn!(
                batch_id,
                cached = found.cached_quantity,
                ledger = found.ledger_quantity,
                drift = found.drift(),
                "Batch quantity does not match ledger"
            );
        }
        Ok(mismatch)
    }

    /// Every batch whose cached quantity disagrees with its ledger,
    /// soft-deleted batches included.
    pub async fn reconcile_all(&self) -> DbResult<Vec<BalanceMismatch>> {
        let mut conn = self.pool.acquire().await?;
        let balances = ledger::all_balances(&mut conn).await?;
        let checked = balances.len();

        let mismatches: Vec<BalanceMismatch> = balances
            .into_iter()
            .filter_map(|b| check_balance(&b.batch_id, b.cached_quantity, b.ledger_quantity))
            .collect();

        for found in &mismatches {
            warn!(
                batch_id = %found.batch_id,
                cached = found.cached_quantity,
                ledger = found.ledger_quantity,
                "Batch quantity does not match ledger"
            );
        }
        info!(checked, mismatches = mismatches.len(), "Reconciliation finished");

        Ok(mismatches)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
