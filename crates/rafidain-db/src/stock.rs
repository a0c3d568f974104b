//! # Stock Ledger
//!
//! Authoritative per-(variant, branch) quantity, mutated only through
//! signed deltas. Every delta is permanently recorded as an immutable
//! adjustment row carrying a reason code.
//!
//! ## The Delta Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  ❌ WRONG: absolute write (loses the audit trail)                   │
//! │     UPDATE stock_levels SET quantity = 7 WHERE ...                  │
//! │                                                                     │
//! │  ✅ CORRECT: signed delta + audit row, same transaction             │
//! │     UPDATE stock_levels SET quantity = quantity - 3 WHERE ...       │
//! │     INSERT INTO inventory_adjustments (delta_quantity = -3, ...)    │
//! │                                                                     │
//! │  Invariant: quantity == SUM(delta_quantity) for every key           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The module-level functions take `&mut SqliteConnection` so that the
//! transaction processors can compose them inside their own BEGIN..COMMIT
//! span. [`StockRepository`] wraps them for standalone use.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use rafidain_core::{AdjustmentReason, InventoryAdjustment, StockLevel};

use crate::error::LedgerResult;

/// Creates the stock row for a (variant, branch) pair at quantity zero.
/// Idempotent: an existing row is left untouched.
pub async fn ensure_row(
    conn: &mut SqliteConnection,
    variant_id: &str,
    branch_id: &str,
) -> LedgerResult<()> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO stock_levels (variant_id, branch_id, quantity, low_stock_threshold, created_at, updated_at)
        VALUES (?1, ?2, 0, 0, ?3, ?3)
        ON CONFLICT (variant_id, branch_id) DO NOTHING
        "#,
    )
    .bind(variant_id)
    .bind(branch_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Applies a signed delta to a stock level and appends the audit row.
///
/// Both writes happen on the caller's connection, so inside a processor
/// transaction they commit or roll back with everything else.
///
/// The resulting quantity is deliberately NOT checked for negativity.
/// Overselling is a till-side business decision; the ledger records what
/// happened and leaves the policy to the caller.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    variant_id: &str,
    branch_id: &str,
    delta: i64,
    reason: AdjustmentReason,
    note: Option<&str>,
    actor: Option<&str>,
) -> LedgerResult<InventoryAdjustment> {
    debug!(variant_id, branch_id, delta, ?reason, "Applying stock delta");

    ensure_row(&mut *conn, variant_id, branch_id).await?;

    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE stock_levels
        SET quantity = quantity + ?3, updated_at = ?4
        WHERE variant_id = ?1 AND branch_id = ?2
        "#,
    )
    .bind(variant_id)
    .bind(branch_id)
    .bind(delta)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let adjustment = InventoryAdjustment {
        id: Uuid::new_v4().to_string(),
        variant_id: variant_id.to_string(),
        branch_id: branch_id.to_string(),
        delta_quantity: delta,
        reason,
        note: note.map(str::to_string),
        actor: actor.map(str::to_string),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO inventory_adjustments (id, variant_id, branch_id, delta_quantity, reason, note, actor, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&adjustment.id)
    .bind(&adjustment.variant_id)
    .bind(&adjustment.branch_id)
    .bind(adjustment.delta_quantity)
    .bind(adjustment.reason)
    .bind(&adjustment.note)
    .bind(&adjustment.actor)
    .bind(adjustment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(adjustment)
}

// =============================================================================
// Repository
// =============================================================================

/// A key whose live quantity no longer matches its adjustment history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDrift {
    pub variant_id: String,
    pub branch_id: String,
    pub quantity: i64,
    pub adjustment_sum: i64,
}

/// Pool-level stock operations: the standalone delta entry point and the
/// read/reconciliation side.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl StockRepository {
    pub fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>) -> Self {
        StockRepository { pool, write_lock }
    }

    /// Standalone delta application (manual adjustments, recounts).
    ///
    /// Takes the write lock and runs its own transaction so the quantity
    /// update and audit insert land atomically.
    pub async fn apply_delta(
        &self,
        variant_id: &str,
        branch_id: &str,
        delta: i64,
        reason: AdjustmentReason,
        note: Option<&str>,
        actor: Option<&str>,
    ) -> LedgerResult<InventoryAdjustment> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let adjustment =
            apply_delta(&mut tx, variant_id, branch_id, delta, reason, note, actor).await?;

        tx.commit().await?;
        Ok(adjustment)
    }

    /// Current level for a key, if the row has been touched.
    pub async fn level(
        &self,
        variant_id: &str,
        branch_id: &str,
    ) -> LedgerResult<Option<StockLevel>> {
        let level = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT variant_id, branch_id, quantity, low_stock_threshold, created_at, updated_at
            FROM stock_levels
            WHERE variant_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(variant_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(level)
    }

    /// Live quantity for a key; zero when the row was never created.
    pub async fn quantity(&self, variant_id: &str, branch_id: &str) -> LedgerResult<i64> {
        Ok(self
            .level(variant_id, branch_id)
            .await?
            .map(|l| l.quantity)
            .unwrap_or(0))
    }

    /// Full adjustment history for a key, oldest first.
    pub async fn adjustments(
        &self,
        variant_id: &str,
        branch_id: &str,
    ) -> LedgerResult<Vec<InventoryAdjustment>> {
        let rows = sqlx::query_as::<_, InventoryAdjustment>(
            r#"
            SELECT id, variant_id, branch_id, delta_quantity, reason, note, actor, created_at
            FROM inventory_adjustments
            WHERE variant_id = ?1 AND branch_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(variant_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Sum of all recorded deltas for a key.
    pub async fn adjustment_sum(&self, variant_id: &str, branch_id: &str) -> LedgerResult<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(delta_quantity)
            FROM inventory_adjustments
            WHERE variant_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(variant_id)
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum.unwrap_or(0))
    }

    /// Reconciliation sweep: every key where the live quantity disagrees
    /// with the sum of its adjustments. Empty means the books balance.
    ///
    /// The adjustment history is the source of truth; a non-empty result
    /// indicates a write that bypassed the ledger.
    pub async fn check_consistency(&self) -> LedgerResult<Vec<StockDrift>> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                sl.variant_id,
                sl.branch_id,
                sl.quantity,
                COALESCE((
                    SELECT SUM(ia.delta_quantity)
                    FROM inventory_adjustments ia
                    WHERE ia.variant_id = sl.variant_id AND ia.branch_id = sl.branch_id
                ), 0) AS adjustment_sum
            FROM stock_levels sl
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, _, quantity, sum)| quantity != sum)
            .map(|(variant_id, branch_id, quantity, adjustment_sum)| StockDrift {
                variant_id,
                branch_id,
                quantity,
                adjustment_sum,
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, LedgerError};
    use crate::testutil::{seed_branch, seed_variant, test_db};

    #[tokio::test]
    async fn apply_delta_creates_row_lazily() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;
        seed_variant(&db, "v1", 0.0).await;

        let stock = db.stock();
        assert!(stock.level("v1", "b1").await.unwrap().is_none());

        stock
            .apply_delta("v1", "b1", 5, AdjustmentReason::Manual, None, Some("tester"))
            .await
            .unwrap();

        assert_eq!(stock.quantity("v1", "b1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn deltas_accumulate_and_audit_rows_match() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;
        seed_variant(&db, "v1", 0.0).await;

        let stock = db.stock();
        stock
            .apply_delta("v1", "b1", 10, AdjustmentReason::PurchaseOrder, None, None)
            .await
            .unwrap();
        stock
            .apply_delta("v1", "b1", -3, AdjustmentReason::Sale, None, None)
            .await
            .unwrap();
        stock
            .apply_delta("v1", "b1", 1, AdjustmentReason::Return, None, None)
            .await
            .unwrap();

        assert_eq!(stock.quantity("v1", "b1").await.unwrap(), 8);
        assert_eq!(stock.adjustment_sum("v1", "b1").await.unwrap(), 8);

        let history = stock.adjustments("v1", "b1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].reason, AdjustmentReason::Sale);
        assert_eq!(history[1].delta_quantity, -3);
    }

    #[tokio::test]
    async fn oversell_is_permitted() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;
        seed_variant(&db, "v1", 0.0).await;

        // Quantity goes negative without complaint: policy, not oversight
        db.stock()
            .apply_delta("v1", "b1", -4, AdjustmentReason::Sale, None, None)
            .await
            .unwrap();

        assert_eq!(db.stock().quantity("v1", "b1").await.unwrap(), -4);
    }

    #[tokio::test]
    async fn unknown_variant_is_a_referential_error() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;

        let err = db
            .stock()
            .apply_delta("missing", "b1", 1, AdjustmentReason::Manual, None, None)
            .await
            .unwrap_err();
        // FK violation surfaces as a classified storage error; nothing
        // was written
        assert!(matches!(
            err,
            LedgerError::Db(DbError::ForeignKeyViolation { .. })
        ));
        assert!(db.stock().level("missing", "b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn consistency_check_detects_bypassing_writes() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;
        seed_variant(&db, "v1", 0.0).await;

        db.stock()
            .apply_delta("v1", "b1", 7, AdjustmentReason::Manual, None, None)
            .await
            .unwrap();
        assert!(db.stock().check_consistency().await.unwrap().is_empty());

        // Corrupt the live quantity behind the ledger's back
        sqlx::query("UPDATE stock_levels SET quantity = 99 WHERE variant_id = 'v1'")
            .execute(db.pool())
            .await
            .unwrap();

        let drift = db.stock().check_consistency().await.unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].quantity, 99);
        assert_eq!(drift[0].adjustment_sum, 7);
    }
}
