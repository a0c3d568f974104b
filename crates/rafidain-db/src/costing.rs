//! # Costing Engine
//!
//! Maintains the per-variant weighted-average unit cost (USD).
//!
//! ## The Weighted Average
//! ```text
//! on-hand 10 @ avg $5.00   +   receive 10 @ $7.00
//!                  │
//!                  ▼
//! new avg = (10 × 5.00 + 10 × 7.00) / (10 + 10) = $6.00
//!
//! on-hand 0 (or negative)  +  receive N @ cost  →  new avg = cost
//! ```
//!
//! Ordering matters: [`record_receipt`] must run BEFORE the matching
//! stock delta so the blend uses the pre-receipt on-hand quantity.
//! Running it after would count the received units twice.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

/// Blends a receipt into the variant's average cost and overwrites its
/// last purchase cost. Returns the new average.
///
/// The on-hand quantity is the variant's total across all branches:
/// `avg_cost_usd` is a per-variant figure, so the blend has to weigh
/// every unit the business holds, wherever it sits.
pub async fn record_receipt(
    conn: &mut SqliteConnection,
    variant_id: &str,
    quantity: i64,
    unit_cost_usd: f64,
) -> LedgerResult<f64> {
    let current_avg: Option<f64> =
        sqlx::query_scalar("SELECT avg_cost_usd FROM variants WHERE id = ?1")
            .bind(variant_id)
            .fetch_optional(&mut *conn)
            .await?;
    let current_avg = current_avg.ok_or_else(|| LedgerError::not_found("Variant", variant_id))?;

    let on_hand: Option<i64> =
        sqlx::query_scalar("SELECT SUM(quantity) FROM stock_levels WHERE variant_id = ?1")
            .bind(variant_id)
            .fetch_one(&mut *conn)
            .await?;
    let on_hand = on_hand.unwrap_or(0);

    let new_avg = if on_hand > 0 {
        (on_hand as f64 * current_avg + quantity as f64 * unit_cost_usd)
            / (on_hand + quantity) as f64
    } else {
        unit_cost_usd
    };

    debug!(
        variant_id,
        on_hand, quantity, unit_cost_usd, new_avg, "Recording receipt cost"
    );

    sqlx::query(
        r#"
        UPDATE variants
        SET avg_cost_usd = ?2, last_purchase_cost_usd = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(variant_id)
    .bind(new_avg)
    .bind(unit_cost_usd)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(new_avg)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_branch, seed_variant, test_db};
    use rafidain_core::AdjustmentReason;

    #[tokio::test]
    async fn first_receipt_sets_average_to_cost() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;
        seed_variant(&db, "v1", 0.0).await;

        let mut conn = db.pool().acquire().await.unwrap();
        let avg = record_receipt(&mut conn, "v1", 10, 5.0).await.unwrap();
        assert_eq!(avg, 5.0);
        drop(conn);

        let variant = db.variants().get("v1").await.unwrap().unwrap();
        assert_eq!(variant.avg_cost_usd, 5.0);
        assert_eq!(variant.last_purchase_cost_usd, 5.0);
    }

    #[tokio::test]
    async fn second_receipt_blends_by_quantity() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;
        seed_variant(&db, "v1", 0.0).await;

        let mut conn = db.pool().acquire().await.unwrap();
        record_receipt(&mut conn, "v1", 10, 5.0).await.unwrap();
        drop(conn);

        // Put the 10 units on hand, then receive 10 more at 7
        db.stock()
            .apply_delta("v1", "b1", 10, AdjustmentReason::PurchaseOrder, None, None)
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let avg = record_receipt(&mut conn, "v1", 10, 7.0).await.unwrap();
        assert_eq!(avg, 6.0); // (10*5 + 10*7) / 20
        drop(conn);

        let variant = db.variants().get("v1").await.unwrap().unwrap();
        assert_eq!(variant.avg_cost_usd, 6.0);
        assert_eq!(variant.last_purchase_cost_usd, 7.0);
    }

    #[tokio::test]
    async fn receipt_with_no_stock_replaces_average() {
        let db = test_db().await;
        seed_branch(&db, "b1").await;
        seed_variant(&db, "v1", 9.5).await;

        // avg was 9.5 but nothing is on hand: new shipment defines cost
        let mut conn = db.pool().acquire().await.unwrap();
        let avg = record_receipt(&mut conn, "v1", 4, 3.25).await.unwrap();
        assert_eq!(avg, 3.25);
    }

    #[tokio::test]
    async fn unknown_variant_errors() {
        let db = test_db().await;

        let mut conn = db.pool().acquire().await.unwrap();
        let err = record_receipt(&mut conn, "nope", 1, 1.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }
}
