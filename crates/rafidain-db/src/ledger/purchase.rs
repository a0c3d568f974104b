//! # Purchase-Order Processor
//!
//! Orders move through a small state machine:
//!
//! ```text
//! draft ──► ordered ──► received      (terminal)
//!   │          │
//!   └──────────┴──────► cancelled     (terminal)
//! ```
//!
//! Receiving is the only step that touches inventory or costing: each
//! line first feeds the weighted-average engine, then lands as a
//! positive stock delta, in that order inside one transaction. Receiving
//! an already-received order is a no-op success; receiving a cancelled
//! one is an invalid-state error.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use rafidain_core::validation::validate_new_purchase_order;
use rafidain_core::{
    AdjustmentReason, NewPurchaseOrder, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus,
};

use crate::error::{LedgerError, LedgerResult};
use crate::{costing, stock};

const PO_COLUMNS: &str = "id, supplier, branch_id, status, subtotal_usd, subtotal_iqd, \
                          note, ordered_at, received_at, received_by, created_at";

/// Processor for purchase orders and receiving.
#[derive(Debug, Clone)]
pub struct PurchaseOrderProcessor {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl PurchaseOrderProcessor {
    pub fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>) -> Self {
        PurchaseOrderProcessor { pool, write_lock }
    }

    /// Creates a draft order with its lines. No stock or costing effect
    /// until [`receive`](Self::receive).
    pub async fn create(&self, new: NewPurchaseOrder) -> LedgerResult<PurchaseOrder> {
        validate_new_purchase_order(&new)?;

        let subtotal_usd: f64 = new
            .items
            .iter()
            .map(|i| i.unit_cost_usd * i.quantity as f64)
            .sum();
        let subtotal_iqd: i64 = new.items.iter().map(|i| i.unit_cost_iqd * i.quantity).sum();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let order = PurchaseOrder {
            id: Uuid::new_v4().to_string(),
            supplier: new.supplier.clone(),
            branch_id: new.branch_id.clone(),
            status: PurchaseOrderStatus::Draft,
            subtotal_usd,
            subtotal_iqd,
            note: new.note.clone(),
            ordered_at: None,
            received_at: None,
            received_by: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, supplier, branch_id, status, subtotal_usd,
                                         subtotal_iqd, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&order.id)
        .bind(&order.supplier)
        .bind(&order.branch_id)
        .bind(order.status)
        .bind(order.subtotal_usd)
        .bind(order.subtotal_iqd)
        .bind(&order.note)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for item in &new.items {
            debug!(order_id = %order.id, variant_id = %item.variant_id, "Adding purchase order line");
            sqlx::query(
                r#"
                INSERT INTO purchase_order_items (id, purchase_order_id, variant_id,
                                                  quantity, unit_cost_usd, unit_cost_iqd,
                                                  created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&order.id)
            .bind(&item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_cost_usd)
            .bind(item.unit_cost_iqd)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(order_id = %order.id, supplier = %order.supplier, items = new.items.len(), "Purchase order created");

        Ok(order)
    }

    /// Marks a draft order as placed with the supplier.
    pub async fn mark_ordered(&self, order_id: &str) -> LedgerResult<PurchaseOrder> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let order = fetch_order(&mut tx, order_id).await?;
        if order.status != PurchaseOrderStatus::Draft {
            return Err(invalid_status(&order, "mark ordered"));
        }

        let ordered_at = Utc::now();
        sqlx::query("UPDATE purchase_orders SET status = ?2, ordered_at = ?3 WHERE id = ?1")
            .bind(order_id)
            .bind(PurchaseOrderStatus::Ordered)
            .bind(ordered_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(order_id, "Purchase order placed");

        Ok(PurchaseOrder {
            status: PurchaseOrderStatus::Ordered,
            ordered_at: Some(ordered_at),
            ..order
        })
    }

    /// Cancels a draft or placed order. Received orders cannot be
    /// cancelled; their stock is already on the shelf.
    pub async fn cancel(&self, order_id: &str) -> LedgerResult<PurchaseOrder> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let order = fetch_order(&mut tx, order_id).await?;
        match order.status {
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Ordered => {}
            PurchaseOrderStatus::Cancelled => return Ok(order),
            PurchaseOrderStatus::Received => return Err(invalid_status(&order, "cancel")),
        }

        sqlx::query("UPDATE purchase_orders SET status = ?2 WHERE id = ?1")
            .bind(order_id)
            .bind(PurchaseOrderStatus::Cancelled)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(order_id, "Purchase order cancelled");

        Ok(PurchaseOrder {
            status: PurchaseOrderStatus::Cancelled,
            ..order
        })
    }

    /// Receives an order: re-costs every variant, books the stock, and
    /// stamps the order received, atomically.
    ///
    /// Idempotent on received orders. Costing runs before the stock
    /// delta per line so the blend sees the pre-receipt on-hand count.
    pub async fn receive(
        &self,
        order_id: &str,
        received_at: Option<DateTime<Utc>>,
        received_by: Option<&str>,
    ) -> LedgerResult<PurchaseOrder> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let order = fetch_order(&mut tx, order_id).await?;
        match order.status {
            PurchaseOrderStatus::Received => {
                debug!(order_id, "Purchase order already received, no-op");
                return Ok(order);
            }
            PurchaseOrderStatus::Cancelled => return Err(invalid_status(&order, "receive")),
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Ordered => {}
        }

        let items = fetch_order_items(&mut tx, order_id).await?;
        let note = format!("PO {order_id}");
        for item in &items {
            costing::record_receipt(&mut tx, &item.variant_id, item.quantity, item.unit_cost_usd)
                .await?;
            stock::apply_delta(
                &mut tx,
                &item.variant_id,
                &order.branch_id,
                item.quantity,
                AdjustmentReason::PurchaseOrder,
                Some(note.as_str()),
                received_by,
            )
            .await?;
        }

        let received_at = received_at.unwrap_or_else(Utc::now);
        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = ?2, received_at = ?3, received_by = ?4
            WHERE id = ?1
            "#,
        )
        .bind(order_id)
        .bind(PurchaseOrderStatus::Received)
        .bind(received_at)
        .bind(received_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(order_id, items = items.len(), "Purchase order received");

        Ok(PurchaseOrder {
            status: PurchaseOrderStatus::Received,
            received_at: Some(received_at),
            received_by: received_by.map(str::to_string),
            ..order
        })
    }

    /// Fetches an order header.
    pub async fn get(&self, order_id: &str) -> LedgerResult<Option<PurchaseOrder>> {
        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "SELECT {PO_COLUMNS} FROM purchase_orders WHERE id = ?1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Fetches an order's lines, oldest first.
    pub async fn items(&self, order_id: &str) -> LedgerResult<Vec<PurchaseOrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_items(&mut conn, order_id).await
    }
}

fn invalid_status(order: &PurchaseOrder, operation: &str) -> LedgerError {
    LedgerError::InvalidState(format!(
        "cannot {operation} purchase order {} in status {:?}",
        order.id, order.status
    ))
}

async fn fetch_order(conn: &mut SqliteConnection, order_id: &str) -> LedgerResult<PurchaseOrder> {
    let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
        "SELECT {PO_COLUMNS} FROM purchase_orders WHERE id = ?1"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;

    order.ok_or_else(|| LedgerError::not_found("Purchase order", order_id))
}

async fn fetch_order_items(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> LedgerResult<Vec<PurchaseOrderItem>> {
    let items = sqlx::query_as::<_, PurchaseOrderItem>(
        r#"
        SELECT id, purchase_order_id, variant_id, quantity, unit_cost_usd,
               unit_cost_iqd, created_at
        FROM purchase_order_items
        WHERE purchase_order_id = ?1
        ORDER BY created_at, id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{po_item, po_with_items, seed_all, test_db};

    #[tokio::test]
    async fn create_starts_as_draft_with_subtotals() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let po = db
            .purchase_orders()
            .create(po_with_items(vec![po_item("v1", 10, 5.0, 7_500)]))
            .await
            .unwrap();

        assert_eq!(po.status, PurchaseOrderStatus::Draft);
        assert_eq!(po.subtotal_usd, 50.0);
        assert_eq!(po.subtotal_iqd, 75_000);
        // Draft orders leave stock and costing untouched
        assert_eq!(db.stock().quantity("v1", "b1").await.unwrap(), 0);
        assert_eq!(db.purchase_orders().items(&po.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn receive_books_stock_and_recosts() {
        let db = test_db().await;
        seed_all(&db, 5.0, 1500.0).await;
        db.stock()
            .apply_delta("v1", "b1", 10, AdjustmentReason::Manual, None, None)
            .await
            .unwrap();

        let po = db
            .purchase_orders()
            .create(po_with_items(vec![po_item("v1", 10, 6.0, 9_000)]))
            .await
            .unwrap();
        let received = db
            .purchase_orders()
            .receive(&po.id, None, Some("clerk"))
            .await
            .unwrap();

        assert_eq!(received.status, PurchaseOrderStatus::Received);
        assert_eq!(received.received_by.as_deref(), Some("clerk"));
        assert_eq!(db.stock().quantity("v1", "b1").await.unwrap(), 20);

        // 10 @ $5 blended with 10 @ $6 = $5.50
        let avg: f64 = sqlx::query_scalar("SELECT avg_cost_usd FROM variants WHERE id = 'v1'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!((avg - 5.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn receive_twice_is_a_noop() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let po = db
            .purchase_orders()
            .create(po_with_items(vec![po_item("v1", 5, 4.0, 6_000)]))
            .await
            .unwrap();
        db.purchase_orders().receive(&po.id, None, None).await.unwrap();
        let again = db.purchase_orders().receive(&po.id, None, None).await.unwrap();

        assert_eq!(again.status, PurchaseOrderStatus::Received);
        // Stock booked exactly once
        assert_eq!(db.stock().quantity("v1", "b1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn ordered_then_received_flow() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let po = db
            .purchase_orders()
            .create(po_with_items(vec![po_item("v1", 3, 4.0, 6_000)]))
            .await
            .unwrap();
        let placed = db.purchase_orders().mark_ordered(&po.id).await.unwrap();
        assert_eq!(placed.status, PurchaseOrderStatus::Ordered);
        assert!(placed.ordered_at.is_some());

        let received = db.purchase_orders().receive(&po.id, None, None).await.unwrap();
        assert_eq!(received.status, PurchaseOrderStatus::Received);
    }

    #[tokio::test]
    async fn cancelled_orders_cannot_be_received() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let po = db
            .purchase_orders()
            .create(po_with_items(vec![po_item("v1", 3, 4.0, 6_000)]))
            .await
            .unwrap();
        db.purchase_orders().cancel(&po.id).await.unwrap();

        let err = db
            .purchase_orders()
            .receive(&po.id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
        assert_eq!(db.stock().quantity("v1", "b1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn received_orders_cannot_be_cancelled() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let po = db
            .purchase_orders()
            .create(po_with_items(vec![po_item("v1", 2, 4.0, 6_000)]))
            .await
            .unwrap();
        db.purchase_orders().receive(&po.id, None, None).await.unwrap();

        let err = db.purchase_orders().cancel(&po.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn mark_ordered_requires_draft() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let po = db
            .purchase_orders()
            .create(po_with_items(vec![po_item("v1", 2, 4.0, 6_000)]))
            .await
            .unwrap();
        db.purchase_orders().mark_ordered(&po.id).await.unwrap();

        let err = db.purchase_orders().mark_ordered(&po.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn empty_order_is_rejected() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let err = db
            .purchase_orders()
            .create(po_with_items(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
