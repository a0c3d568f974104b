//! # Return/Exchange Processor
//!
//! Creates a return header with its lines, where each line carries a
//! direction that decides the stock sign and the money treatment.
//!
//! ## Direction Rules
//! ```text
//! ┌──────────────┬────────────┬───────────┬──────────────────────────┐
//! │ direction    │ stock      │ refunded? │ counted in return cost?  │
//! ├──────────────┼────────────┼───────────┼──────────────────────────┤
//! │ return       │ +|qty|     │ yes       │ yes                      │
//! │ exchange_out │ +|qty|     │ yes       │ yes                      │
//! │ exchange_in  │ -|qty|     │ no        │ no                       │
//! └──────────────┴────────────┴───────────┴──────────────────────────┘
//! ```
//!
//! Cost accounting per line: the originating sale line's frozen
//! `unit_cost_at_sale_iqd` when the line references one, otherwise the
//! variant's current average cost converted at the current exchange
//! rate. The header's `cost_iqd` is written once, after all lines, in
//! the same transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use rafidain_core::money::{default_refund_iqd, usd_to_iqd};
use rafidain_core::validation::validate_new_return;
use rafidain_core::{AdjustmentReason, NewReturn, Return, ReturnDirection, ReturnItem};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::sale::fetch_return_items;
use crate::rate::ExchangeRateOracle;
use crate::stock;

/// Processor for returns and exchanges.
#[derive(Debug, Clone)]
pub struct ReturnProcessor {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    rates: ExchangeRateOracle,
}

impl ReturnProcessor {
    pub fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>, rates: ExchangeRateOracle) -> Self {
        ReturnProcessor {
            pool,
            write_lock,
            rates,
        }
    }

    /// Creates a return with its lines, stock deltas and cost figure in
    /// one atomic unit.
    pub async fn create(&self, new: NewReturn) -> LedgerResult<Return> {
        validate_new_return(&new)?;

        // The rate is only needed when a costed line has no sale-line
        // snapshot to fall back on; fetched before BEGIN either way it
        // is needed at all (single connection, see pool module).
        let needs_rate = new
            .items
            .iter()
            .any(|i| i.direction != ReturnDirection::ExchangeIn && i.sale_item_id.is_none());
        let rate = if needs_rate {
            Some(self.rates.current(false).await?.rate)
        } else {
            None
        };

        let refund = new
            .refund_iqd
            .unwrap_or_else(|| default_refund_iqd(&new.items));

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let return_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let header = Return {
            id: return_id.clone(),
            sale_id: new.sale_id.clone(),
            branch_id: new.branch_id.clone(),
            processed_by: new.processed_by.clone(),
            kind: new.kind,
            refund_iqd: refund,
            cost_iqd: 0,
            note: new.note.clone(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO returns (id, sale_id, branch_id, processed_by, kind,
                                 refund_iqd, cost_iqd, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)
            "#,
        )
        .bind(&header.id)
        .bind(&header.sale_id)
        .bind(&header.branch_id)
        .bind(&header.processed_by)
        .bind(header.kind)
        .bind(header.refund_iqd)
        .bind(&header.note)
        .bind(header.created_at)
        .execute(&mut *tx)
        .await?;

        let mut accumulated_cost: i64 = 0;
        for item in &new.items {
            let quantity = item.quantity.abs();
            let line = ReturnItem {
                id: Uuid::new_v4().to_string(),
                return_id: return_id.clone(),
                sale_item_id: item.sale_item_id.clone(),
                variant_id: item.variant_id.clone(),
                quantity,
                amount_iqd: item.amount_iqd,
                direction: item.direction,
                created_at: now,
            };

            insert_return_item(&mut tx, &line).await?;

            let reason = match item.direction {
                ReturnDirection::Return => AdjustmentReason::Return,
                ReturnDirection::ExchangeOut | ReturnDirection::ExchangeIn => {
                    AdjustmentReason::Exchange
                }
            };
            stock::apply_delta(
                &mut tx,
                &line.variant_id,
                &header.branch_id,
                item.direction.stock_sign() * quantity,
                reason,
                None,
                Some(&header.processed_by),
            )
            .await?;

            // Exchange-in legs are new merchandise going out, not cost
            // coming back
            if item.direction != ReturnDirection::ExchangeIn {
                accumulated_cost += line_cost(&mut tx, &line, rate).await? * quantity;
            }
        }

        // Single cost write after all lines, same atomic unit
        sqlx::query("UPDATE returns SET cost_iqd = ?2 WHERE id = ?1")
            .bind(&return_id)
            .bind(accumulated_cost)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            return_id = %return_id,
            refund = refund,
            cost = accumulated_cost,
            items = new.items.len(),
            "Return processed"
        );

        Ok(Return {
            cost_iqd: accumulated_cost,
            ..header
        })
    }

    /// Fetches a return header.
    pub async fn get(&self, return_id: &str) -> LedgerResult<Option<Return>> {
        let ret = sqlx::query_as::<_, Return>(
            r#"
            SELECT id, sale_id, branch_id, processed_by, kind, refund_iqd, cost_iqd,
                   note, created_at
            FROM returns
            WHERE id = ?1
            "#,
        )
        .bind(return_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ret)
    }

    /// Fetches a return's lines, oldest first.
    pub async fn items(&self, return_id: &str) -> LedgerResult<Vec<ReturnItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_return_items(&mut conn, return_id).await
    }

    /// All returns filed against a sale header.
    pub async fn for_sale(&self, sale_id: &str) -> LedgerResult<Vec<Return>> {
        let returns = sqlx::query_as::<_, Return>(
            r#"
            SELECT id, sale_id, branch_id, processed_by, kind, refund_iqd, cost_iqd,
                   note, created_at
            FROM returns
            WHERE sale_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(returns)
    }
}

/// Per-unit cost of a return line.
///
/// Prefers the originating sale line's frozen cost; falls back to the
/// variant's current average converted at the rate fetched before the
/// transaction opened.
async fn line_cost(
    conn: &mut SqliteConnection,
    line: &ReturnItem,
    rate: Option<f64>,
) -> LedgerResult<i64> {
    if let Some(sale_item_id) = &line.sale_item_id {
        let cost: Option<i64> =
            sqlx::query_scalar("SELECT unit_cost_at_sale_iqd FROM sale_items WHERE id = ?1")
                .bind(sale_item_id)
                .fetch_optional(&mut *conn)
                .await?;
        return cost.ok_or_else(|| LedgerError::not_found("SaleItem", sale_item_id.clone()));
    }

    let avg_cost_usd: Option<f64> =
        sqlx::query_scalar("SELECT avg_cost_usd FROM variants WHERE id = ?1")
            .bind(&line.variant_id)
            .fetch_optional(&mut *conn)
            .await?;
    let avg_cost_usd =
        avg_cost_usd.ok_or_else(|| LedgerError::not_found("Variant", line.variant_id.clone()))?;

    // `rate` is always Some here: needs_rate covered this line
    let rate = rate.ok_or_else(|| LedgerError::not_found("ExchangeRate", "current"))?;
    Ok(usd_to_iqd(avg_cost_usd, rate))
}

async fn insert_return_item(conn: &mut SqliteConnection, item: &ReturnItem) -> LedgerResult<()> {
    debug!(return_id = %item.return_id, variant_id = %item.variant_id, direction = ?item.direction, "Adding return line");

    sqlx::query(
        r#"
        INSERT INTO return_items (id, return_id, sale_item_id, variant_id, quantity,
                                  amount_iqd, direction, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&item.id)
    .bind(&item.return_id)
    .bind(&item.sale_item_id)
    .bind(&item.variant_id)
    .bind(item.quantity)
    .bind(item.amount_iqd)
    .bind(item.direction)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{return_item, return_with_items, sale_item, sale_with_items, seed_all, test_db};
    use rafidain_core::ReturnKind;

    #[tokio::test]
    async fn return_direction_increases_stock() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let ret = db
            .returns()
            .create(return_with_items(vec![return_item(
                "v1",
                2,
                10_000,
                ReturnDirection::Return,
            )]))
            .await
            .unwrap();

        assert_eq!(db.stock().quantity("v1", "b1").await.unwrap(), 2);
        assert_eq!(ret.refund_iqd, 10_000);
        // No sale line referenced: cost falls back to avg $4 x 1500 x 2
        assert_eq!(ret.cost_iqd, 12_000);
    }

    #[tokio::test]
    async fn exchange_in_decreases_stock_and_is_not_refunded() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let ret = db
            .returns()
            .create(return_with_items(vec![
                return_item("v1", 2, 20_000, ReturnDirection::ExchangeOut),
                return_item("v1", 1, 30_000, ReturnDirection::ExchangeIn),
            ]))
            .await
            .unwrap();

        // +2 out, -1 in
        assert_eq!(db.stock().quantity("v1", "b1").await.unwrap(), 1);
        // Refund excludes the exchange-in amount
        assert_eq!(ret.refund_iqd, 20_000);
        // Cost excludes the exchange-in leg: 2 x 6,000
        assert_eq!(ret.cost_iqd, 12_000);

        let items = db.returns().items(&ret.id).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn explicit_refund_overrides_default() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let mut new = return_with_items(vec![return_item(
            "v1",
            1,
            10_000,
            ReturnDirection::Return,
        )]);
        new.refund_iqd = Some(7_500);
        let ret = db.returns().create(new).await.unwrap();

        assert_eq!(ret.refund_iqd, 7_500);
    }

    #[tokio::test]
    async fn sale_line_cost_snapshot_beats_current_average() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;
        db.stock()
            .apply_delta("v1", "b1", 10, AdjustmentReason::Manual, None, None)
            .await
            .unwrap();

        // Sell at cost snapshot 6,000/unit
        let sale = db
            .sales()
            .create(sale_with_items(vec![sale_item("v1", 2, 15_000)]))
            .await
            .unwrap();
        let sale_line = &db.sales().items(&sale.id).await.unwrap()[0];

        // Cost basis moves after the sale; the return must not care
        db.exchange_rates().update(9_999.0, None, None).await.unwrap();

        let mut item = return_item("v1", 1, 15_000, ReturnDirection::Return);
        item.sale_item_id = Some(sale_line.id.clone());
        let mut new = return_with_items(vec![item]);
        new.sale_id = Some(sale.id.clone());
        let ret = db.returns().create(new).await.unwrap();

        assert_eq!(ret.cost_iqd, 6_000);
        assert_eq!(db.returns().for_sale(&sale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_item_list_is_rejected() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let err = db
            .returns()
            .create(return_with_items(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn exchange_kind_is_persisted() {
        let db = test_db().await;
        seed_all(&db, 4.0, 1500.0).await;

        let mut new = return_with_items(vec![
            return_item("v1", 1, 20_000, ReturnDirection::ExchangeOut),
            return_item("v1", 1, 25_000, ReturnDirection::ExchangeIn),
        ]);
        new.kind = ReturnKind::Exchange;
        let ret = db.returns().create(new).await.unwrap();

        let fetched = db.returns().get(&ret.id).await.unwrap().unwrap();
        assert_eq!(fetched.kind, ReturnKind::Exchange);
    }
}
