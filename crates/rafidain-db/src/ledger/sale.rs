//! # Sale Transaction Processor
//!
//! Creates sales (header + lines + negative stock deltas, one atomic
//! unit) and deletes them (full reversal of every side effect, including
//! any returns that were filed against the sale).
//!
//! ## Snapshot Pattern
//! Each line freezes `unit_cost_at_sale_iqd` from the variant's current
//! average cost converted at the current exchange rate. The sale's
//! `profit_iqd` is computed from those snapshots at creation and never
//! recomputed; later return-cost accounting prefers the snapshots too.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use rafidain_core::money::{line_total_iqd, sale_profit_iqd, sale_subtotal_iqd, usd_to_iqd};
use rafidain_core::validation::validate_new_sale;
use rafidain_core::{AdjustmentReason, NewSale, Return, ReturnItem, Sale, SaleItem, Variant};

use crate::customer;
use crate::error::{LedgerError, LedgerResult};
use crate::rate::ExchangeRateOracle;
use crate::stock;

/// Processor for sale transactions.
#[derive(Debug, Clone)]
pub struct SaleProcessor {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    rates: ExchangeRateOracle,
}

impl SaleProcessor {
    pub fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>, rates: ExchangeRateOracle) -> Self {
        SaleProcessor {
            pool,
            write_lock,
            rates,
        }
    }

    /// Creates a sale with its lines and stock effects in one atomic
    /// unit.
    ///
    /// Validation happens before any mutation; unknown variants roll the
    /// whole transaction back. The customer aggregate update runs after
    /// commit: the sale stands on its own even if the aggregate bump
    /// fails.
    pub async fn create(&self, new: NewSale) -> LedgerResult<Sale> {
        validate_new_sale(&new)?;

        // Rate lookup must precede BEGIN: the one connection cannot
        // serve a pool query while a transaction holds it.
        let rate = self.rates.current(false).await?.rate;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let sale_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        // Resolve variants and freeze per-line cost snapshots
        let mut costed_lines: Vec<(i64, i64)> = Vec::with_capacity(new.items.len());
        let mut lines: Vec<SaleItem> = Vec::with_capacity(new.items.len());
        for item in &new.items {
            let variant = fetch_variant(&mut tx, &item.variant_id).await?;
            let unit_cost = usd_to_iqd(variant.avg_cost_usd, rate);
            costed_lines.push((unit_cost, item.quantity));
            lines.push(SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                variant_id: item.variant_id.clone(),
                quantity: item.quantity,
                unit_price_iqd: item.unit_price_iqd,
                unit_cost_at_sale_iqd: unit_cost,
                line_total_iqd: line_total_iqd(item),
                created_at: now,
            });
        }

        let subtotal = sale_subtotal_iqd(&new.items);
        let total = subtotal - new.discount_iqd;
        let sale = Sale {
            id: sale_id.clone(),
            branch_id: new.branch_id.clone(),
            cashier_id: new.cashier_id.clone(),
            customer_id: new.customer_id.clone(),
            subtotal_iqd: subtotal,
            discount_iqd: new.discount_iqd,
            total_iqd: total,
            profit_iqd: sale_profit_iqd(total, &costed_lines),
            note: new.note.clone(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sales (id, branch_id, cashier_id, customer_id, subtotal_iqd,
                               discount_iqd, total_iqd, profit_iqd, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.branch_id)
        .bind(&sale.cashier_id)
        .bind(&sale.customer_id)
        .bind(sale.subtotal_iqd)
        .bind(sale.discount_iqd)
        .bind(sale.total_iqd)
        .bind(sale.profit_iqd)
        .bind(&sale.note)
        .bind(sale.created_at)
        .execute(&mut *tx)
        .await?;

        for line in &lines {
            insert_sale_item(&mut tx, line).await?;

            stock::apply_delta(
                &mut tx,
                &line.variant_id,
                &sale.branch_id,
                -line.quantity,
                AdjustmentReason::Sale,
                None,
                Some(&sale.cashier_id),
            )
            .await?;
        }

        tx.commit().await?;
        drop(_guard);

        info!(sale_id = %sale.id, total = sale.total_iqd, items = lines.len(), "Sale created");

        // Attributed customers get their lifetime aggregates bumped
        // outside the atomic unit; the sale stands either way.
        if let Some(customer_id) = &sale.customer_id {
            let mut conn = self.pool.acquire().await?;
            customer::record_purchase(&mut conn, customer_id, sale.total_iqd).await?;
        }

        Ok(sale)
    }

    /// Deletes a sale, reversing every side effect inside one atomic
    /// unit:
    ///
    /// 1. every associated return's stock effects are undone and the
    ///    return rows deleted (returns filed against the header or
    ///    against any of its lines)
    /// 2. the sale's own stock is restored (+quantity per line)
    /// 3. customer aggregates are reverted, clamped at zero
    /// 4. lines and header are deleted
    pub async fn delete(&self, sale_id: &str) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let sale = fetch_sale(&mut tx, sale_id).await?;

        let associated = fetch_associated_returns(&mut tx, sale_id).await?;
        for ret in &associated {
            let items = fetch_return_items(&mut tx, &ret.id).await?;
            for item in &items {
                // Undo whatever the return leg did to stock
                let reversal = -item.direction.stock_sign() * item.quantity.abs();
                stock::apply_delta(
                    &mut tx,
                    &item.variant_id,
                    &ret.branch_id,
                    reversal,
                    AdjustmentReason::SaleReversal,
                    Some("sale deleted"),
                    None,
                )
                .await?;
            }
            sqlx::query("DELETE FROM return_items WHERE return_id = ?1")
                .bind(&ret.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM returns WHERE id = ?1")
                .bind(&ret.id)
                .execute(&mut *tx)
                .await?;
        }

        let items = fetch_sale_items(&mut tx, sale_id).await?;
        for item in &items {
            stock::apply_delta(
                &mut tx,
                &item.variant_id,
                &sale.branch_id,
                item.quantity,
                AdjustmentReason::SaleReversal,
                Some("sale deleted"),
                None,
            )
            .await?;
        }

        if let Some(customer_id) = &sale.customer_id {
            customer::revert_purchase(&mut tx, customer_id, sale.total_iqd).await?;
        }

        sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(sale_id, returns_reversed = associated.len(), "Sale deleted");
        Ok(())
    }

    /// Fetches a sale header.
    pub async fn get(&self, sale_id: &str) -> LedgerResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, branch_id, cashier_id, customer_id, subtotal_iqd, discount_iqd,
                   total_iqd, profit_iqd, note, created_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Fetches a sale's lines, oldest first.
    pub async fn items(&self, sale_id: &str) -> LedgerResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale_items(&mut conn, sale_id).await
    }
}

// =============================================================================
// Shared row helpers (used inside and outside transactions)
// =============================================================================

async fn fetch_variant(conn: &mut SqliteConnection, variant_id: &str) -> LedgerResult<Variant> {
    let variant = sqlx::query_as::<_, Variant>(
        r#"
        SELECT id, product_name, sku, size, color, default_price_iqd,
               avg_cost_usd, last_purchase_cost_usd, created_at, updated_at
        FROM variants
        WHERE id = ?1
        "#,
    )
    .bind(variant_id)
    .fetch_optional(&mut *conn)
    .await?;

    variant.ok_or_else(|| LedgerError::not_found("Variant", variant_id))
}

async fn fetch_sale(conn: &mut SqliteConnection, sale_id: &str) -> LedgerResult<Sale> {
    let sale = sqlx::query_as::<_, Sale>(
        r#"
        SELECT id, branch_id, cashier_id, customer_id, subtotal_iqd, discount_iqd,
               total_iqd, profit_iqd, note, created_at
        FROM sales
        WHERE id = ?1
        "#,
    )
    .bind(sale_id)
    .fetch_optional(&mut *conn)
    .await?;

    sale.ok_or_else(|| LedgerError::not_found("Sale", sale_id))
}

pub(crate) async fn fetch_sale_items(
    conn: &mut SqliteConnection,
    sale_id: &str,
) -> LedgerResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(
        r#"
        SELECT id, sale_id, variant_id, quantity, unit_price_iqd,
               unit_cost_at_sale_iqd, line_total_iqd, created_at
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY created_at, id
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

async fn insert_sale_item(conn: &mut SqliteConnection, item: &SaleItem) -> LedgerResult<()> {
    debug!(sale_id = %item.sale_id, variant_id = %item.variant_id, "Adding sale line");

    sqlx::query(
        r#"
        INSERT INTO sale_items (id, sale_id, variant_id, quantity, unit_price_iqd,
                                unit_cost_at_sale_iqd, line_total_iqd, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.variant_id)
    .bind(item.quantity)
    .bind(item.unit_price_iqd)
    .bind(item.unit_cost_at_sale_iqd)
    .bind(item.line_total_iqd)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Returns filed against the header or against any of the sale's lines.
async fn fetch_associated_returns(
    conn: &mut SqliteConnection,
    sale_id: &str,
) -> LedgerResult<Vec<Return>> {
    let returns = sqlx::query_as::<_, Return>(
        r#"
        SELECT id, sale_id, branch_id, processed_by, kind, refund_iqd, cost_iqd,
               note, created_at
        FROM returns
        WHERE sale_id = ?1
           OR id IN (
                SELECT ri.return_id
                FROM return_items ri
                JOIN sale_items si ON ri.sale_item_id = si.id
                WHERE si.sale_id = ?1
           )
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(returns)
}

pub(crate) async fn fetch_return_items(
    conn: &mut SqliteConnection,
    return_id: &str,
) -> LedgerResult<Vec<ReturnItem>> {
    let items = sqlx::query_as::<_, ReturnItem>(
        r#"
        SELECT id, return_id, sale_item_id, variant_id, quantity, amount_iqd,
               direction, created_at
        FROM return_items
        WHERE return_id = ?1
        ORDER BY created_at, id
        "#,
    )
    .bind(return_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

// =============================================================================
// Unit Tests
// =============================================================================
