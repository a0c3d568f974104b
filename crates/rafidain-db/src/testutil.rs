//! Shared fixtures for the crate's test modules.
//!
//! Every test runs against its own in-memory database with migrations
//! applied. Seed ids are fixed ("b1", "v1", "c1") so assertions can name
//! them directly.

use rafidain_core::{
    NewCustomer, NewPurchaseOrder, NewPurchaseOrderItem, NewReturn, NewReturnItem, NewSale,
    NewSaleItem, NewVariant, ReturnDirection, ReturnKind,
};

use crate::pool::{Database, DbConfig};

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

pub async fn seed_branch(db: &Database, id: &str) {
    db.branches().insert(id, "Test Branch").await.expect("seed branch");
}

/// Inserts a variant and backdates its average cost, which new variants
/// otherwise start at zero.
pub async fn seed_variant(db: &Database, id: &str, avg_cost_usd: f64) {
    db.variants()
        .insert_with_id(
            id,
            &NewVariant {
                product_name: "Test Product".to_string(),
                sku: format!("SKU-{id}"),
                size: None,
                color: None,
                default_price_iqd: 15_000,
            },
        )
        .await
        .expect("seed variant");

    if avg_cost_usd != 0.0 {
        sqlx::query("UPDATE variants SET avg_cost_usd = ?2 WHERE id = ?1")
            .bind(id)
            .bind(avg_cost_usd)
            .execute(db.pool())
            .await
            .expect("seed variant cost");
    }
}

pub async fn seed_customer(db: &Database, id: &str) {
    db.customers()
        .insert_with_id(
            id,
            &NewCustomer {
                name: "Test Customer".to_string(),
                phone: None,
            },
        )
        .await
        .expect("seed customer");
}

/// Branch "b1", variant "v1" at the given average cost, customer "c1",
/// and one exchange-rate row.
pub async fn seed_all(db: &Database, avg_cost_usd: f64, rate: f64) {
    seed_branch(db, "b1").await;
    seed_variant(db, "v1", avg_cost_usd).await;
    seed_customer(db, "c1").await;
    db.exchange_rates()
        .update(rate, None, None)
        .await
        .expect("seed exchange rate");
}

pub fn sale_item(variant_id: &str, quantity: i64, unit_price_iqd: i64) -> NewSaleItem {
    NewSaleItem {
        variant_id: variant_id.to_string(),
        quantity,
        unit_price_iqd,
    }
}

pub fn sale_with_items(items: Vec<NewSaleItem>) -> NewSale {
    NewSale {
        branch_id: "b1".to_string(),
        cashier_id: "cashier-1".to_string(),
        customer_id: None,
        discount_iqd: 0,
        note: None,
        items,
    }
}

pub fn return_item(
    variant_id: &str,
    quantity: i64,
    amount_iqd: i64,
    direction: ReturnDirection,
) -> NewReturnItem {
    NewReturnItem {
        sale_item_id: None,
        variant_id: variant_id.to_string(),
        quantity,
        amount_iqd,
        direction,
    }
}

pub fn return_with_items(items: Vec<NewReturnItem>) -> NewReturn {
    NewReturn {
        sale_id: None,
        branch_id: "b1".to_string(),
        processed_by: "clerk-1".to_string(),
        kind: ReturnKind::Refund,
        refund_iqd: None,
        note: None,
        items,
    }
}

pub fn po_item(
    variant_id: &str,
    quantity: i64,
    unit_cost_usd: f64,
    unit_cost_iqd: i64,
) -> NewPurchaseOrderItem {
    NewPurchaseOrderItem {
        variant_id: variant_id.to_string(),
        quantity,
        unit_cost_usd,
        unit_cost_iqd,
    }
}

pub fn po_with_items(items: Vec<NewPurchaseOrderItem>) -> NewPurchaseOrder {
    NewPurchaseOrder {
        supplier: "Test Supplier".to_string(),
        branch_id: "b1".to_string(),
        note: None,
        items,
    }
}
