//! # Seed Data Generator
//!
//! Populates a development database with branches, variants, a customer,
//! an exchange rate and one received purchase order so every ledger
//! operation has something to work against.
//!
//! ## Usage
//! ```bash
//! cargo run -p rafidain-db --bin seed
//!
//! # Specify database path
//! cargo run -p rafidain-db --bin seed -- --db ./data/ledger.db
//! ```

use std::env;

use rafidain_core::{
    NewCustomer, NewPurchaseOrder, NewPurchaseOrderItem, NewVariant,
};
use rafidain_db::{Database, DbConfig};

const BRANCHES: &[(&str, &str)] = &[
    ("branch-karrada", "Karrada"),
    ("branch-mansour", "Mansour"),
];

/// (product, sku, sizes, color, price IQD, cost USD)
const PRODUCTS: &[(&str, &str, &[&str], &str, i64, f64)] = &[
    ("Classic Oxford Shirt", "SHIRT-OXF", &["S", "M", "L", "XL"], "White", 35_000, 9.5),
    ("Slim Chino Trousers", "TRS-CHINO", &["30", "32", "34", "36"], "Beige", 45_000, 12.0),
    ("Crewneck T-Shirt", "TEE-CREW", &["S", "M", "L"], "Black", 15_000, 3.25),
    ("Denim Jacket", "JKT-DNM", &["M", "L", "XL"], "Blue", 85_000, 22.0),
    ("Leather Belt", "BLT-LTH", &["One Size"], "Brown", 25_000, 6.0),
    ("Wool Scarf", "SCF-WOOL", &["One Size"], "Grey", 20_000, 4.5),
];

const DEFAULT_RATE: f64 = 1_480.0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./rafidain_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Rafidain Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./rafidain_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Rafidain Ledger Seed Data Generator");
    println!("======================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    let existing = db.variants().list(1).await?;
    if !existing.is_empty() {
        println!("⚠ Database already has variants");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    for (id, name) in BRANCHES {
        db.branches().insert(id, name).await?;
    }
    println!("✓ {} branches", BRANCHES.len());

    db.exchange_rates()
        .update(DEFAULT_RATE, None, Some("seed rate"))
        .await?;
    println!("✓ Exchange rate {} IQD/USD", DEFAULT_RATE);

    db.customers()
        .insert(&NewCustomer {
            name: "Walk-in Test Customer".to_string(),
            phone: Some("+964 770 000 0000".to_string()),
        })
        .await?;
    println!("✓ 1 customer");

    let mut po_items = Vec::new();
    let mut variant_count = 0;
    for (product, sku_base, sizes, color, price_iqd, cost_usd) in PRODUCTS {
        for size in *sizes {
            let variant = db
                .variants()
                .insert(&NewVariant {
                    product_name: product.to_string(),
                    sku: format!("{sku_base}-{size}"),
                    size: Some(size.to_string()),
                    color: Some(color.to_string()),
                    default_price_iqd: *price_iqd,
                })
                .await?;
            variant_count += 1;

            po_items.push(NewPurchaseOrderItem {
                variant_id: variant.id,
                quantity: 20,
                unit_cost_usd: *cost_usd,
                unit_cost_iqd: (cost_usd * DEFAULT_RATE).round() as i64,
            });
        }
    }
    println!("✓ {} variants", variant_count);

    // One received order stocks the first branch and sets every
    // variant's average cost
    let po = db
        .purchase_orders()
        .create(NewPurchaseOrder {
            supplier: "Seed Supplier Co".to_string(),
            branch_id: BRANCHES[0].0.to_string(),
            note: Some("initial stock".to_string()),
            items: po_items,
        })
        .await?;
    db.purchase_orders().mark_ordered(&po.id).await?;
    db.purchase_orders()
        .receive(&po.id, None, Some("seed"))
        .await?;
    println!("✓ Purchase order received: 20 units per variant at {}", BRANCHES[0].1);

    let drift = db.stock().check_consistency().await?;
    println!("✓ Ledger consistency: {} drifting rows", drift.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
