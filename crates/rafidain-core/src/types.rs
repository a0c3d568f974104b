//! # Domain Types
//!
//! Core domain types for the Rafidain POS ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           Domain Types                              │
//! │                                                                     │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌────────────────────┐   │
//! │  │    Variant     │  │   StockLevel     │  │ InventoryAdjustment│   │
//! │  │  ────────────  │  │  ──────────────  │  │  ────────────────  │   │
//! │  │  id (UUID)     │  │  (variant,branch)│  │  delta_quantity    │   │
//! │  │  avg_cost_usd  │  │  quantity        │  │  reason, actor     │   │
//! │  └────────────────┘  └──────────────────┘  └────────────────────┘   │
//! │                                                                     │
//! │  Sale + SaleItem          Return + ReturnItem (direction!)          │
//! │  PurchaseOrder + Item     Customer (denormalized aggregates)        │
//! │  ExchangeRate (append-only series)                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Currency Convention
//! Retail amounts (prices, totals, refunds, profit) are whole Iraqi dinars
//! stored as `i64` with an `_iqd` suffix. Supplier costs are US dollars
//! stored as `f64` with a `_usd` suffix; they only become dinars through
//! an explicit exchange-rate conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Variant
// =============================================================================

/// A sellable configuration of a product (size/color combination).
///
/// Identity is immutable. The cost fields are mutated only by the costing
/// engine when a purchase order is received. A variant referenced by any
/// sale line is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Variant {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Product-level display name.
    pub product_name: String,

    /// Stock Keeping Unit - business identifier, unique.
    pub sku: String,

    /// Size label, if the product is sized.
    pub size: Option<String>,

    /// Color label, if the product is colored.
    pub color: Option<String>,

    /// Default retail price in whole dinars.
    pub default_price_iqd: i64,

    /// Weighted-average unit cost in USD. Written by the costing engine.
    pub avg_cost_usd: f64,

    /// Unit cost of the most recent receipt in USD.
    pub last_purchase_cost_usd: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    pub product_name: String,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub default_price_iqd: i64,
}

// =============================================================================
// Branch
// =============================================================================

/// A physical store location holding its own stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Live quantity for a (variant, branch) pair.
///
/// Created lazily on first touch. The quantity is the running sum of all
/// adjustments for the key and is never written except through a signed
/// delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLevel {
    pub variant_id: String,
    pub branch_id: String,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a stock delta was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Sold to a customer (negative delta).
    Sale,
    /// Customer gave an item back (positive delta).
    Return,
    /// Either leg of an exchange (sign depends on direction).
    Exchange,
    /// Received against a purchase order (positive delta).
    PurchaseOrder,
    /// Reversal applied when a sale is deleted.
    SaleReversal,
    /// Manual correction by staff.
    Manual,
}

/// Immutable, append-only audit record of a single stock delta.
///
/// The full history for a (variant, branch) pair must always sum to the
/// live `StockLevel::quantity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryAdjustment {
    pub id: String,
    pub variant_id: String,
    pub branch_id: String,
    pub delta_quantity: i64,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// A completed sale transaction header.
///
/// Immutable after creation except for deletion, which reverses every
/// side effect. `profit_iqd` is a snapshot taken at sale time and is
/// never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub branch_id: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub subtotal_iqd: i64,
    pub discount_iqd: i64,
    pub total_iqd: i64,
    /// total minus the summed cost snapshots of the lines.
    pub profit_iqd: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A line item in a sale.
///
/// `unit_cost_at_sale_iqd` freezes the variant's cost at the moment of
/// sale; later profit and return-cost calculations prefer it over the
/// current average cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price_iqd: i64,
    pub unit_cost_at_sale_iqd: i64,
    pub line_total_iqd: i64,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a sale together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSale {
    pub branch_id: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub discount_iqd: i64,
    pub note: Option<String>,
    pub items: Vec<NewSaleItem>,
}

/// One requested sale line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price_iqd: i64,
}

// =============================================================================
// Return / Exchange
// =============================================================================

/// Classifies a return line's effect on stock and money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ReturnDirection {
    /// Customer gives the item back for a refund. Stock goes up.
    #[default]
    Return,
    /// Customer gives the item back as the outgoing half of an exchange.
    /// Stock goes up.
    ExchangeOut,
    /// Customer takes a new item as the incoming half of an exchange.
    /// Stock goes down, and the leg is charged rather than refunded.
    ExchangeIn,
}

impl ReturnDirection {
    /// Sign applied to the absolute line quantity when adjusting stock.
    pub fn stock_sign(&self) -> i64 {
        match self {
            ReturnDirection::Return | ReturnDirection::ExchangeOut => 1,
            ReturnDirection::ExchangeIn => -1,
        }
    }

    /// Whether the leg participates in the refund total.
    pub fn is_refunded(&self) -> bool {
        !matches!(self, ReturnDirection::ExchangeIn)
    }
}

/// Header-level classification of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    #[default]
    Refund,
    Exchange,
}

/// A processed return or exchange header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Return {
    pub id: String,
    /// Originating sale, when the return was matched to one.
    pub sale_id: Option<String>,
    pub branch_id: String,
    pub processed_by: String,
    pub kind: ReturnKind,
    /// Amount handed back to the customer.
    pub refund_iqd: i64,
    /// Accumulated cost of the returned goods, written once after all
    /// items are processed.
    pub cost_iqd: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A line in a return, carrying its direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReturnItem {
    pub id: String,
    pub return_id: String,
    /// Originating sale line, when known. Its cost snapshot is preferred
    /// for cost accounting.
    pub sale_item_id: Option<String>,
    pub variant_id: String,
    pub quantity: i64,
    pub amount_iqd: i64,
    pub direction: ReturnDirection,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a return with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReturn {
    pub sale_id: Option<String>,
    pub branch_id: String,
    pub processed_by: String,
    #[serde(default)]
    pub kind: ReturnKind,
    /// Explicit refund override. When absent the refund defaults to the
    /// sum of non-exchange-in line amounts.
    pub refund_iqd: Option<i64>,
    pub note: Option<String>,
    pub items: Vec<NewReturnItem>,
}

/// One requested return line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReturnItem {
    pub sale_item_id: Option<String>,
    pub variant_id: String,
    pub quantity: i64,
    pub amount_iqd: i64,
    #[serde(default)]
    pub direction: ReturnDirection,
}

// =============================================================================
// Purchase Order
// =============================================================================

/// Lifecycle of a purchase order.
///
/// `draft → ordered → received` is one-way; `cancelled` and `received`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    #[default]
    Draft,
    Ordered,
    Received,
    Cancelled,
}

/// A purchase order header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseOrder {
    pub id: String,
    pub supplier: String,
    pub branch_id: String,
    pub status: PurchaseOrderStatus,
    pub subtotal_usd: f64,
    pub subtotal_iqd: i64,
    pub note: Option<String>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A line in a purchase order, costed in both currencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub unit_cost_usd: f64,
    pub unit_cost_iqd: i64,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a purchase order with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier: String,
    pub branch_id: String,
    pub note: Option<String>,
    pub items: Vec<NewPurchaseOrderItem>,
}

/// One requested purchase order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseOrderItem {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_cost_usd: f64,
    pub unit_cost_iqd: i64,
}

// =============================================================================
// Customer
// =============================================================================

/// A customer with denormalized lifetime aggregates.
///
/// The aggregates are mutated additively by every attributed sale and
/// reverted (clamped at zero) when a sale is deleted. The sale and
/// adjustment tables remain the source of truth for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub total_visits: i64,
    pub total_spent_iqd: i64,
    pub loyalty_points: i64,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone: Option<String>,
}

// =============================================================================
// Exchange Rate
// =============================================================================

/// One row of the append-only exchange-rate series (IQD per USD).
///
/// Rates are never updated in place; a newer row supersedes older ones.
/// "Current" means the most recent `effective_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ExchangeRate {
    pub id: String,
    /// Dinars per one US dollar.
    pub rate: f64,
    pub effective_at: DateTime<Utc>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_direction_signs() {
        assert_eq!(ReturnDirection::Return.stock_sign(), 1);
        assert_eq!(ReturnDirection::ExchangeOut.stock_sign(), 1);
        assert_eq!(ReturnDirection::ExchangeIn.stock_sign(), -1);
    }

    #[test]
    fn exchange_in_is_not_refunded() {
        assert!(ReturnDirection::Return.is_refunded());
        assert!(ReturnDirection::ExchangeOut.is_refunded());
        assert!(!ReturnDirection::ExchangeIn.is_refunded());
    }

    #[test]
    fn default_direction_is_return() {
        assert_eq!(ReturnDirection::default(), ReturnDirection::Return);
    }

    #[test]
    fn new_return_item_direction_defaults_in_json() {
        let item: NewReturnItem = serde_json::from_str(
            r#"{"sale_item_id": null, "variant_id": "v1", "quantity": 2, "amount_iqd": 5000}"#,
        )
        .unwrap();
        assert_eq!(item.direction, ReturnDirection::Return);
    }
}
