//! # Validation Module
//!
//! Pre-mutation input checks used by the transaction processors.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       Validation Layers                             │
//! │                                                                     │
//! │  Layer 1: Application boundary (out of scope here)                  │
//! │  └── Auth, role checks, format checks                               │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 2: THIS MODULE - required fields, positive quantities,       │
//! │           non-empty line sets. Runs BEFORE any mutation.            │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 3: SQLite - NOT NULL, UNIQUE, FOREIGN KEY constraints        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure here means the caller gets the error back and the database
//! was never touched.

use crate::error::ValidationError;
use crate::types::{NewPurchaseOrder, NewReturn, NewSale};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Checks that a required identifier is present and non-blank.
pub fn require_id(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Checks that a quantity is strictly positive.
pub fn require_positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

/// Validates a sale payload before any mutation.
///
/// Empty-item sales are rejected outright: a sale with no lines has no
/// total, no profit and no stock effect, and letting it through would
/// only create noise in the books.
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
    require_id("branch_id", &sale.branch_id)?;
    require_id("cashier_id", &sale.cashier_id)?;
    if sale.items.is_empty() {
        return Err(ValidationError::EmptyItems {
            entity: "Sale".to_string(),
        });
    }
    if sale.discount_iqd < 0 {
        return Err(ValidationError::Negative {
            field: "discount_iqd".to_string(),
            value: sale.discount_iqd,
        });
    }
    for item in &sale.items {
        require_id("variant_id", &item.variant_id)?;
        require_positive("quantity", item.quantity)?;
    }
    Ok(())
}

/// Validates a return payload before any mutation.
pub fn validate_new_return(ret: &NewReturn) -> ValidationResult<()> {
    require_id("branch_id", &ret.branch_id)?;
    require_id("processed_by", &ret.processed_by)?;
    if ret.items.is_empty() {
        return Err(ValidationError::EmptyItems {
            entity: "Return".to_string(),
        });
    }
    for item in &ret.items {
        require_id("variant_id", &item.variant_id)?;
        require_positive("quantity", item.quantity)?;
    }
    Ok(())
}

/// Validates a purchase order payload before any mutation.
pub fn validate_new_purchase_order(po: &NewPurchaseOrder) -> ValidationResult<()> {
    require_id("supplier", &po.supplier)?;
    require_id("branch_id", &po.branch_id)?;
    if po.items.is_empty() {
        return Err(ValidationError::EmptyItems {
            entity: "Purchase order".to_string(),
        });
    }
    for item in &po.items {
        require_id("variant_id", &item.variant_id)?;
        require_positive("quantity", item.quantity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewSale, NewSaleItem};

    fn valid_sale() -> NewSale {
        NewSale {
            branch_id: "b1".to_string(),
            cashier_id: "u1".to_string(),
            customer_id: None,
            discount_iqd: 0,
            note: None,
            items: vec![NewSaleItem {
                variant_id: "v1".to_string(),
                quantity: 1,
                unit_price_iqd: 15_000,
            }],
        }
    }

    #[test]
    fn accepts_valid_sale() {
        assert!(validate_new_sale(&valid_sale()).is_ok());
    }

    #[test]
    fn rejects_blank_cashier() {
        let mut sale = valid_sale();
        sale.cashier_id = "  ".to_string();
        assert!(matches!(
            validate_new_sale(&sale),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn rejects_empty_item_list() {
        let mut sale = valid_sale();
        sale.items.clear();
        assert!(matches!(
            validate_new_sale(&sale),
            Err(ValidationError::EmptyItems { .. })
        ));
    }

    #[test]
    fn rejects_zero_quantity() {
        let mut sale = valid_sale();
        sale.items[0].quantity = 0;
        assert!(matches!(
            validate_new_sale(&sale),
            Err(ValidationError::MustBePositive { .. })
        ));
    }
}
