//! # Money Math
//!
//! Pure currency arithmetic for the ledger.
//!
//! ## The Two-Currency Problem
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Retail side (customer-facing)      Supply side (supplier-facing)   │
//! │                                                                     │
//! │  Whole Iraqi dinars, i64            US dollars, f64                 │
//! │  prices, totals, refunds, profit    unit costs, weighted averages   │
//! │                                                                     │
//! │            usd_to_iqd(cost, rate) bridges the two:                  │
//! │            cost_usd × rate(IQD/USD) → rounded whole dinars          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The dinar has no practical subunit, so `i64` whole-dinar amounts are
//! exact. USD costs stay `f64` because the weighted-average blend is
//! fractional; they are rounded only at the moment they become dinars.

use crate::types::{NewReturnItem, NewSaleItem};
use crate::IQD_PER_LOYALTY_POINT;

/// Converts a USD unit cost to whole dinars at the given rate.
///
/// Rounds half away from zero, which is what the cash drawer does.
#[inline]
pub fn usd_to_iqd(cost_usd: f64, rate_iqd_per_usd: f64) -> i64 {
    (cost_usd * rate_iqd_per_usd).round() as i64
}

/// Line total for a requested sale line.
#[inline]
pub fn line_total_iqd(item: &NewSaleItem) -> i64 {
    item.unit_price_iqd * item.quantity
}

/// Subtotal over requested sale lines.
pub fn sale_subtotal_iqd(items: &[NewSaleItem]) -> i64 {
    items.iter().map(line_total_iqd).sum()
}

/// Realized profit snapshot for a sale.
///
/// `total - Σ(unit_cost_at_sale × quantity)`. The cost snapshots are
/// fixed at sale time; this figure is stored and never recomputed.
pub fn sale_profit_iqd(total_iqd: i64, costed_lines: &[(i64, i64)]) -> i64 {
    let cost: i64 = costed_lines.iter().map(|(cost, qty)| cost * qty).sum();
    total_iqd - cost
}

/// Default refund for a return: the sum of line amounts over every leg
/// that is actually refunded. Exchange-in legs are charged, not refunded.
pub fn default_refund_iqd(items: &[NewReturnItem]) -> i64 {
    items
        .iter()
        .filter(|i| i.direction.is_refunded())
        .map(|i| i.amount_iqd)
        .sum()
}

/// Loyalty points earned for an attributed sale amount.
#[inline]
pub fn loyalty_points_for(amount_iqd: i64) -> i64 {
    amount_iqd / IQD_PER_LOYALTY_POINT
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReturnDirection;

    fn sale_item(qty: i64, price: i64) -> NewSaleItem {
        NewSaleItem {
            variant_id: "v".to_string(),
            quantity: qty,
            unit_price_iqd: price,
        }
    }

    fn return_item(amount: i64, direction: ReturnDirection) -> NewReturnItem {
        NewReturnItem {
            sale_item_id: None,
            variant_id: "v".to_string(),
            quantity: 1,
            amount_iqd: amount,
            direction,
        }
    }

    #[test]
    fn usd_conversion_rounds_to_whole_dinars() {
        // 3.5 USD at 1460 IQD/USD = 5110 IQD exactly
        assert_eq!(usd_to_iqd(3.5, 1460.0), 5110);
        // 1.333 USD at 1500 = 1999.5 -> 2000
        assert_eq!(usd_to_iqd(1.333, 1500.0), 2000);
        assert_eq!(usd_to_iqd(0.0, 1500.0), 0);
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let items = vec![sale_item(2, 15_000), sale_item(1, 25_000)];
        assert_eq!(sale_subtotal_iqd(&items), 55_000);
    }

    #[test]
    fn profit_subtracts_cost_snapshots() {
        // total 55,000; costs 2x10,000 + 1x18,000 = 38,000
        let profit = sale_profit_iqd(55_000, &[(10_000, 2), (18_000, 1)]);
        assert_eq!(profit, 17_000);
    }

    #[test]
    fn default_refund_excludes_exchange_in() {
        let items = vec![
            return_item(10_000, ReturnDirection::Return),
            return_item(8_000, ReturnDirection::ExchangeOut),
            return_item(12_000, ReturnDirection::ExchangeIn),
        ];
        assert_eq!(default_refund_iqd(&items), 18_000);
    }

    #[test]
    fn loyalty_points_floor_divide() {
        assert_eq!(loyalty_points_for(999), 0);
        assert_eq!(loyalty_points_for(1_000), 1);
        assert_eq!(loyalty_points_for(45_500), 45);
    }
}
