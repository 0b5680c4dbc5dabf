//! Product pricing for new orders.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::earnings::{to_f64, MAX_AMOUNT};
use crate::error::AppError;
use crate::models::order::{OrderItem, ProductKind};

/// Sales tax applied on top of the item subtotal, in percent.
pub const TAX_RATE: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct ItemRequest {
    pub kind: ProductKind,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub kind: ProductKind,
    pub name: &'static str,
    pub size: &'static str,
    pub unit_price: u32,
}

#[derive(Debug, Clone)]
pub struct PricedItems {
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total_amount: f64,
}

pub fn products() -> Vec<Product> {
    ProductKind::ALL
        .into_iter()
        .map(|kind| Product {
            kind,
            name: kind.display_name(),
            size: kind.size(),
            unit_price: kind.unit_price(),
        })
        .collect()
}

pub fn price(requested: &[ItemRequest]) -> Result<PricedItems, AppError> {
    if requested.is_empty() {
        return Err(AppError::BadRequest(
            "order must contain at least one item".to_string(),
        ));
    }

    let mut subtotal = Decimal::ZERO;
    let mut items = Vec::with_capacity(requested.len());
    for item in requested {
        if item.quantity == 0 {
            return Err(AppError::BadRequest(format!(
                "quantity for {:?} must be at least 1",
                item.kind
            )));
        }

        let unit_price = Decimal::from(item.kind.unit_price());
        let line_total = unit_price * Decimal::from(item.quantity);
        subtotal += line_total;

        items.push(OrderItem {
            kind: item.kind,
            quantity: item.quantity,
            unit_price: to_f64(unit_price),
            total_price: to_f64(line_total),
        });
    }

    let tax = subtotal * Decimal::from(TAX_RATE) / Decimal::ONE_HUNDRED;
    let total = to_f64(subtotal + tax);
    if total > MAX_AMOUNT {
        return Err(AppError::BadRequest(format!(
            "order total {total} exceeds the limit of {MAX_AMOUNT}"
        )));
    }
    Ok(PricedItems {
        items,
        subtotal: to_f64(subtotal),
        tax: to_f64(tax),
        total_amount: total,
    })
}

/// Human-readable order number, `ORD-<unix millis>-<three digits>`.
pub fn order_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("ORD-{}-{:03}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn prices_items_with_tax() {
        let priced = price(&[
            ItemRequest {
                kind: ProductKind::LargeTanker,
                quantity: 1,
            },
            ItemRequest {
                kind: ProductKind::WaterBottles,
                quantity: 3,
            },
        ])
        .unwrap();

        assert_eq!(priced.items.len(), 2);
        assert_eq!(priced.items[1].total_price, 1500.0);
        assert_eq!(priced.subtotal, 4000.0);
        assert_eq!(priced.tax, 400.0);
        assert_eq!(priced.total_amount, 4400.0);
    }

    #[test]
    fn rejects_empty_orders_and_zero_quantities() {
        assert!(matches!(price(&[]), Err(AppError::BadRequest(_))));
        let zero = price(&[ItemRequest {
            kind: ProductKind::SmallTanker,
            quantity: 0,
        }]);
        assert!(matches!(zero, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn rejects_totals_that_earnings_cannot_settle() {
        let huge = price(&[ItemRequest {
            kind: ProductKind::LargeTanker,
            quantity: u32::MAX,
        }]);
        assert!(matches!(huge, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn order_numbers_have_expected_shape() {
        let number = order_number(Utc::now());
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[2].len(), 3);
    }

    #[test]
    fn catalog_lists_every_product() {
        let catalog = products();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog[0].unit_price, 2500);
    }
}
