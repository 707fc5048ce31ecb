//! Domain Models
//!
//! Orders, products and policies as the assistant sees them.
//! Uses `rust_decimal` for all monetary values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StorefrontError;

/// Fulfilment state of an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "pending payment",
            OrderStatus::Processing => "being prepared",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        };
        f.write_str(label)
    }
}

/// One line item of an order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn new(sku: impl Into<String>, title: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            sku: sku.into(),
            title: title.into(),
            quantity,
            unit_price,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Shipment tracking details
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub carrier: String,
    pub tracking_number: String,
    pub estimated_delivery: Option<NaiveDate>,
}

/// A customer order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Customer-facing order number, without the leading '#'
    pub number: String,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
    pub shipping_cost: Decimal,
    pub currency: String,
    pub shipment: Option<Shipment>,
}

impl Order {
    /// Line subtotals plus shipping
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(OrderLine::subtotal).sum::<Decimal>() + self.shipping_cost
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// Normalize what a customer types ("#1001", " 1001 ") to an order number
pub fn normalize_order_number(raw: &str) -> String {
    raw.trim().trim_start_matches('#').trim().to_uppercase()
}

/// A catalog product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub handle: String,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    /// Original price when the product is on sale
    pub compare_at_price: Option<Decimal>,
    pub available: bool,
    pub tags: Vec<String>,
}

impl Product {
    pub fn on_sale(&self) -> bool {
        self.compare_at_price.is_some_and(|was| was > self.price)
    }

    /// Case-insensitive relevance against whitespace-separated terms; 0 means no match
    pub fn relevance(&self, query: &str) -> usize {
        let title = self.title.to_lowercase();
        let description = self.description.to_lowercase();

        query
            .split_whitespace()
            .map(str::to_lowercase)
            .map(|term| {
                let mut score = 0;
                if title.contains(&term) {
                    score += 3;
                }
                if self.tags.iter().any(|t| t.eq_ignore_ascii_case(&term)) {
                    score += 2;
                }
                if description.contains(&term) {
                    score += 1;
                }
                score
            })
            .sum()
    }
}

/// Store policy topics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Shipping,
    Returns,
    Payments,
    Privacy,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::Shipping,
        PolicyKind::Returns,
        PolicyKind::Payments,
        PolicyKind::Privacy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Shipping => "shipping",
            PolicyKind::Returns => "returns",
            PolicyKind::Payments => "payments",
            PolicyKind::Privacy => "privacy",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        PolicyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| StorefrontError::UnknownPolicy(s.to_string()))
    }
}

/// A published store policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub kind: PolicyKind,
    pub title: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_order_total_includes_shipping() {
        let order = Order {
            number: "1001".into(),
            status: OrderStatus::Shipped,
            placed_at: Utc::now(),
            lines: vec![
                OrderLine::new("TR2-42", "Trail Runner 2", 2, dec!(89.00)),
                OrderLine::new("SOCK-3", "Merino Socks", 1, dec!(14.50)),
            ],
            shipping_cost: dec!(5.99),
            currency: "USD".into(),
            shipment: None,
        };

        assert_eq!(order.total(), dec!(198.49));
        assert_eq!(order.item_count(), 3);
    }

    #[test]
    fn test_order_number_normalization() {
        assert_eq!(normalize_order_number(" #123 "), "123");
        assert_eq!(normalize_order_number("sf-1002"), "SF-1002");
    }

    #[test]
    fn test_policy_kind_parsing() {
        assert_eq!("Returns".parse::<PolicyKind>().unwrap(), PolicyKind::Returns);
        assert!(matches!(
            "warranty".parse::<PolicyKind>(),
            Err(StorefrontError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn test_product_relevance() {
        let product = Product {
            handle: "trail-runner-2".into(),
            title: "Trail Runner 2".into(),
            description: "Lightweight running shoe for rocky trails".into(),
            price: dec!(89.00),
            compare_at_price: Some(dec!(110.00)),
            available: true,
            tags: vec!["shoes".into(), "running".into()],
        };

        assert!(product.on_sale());
        assert_eq!(product.relevance("hiking backpack"), 0);
        assert!(product.relevance("running shoes") > product.relevance("rocky"));
    }
}
