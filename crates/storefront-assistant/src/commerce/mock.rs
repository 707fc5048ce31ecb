//! Mock Commerce Client
//!
//! For testing and demo purposes. Serves a small static store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal_macros::dec;

use super::CommerceClient;
use crate::error::{Result, StorefrontError};
use crate::model::{
    Order, OrderLine, OrderStatus, Policy, PolicyKind, Product, Shipment, normalize_order_number,
};

/// Mock commerce client with static orders, products and policies
pub struct MockCommerceClient {
    orders: Vec<Order>,
    products: Vec<Product>,
    online: bool,
}

impl Default for MockCommerceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommerceClient {
    pub fn new() -> Self {
        Self {
            orders: sample_orders(),
            products: sample_products(),
            online: true,
        }
    }

    /// A client whose every call fails as unreachable
    pub fn offline() -> Self {
        Self {
            online: false,
            ..Self::new()
        }
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online {
            Ok(())
        } else {
            Err(StorefrontError::Unavailable("mock store is offline".into()))
        }
    }
}

#[async_trait]
impl CommerceClient for MockCommerceClient {
    async fn get_order(&self, number: &str) -> Result<Order> {
        self.ensure_online()?;
        let wanted = normalize_order_number(number);

        self.orders
            .iter()
            .find(|o| o.number == wanted)
            .cloned()
            .ok_or(StorefrontError::OrderNotFound(wanted))
    }

    async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>> {
        self.ensure_online()?;

        let mut scored: Vec<(usize, &Product)> = self
            .products
            .iter()
            .map(|p| (p.relevance(query), p))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable sort keeps catalog order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored.into_iter().take(limit).map(|(_, p)| p.clone()).collect())
    }

    async fn get_policy(&self, kind: PolicyKind) -> Result<Policy> {
        self.ensure_online()?;

        let (title, body) = match kind {
            PolicyKind::Shipping => (
                "Shipping Policy",
                "Orders placed before 2pm ET ship the same business day. Standard shipping (3-5 business days) is $5.99 and free on orders over $75. Express shipping (1-2 business days) is $14.99. We ship to the US and Canada.",
            ),
            PolicyKind::Returns => (
                "Return Policy",
                "Unworn items in original packaging can be returned within 30 days of delivery for a full refund. Start a return from the order page; a prepaid label is emailed within one business day. Refunds reach the original payment method 5-7 business days after we receive the item. Final-sale items cannot be returned.",
            ),
            PolicyKind::Payments => (
                "Payment Policy",
                "We accept Visa, Mastercard, American Express, PayPal and Apple Pay. Cards are charged when the order ships. Prices are in USD.",
            ),
            PolicyKind::Privacy => (
                "Privacy Policy",
                "We only use your details to process orders and, if you opt in, to send updates. We never sell personal data. Email privacy@example-store.com to request a copy or deletion of your data.",
            ),
        };

        Ok(Policy {
            kind,
            title: title.into(),
            body: body.into(),
        })
    }

    async fn health_check(&self) -> bool {
        self.online
    }

    fn name(&self) -> &str {
        "MockStore"
    }
}

fn placed(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_default()
}

fn sample_orders() -> Vec<Order> {
    vec![
        Order {
            number: "123".into(),
            status: OrderStatus::Shipped,
            placed_at: placed(1_760_000_000),
            lines: vec![OrderLine::new("TR2-42", "Trail Runner 2 (size 42)", 1, dec!(89.00))],
            shipping_cost: dec!(5.99),
            currency: "USD".into(),
            shipment: Some(Shipment {
                carrier: "UPS".into(),
                tracking_number: "1Z999AA10123456784".into(),
                estimated_delivery: NaiveDate::from_ymd_opt(2025, 10, 14),
            }),
        },
        Order {
            number: "1001".into(),
            status: OrderStatus::Processing,
            placed_at: placed(1_760_300_000),
            lines: vec![
                OrderLine::new("HB-BRN-10", "Ridge Hiking Boot (brown, 10)", 1, dec!(120.00)),
                OrderLine::new("SOCK-MER-3", "Merino Hiking Socks (3 pack)", 2, dec!(14.50)),
            ],
            shipping_cost: dec!(0.00),
            currency: "USD".into(),
            shipment: None,
        },
        Order {
            number: "1002".into(),
            status: OrderStatus::Delivered,
            placed_at: placed(1_759_000_000),
            lines: vec![OrderLine::new("PK-22L", "Daypack 22L", 1, dec!(64.00))],
            shipping_cost: dec!(5.99),
            currency: "USD".into(),
            shipment: Some(Shipment {
                carrier: "USPS".into(),
                tracking_number: "9400111899223856925123".into(),
                estimated_delivery: NaiveDate::from_ymd_opt(2025, 9, 30),
            }),
        },
        Order {
            number: "1003".into(),
            status: OrderStatus::Cancelled,
            placed_at: placed(1_760_100_000),
            lines: vec![OrderLine::new("JKT-RN-M", "Storm Rain Jacket (M)", 1, dec!(149.00))],
            shipping_cost: dec!(5.99),
            currency: "USD".into(),
            shipment: None,
        },
    ]
}

fn product(
    handle: &str,
    title: &str,
    description: &str,
    price: rust_decimal::Decimal,
    compare_at_price: Option<rust_decimal::Decimal>,
    available: bool,
    tags: &[&str],
) -> Product {
    Product {
        handle: handle.into(),
        title: title.into(),
        description: description.into(),
        price,
        compare_at_price,
        available,
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
    }
}

fn sample_products() -> Vec<Product> {
    vec![
        product(
            "trail-runner-2",
            "Trail Runner 2",
            "Lightweight running shoe with a grippy outsole for rocky trails.",
            dec!(89.00),
            Some(dec!(110.00)),
            true,
            &["shoes", "running", "trail"],
        ),
        product(
            "road-glide",
            "Road Glide",
            "Cushioned everyday running shoe for pavement.",
            dec!(99.00),
            None,
            true,
            &["shoes", "running", "road"],
        ),
        product(
            "ridge-hiking-boot",
            "Ridge Hiking Boot",
            "Waterproof leather hiking boot with ankle support.",
            dec!(120.00),
            None,
            true,
            &["boots", "hiking", "waterproof"],
        ),
        product(
            "merino-hiking-socks",
            "Merino Hiking Socks (3 pack)",
            "Cushioned merino wool socks for hiking and running.",
            dec!(14.50),
            None,
            true,
            &["socks", "hiking", "running"],
        ),
        product(
            "daypack-22l",
            "Daypack 22L",
            "Lightweight hiking backpack with hydration sleeve.",
            dec!(64.00),
            None,
            false,
            &["backpack", "hiking"],
        ),
        product(
            "storm-rain-jacket",
            "Storm Rain Jacket",
            "Packable waterproof shell jacket.",
            dec!(149.00),
            Some(dec!(179.00)),
            true,
            &["jacket", "waterproof", "rain"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_order_lookup_accepts_hash_prefix() {
        let store = MockCommerceClient::new();

        let order = store.get_order("#123").await.unwrap();
        assert_eq!(order.number, "123");
        assert_eq!(order.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let store = MockCommerceClient::new();
        let result = store.get_order("999999").await;
        assert!(matches!(result, Err(StorefrontError::OrderNotFound(n)) if n == "999999"));
    }

    #[tokio::test]
    async fn test_search_ranks_and_limits() {
        let store = MockCommerceClient::new();

        let results = store.search_products("running shoes", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|p| p.tags.contains(&"shoes".to_string())));

        assert!(store.search_products("kayak", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_client_fails() {
        let store = MockCommerceClient::offline();
        assert!(!store.health_check().await);
        assert!(matches!(
            store.get_policy(PolicyKind::Returns).await,
            Err(StorefrontError::Unavailable(_))
        ));
    }
}
