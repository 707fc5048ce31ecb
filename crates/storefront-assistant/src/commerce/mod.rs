//! Commerce Platform Integration
//!
//! Read-only access to the store's orders, catalog and policies.

mod mock;

pub use mock::MockCommerceClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Order, Policy, PolicyKind, Product};

/// Commerce platform client trait (Strategy pattern)
///
/// Implement this for each storefront backend.
#[async_trait]
pub trait CommerceClient: Send + Sync {
    /// Look up an order by its customer-facing number
    async fn get_order(&self, number: &str) -> Result<Order>;

    /// Products matching a free-text query, best match first
    async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>>;

    /// Current text of a store policy
    async fn get_policy(&self, kind: PolicyKind) -> Result<Policy>;

    /// Check if the platform is reachable
    async fn health_check(&self) -> bool;

    /// Platform name
    fn name(&self) -> &str;
}
