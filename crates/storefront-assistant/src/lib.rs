//! # storefront-assistant
//!
//! Storefront domain for the conversational assistant: the tools it can
//! call, the commerce platform they read from, and the store knowledge that
//! goes into its system prompt.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Agent ──► ToolRegistry                                  │
//! │              ├─ order-status   ─┐                        │
//! │              ├─ product-search ─┼─► CommerceClient       │
//! │              └─ store-policy   ─┘   (mock / platform)    │
//! │                                                          │
//! │  System prompt = STOREFRONT_PROMPT + StoreKnowledge      │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod commerce;
pub mod error;
pub mod knowledge;
pub mod model;
pub mod svckit;

use std::sync::Arc;

use agent_core::ToolRegistry;

pub use commerce::{CommerceClient, MockCommerceClient};
pub use error::{Result, StorefrontError};
pub use knowledge::StoreKnowledge;
pub use model::{Order, OrderLine, OrderStatus, Policy, PolicyKind, Product};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{OrderStatusTool, ProductSearchTool, StorePolicyTool};
}

/// System prompt for the storefront assistant
pub const STOREFRONT_PROMPT: &str = r"You are the shopping assistant for an online store. You help customers with orders, products and store policies.

## Guidelines

1. Be friendly, brief and accurate. Answer in plain text.
2. Never guess order details, prices, stock or policy terms. Look them up with a tool.
3. If a customer asks about an order without giving its number, ask for the number.
4. If a tool reports a failure, explain it simply and suggest a next step.
5. Do not make promises the store's policies do not support.

## Tools Available

- `order-status` - Status, items and tracking for an order
- `product-search` - Find products, prices and availability
- `store-policy` - Shipping, returns, payments and privacy policies";

/// Register every storefront tool against one commerce client
pub fn register_tools(registry: &mut ToolRegistry, commerce: Arc<dyn CommerceClient>) -> agent_core::Result<()> {
    registry.register(tools::OrderStatusTool::new(commerce.clone()))?;
    registry.register(tools::ProductSearchTool::new(commerce.clone()))?;
    registry.register(tools::StorePolicyTool::new(commerce))?;

    tracing::info!(tools = registry.len(), "Registered storefront tools");
    Ok(())
}

/// Assistant instructions plus the store context for a question category
pub fn system_prompt(knowledge: &StoreKnowledge, category: Option<&str>) -> String {
    if !knowledge.is_loaded() {
        return STOREFRONT_PROMPT.to_string();
    }

    format!(
        "{STOREFRONT_PROMPT}\n\n## Store Information\n\n{}",
        knowledge.context_for(category)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_tools() {
        let mut registry = ToolRegistry::new();
        register_tools(&mut registry, Arc::new(MockCommerceClient::new())).unwrap();

        assert_eq!(registry.names(), vec!["order-status", "product-search", "store-policy"]);

        // a second registration collides
        let err = register_tools(&mut registry, Arc::new(MockCommerceClient::new())).unwrap_err();
        assert!(matches!(err, agent_core::AgentError::Config(_)));
    }

    #[test]
    fn test_system_prompt_includes_knowledge() {
        let prompt = system_prompt(&StoreKnowledge::defaults(), Some("sizing"));
        assert!(prompt.starts_with(STOREFRONT_PROMPT));
        assert!(prompt.contains("## Store Information"));
        assert!(prompt.contains("### Sizing"));

        assert_eq!(system_prompt(&StoreKnowledge::new(), None), STOREFRONT_PROMPT);
    }
}
