//! Product Search Tool

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use agent_core::{ParamType, ParameterSchema, Result as CoreResult, Tool, ToolInput, ToolOutput, ToolSchema};

use crate::commerce::CommerceClient;

pub const NAME: &str = "product-search";

const DEFAULT_LIMIT: u64 = 5;
const MAX_LIMIT: u64 = 20;

/// Tool for searching the catalog
pub struct ProductSearchTool {
    commerce: Arc<dyn CommerceClient>,
}

impl ProductSearchTool {
    pub fn new(commerce: Arc<dyn CommerceClient>) -> Self {
        Self { commerce }
    }
}

#[async_trait]
impl Tool for ProductSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "Search the store catalog. Returns matching products with price, sale price and availability.".into(),
            parameters: vec![
                ParameterSchema::required("query", ParamType::String, "What the customer is looking for, e.g. 'waterproof boots'"),
                ParameterSchema::optional("limit", ParamType::Integer, "Maximum number of results (1-20)")
                    .with_default(json!(DEFAULT_LIMIT)),
            ],
            category: Some("products".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, input: &ToolInput) -> CoreResult<ToolOutput> {
        let query = input.get("query").and_then(|v| v.as_str()).unwrap_or_default().trim();
        if query.is_empty() {
            return Ok(ToolOutput::failure("query must not be empty"));
        }

        let limit = input
            .get("limit")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Ok(ToolOutput::failure(format!("limit must be between 1 and {MAX_LIMIT}")));
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let products = match self.commerce.search_products(query, limit).await {
            Ok(products) => products,
            Err(e) => return Ok(super::lookup_failed(NAME, &e)),
        };

        if products.is_empty() {
            return Ok(ToolOutput::success(format!("No products match '{query}'.")));
        }

        let mut out = format!("Products matching '{query}':\n");
        for product in &products {
            let price = match product.compare_at_price {
                Some(was) if product.on_sale() => format!("${:.2} (on sale, was ${:.2})", product.price, was),
                _ => format!("${:.2}", product.price),
            };
            let stock = if product.available { "in stock" } else { "out of stock" };
            let _ = writeln!(out, "  {} - {} - {} [/products/{}]", product.title, price, stock, product.handle);
        }

        Ok(ToolOutput::success(out.trim_end()))
    }
}
