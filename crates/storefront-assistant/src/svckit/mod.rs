//! Service Kit - Agent Tools
//!
//! Storefront tools that implement `agent_core::Tool`.

mod order_status;
mod product_search;
mod store_policy;

pub use order_status::OrderStatusTool;
pub use product_search::ProductSearchTool;
pub use store_policy::StorePolicyTool;

use agent_core::ToolOutput;

use crate::error::StorefrontError;

/// Domain failures go back to the model as failed observations
fn lookup_failed(tool: &str, err: &StorefrontError) -> ToolOutput {
    if err.is_retryable() {
        tracing::warn!(tool, error = %err, "Commerce lookup failed");
    } else {
        tracing::debug!(tool, error = %err, "Commerce lookup found nothing");
    }
    ToolOutput::failure(err.user_message())
}
