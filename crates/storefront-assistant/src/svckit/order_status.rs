//! Order Status Tool
//!
//! Looks up an order's fulfilment state, contents and tracking.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use agent_core::{ParamType, ParameterSchema, Result as CoreResult, Tool, ToolInput, ToolOutput, ToolSchema};

use crate::commerce::CommerceClient;
use crate::model::Order;

pub const NAME: &str = "order-status";

/// Tool for checking an order
pub struct OrderStatusTool {
    commerce: Arc<dyn CommerceClient>,
}

impl OrderStatusTool {
    pub fn new(commerce: Arc<dyn CommerceClient>) -> Self {
        Self { commerce }
    }
}

fn describe(order: &Order) -> String {
    let mut out = format!(
        "Order #{} is {} (placed {}).\nItems:\n",
        order.number,
        order.status,
        order.placed_at.format("%Y-%m-%d")
    );

    for line in &order.lines {
        let _ = writeln!(
            out,
            "  {} x {} @ ${:.2} ({})",
            line.quantity, line.title, line.unit_price, line.sku
        );
    }
    let _ = writeln!(
        out,
        "Shipping: ${:.2}\nTotal: ${:.2} {}",
        order.shipping_cost,
        order.total(),
        order.currency
    );

    if let Some(shipment) = &order.shipment {
        let _ = write!(
            out,
            "Tracking: {} {}",
            shipment.carrier, shipment.tracking_number
        );
        if let Some(eta) = shipment.estimated_delivery {
            let _ = write!(out, ", estimated delivery {}", eta.format("%Y-%m-%d"));
        }
    }

    out.trim_end().to_string()
}

#[async_trait]
impl Tool for OrderStatusTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "Look up a customer's order by order number. Returns status, items, total and tracking.".into(),
            parameters: vec![ParameterSchema::required(
                "order_number",
                ParamType::String,
                "Order number from the confirmation email, e.g. '1001' or '#1001'",
            )],
            category: Some("orders".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, input: &ToolInput) -> CoreResult<ToolOutput> {
        let number = input
            .get("order_number")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if number.trim().trim_start_matches('#').is_empty() {
            return Ok(ToolOutput::failure("order_number must not be empty"));
        }

        match self.commerce.get_order(number).await {
            Ok(order) => Ok(ToolOutput::success(describe(&order))),
            Err(e) => Ok(super::lookup_failed(NAME, &e)),
        }
    }
}
