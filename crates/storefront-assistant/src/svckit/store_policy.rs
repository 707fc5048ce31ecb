//! Store Policy Tool

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use agent_core::{ParamType, ParameterSchema, Result as CoreResult, Tool, ToolInput, ToolOutput, ToolSchema};

use crate::commerce::CommerceClient;
use crate::model::PolicyKind;

pub const NAME: &str = "store-policy";

/// Tool for reading a store policy
pub struct StorePolicyTool {
    commerce: Arc<dyn CommerceClient>,
}

impl StorePolicyTool {
    pub fn new(commerce: Arc<dyn CommerceClient>) -> Self {
        Self { commerce }
    }
}

#[async_trait]
impl Tool for StorePolicyTool {
    fn schema(&self) -> ToolSchema {
        let topics = PolicyKind::ALL
            .iter()
            .map(|k| Value::String(k.as_str().into()))
            .collect();

        ToolSchema {
            name: NAME.into(),
            description: "Read the store's official policy on shipping, returns, payments or privacy.".into(),
            parameters: vec![
                ParameterSchema::required("topic", ParamType::String, "Policy topic").with_enum(topics),
            ],
            category: Some("policies".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, input: &ToolInput) -> CoreResult<ToolOutput> {
        let topic = input.get("topic").and_then(Value::as_str).unwrap_or_default();

        let kind: PolicyKind = match topic.parse() {
            Ok(kind) => kind,
            Err(e) => return Ok(super::lookup_failed(NAME, &e)),
        };

        match self.commerce.get_policy(kind).await {
            Ok(policy) => Ok(ToolOutput::success(format!("{}\n{}", policy.title, policy.body))),
            Err(e) => Ok(super::lookup_failed(NAME, &e)),
        }
    }
}
