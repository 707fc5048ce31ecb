//! Tool System
//!
//! Named capabilities the agent may invoke. Each tool declares its input
//! contract as a [`ToolSchema`]; the registry checks the schema when the tool
//! is registered and checks every input against it before the tool runs.
//!
//! Invocation never fails hard for anything the tool itself does: invalid
//! input, executor errors, panics and timeouts all come back as a
//! [`ToolCallResult`] with `success == false`, so the agent loop can hand the
//! failure to the model as an observation. Only an unknown tool name is an
//! `Err`.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::protocol::TOOL_FENCE;

/// Validated tool arguments
pub type ToolInput = serde_json::Map<String, Value>;

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments object (validated against the tool schema on invocation)
    #[serde(default)]
    pub arguments: Value,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

/// What a tool produces: text plus a success flag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub success: bool,
}

impl ToolOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: false,
        }
    }
}

/// Record of one tool invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Tool that was called
    pub tool_name: String,

    /// Call ID (if provided in request)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    /// Input as seen by the tool (defaults applied) or as received when rejected
    pub input: Value,

    /// Output text (success message or failure description)
    pub output: String,

    /// Whether execution succeeded
    pub success: bool,
}

impl ToolCallResult {
    pub fn success(tool_name: impl Into<String>, input: Value, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id: None,
            input,
            output: output.into(),
            success: true,
        }
    }

    pub fn failure(tool_name: impl Into<String>, input: Value, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id: None,
            input,
            output: error.into(),
            success: false,
        }
    }

    pub fn with_call_id(mut self, id: Option<String>) -> Self {
        self.call_id = id;
        self
    }
}

/// JSON type of a tool parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// Whether a JSON value has this type
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
            }
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        };
        f.write_str(name)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Tool definition schema (rendered into the system prompt)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// Check the schema itself. Run once at registration.
    pub fn check(&self) -> Result<()> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid_name {
            return Err(AgentError::Config(format!(
                "invalid tool name '{}': use lowercase letters, digits, '-' or '_'",
                self.name
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for param in &self.parameters {
            if param.name.is_empty() || !seen.insert(param.name.as_str()) {
                return Err(AgentError::Config(format!(
                    "tool '{}': duplicate or empty parameter name '{}'",
                    self.name, param.name
                )));
            }
            if let Some(default) = &param.default {
                if !param.param_type.matches(default) {
                    return Err(AgentError::Config(format!(
                        "tool '{}': default for '{}' is not a {}",
                        self.name, param.name, param.param_type
                    )));
                }
            }
            if let Some(values) = &param.enum_values {
                if values.is_empty() || values.iter().any(|v| !param.param_type.matches(v)) {
                    return Err(AgentError::Config(format!(
                        "tool '{}': enum for '{}' must be non-empty {} values",
                        self.name, param.name, param.param_type
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check an input against the schema, filling in defaults.
    ///
    /// Returns every violation found, joined into one readable message.
    pub fn validate_input(&self, input: &Value) -> std::result::Result<ToolInput, String> {
        let mut args = match input {
            Value::Null => ToolInput::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(format!(
                    "arguments must be a JSON object, got {}",
                    json_kind(other)
                ));
            }
        };

        let mut problems = Vec::new();

        for key in args.keys() {
            if !self.parameters.iter().any(|p| &p.name == key) {
                problems.push(format!("unknown parameter '{key}'"));
            }
        }

        for param in &self.parameters {
            match args.get(&param.name) {
                Some(value) if !value.is_null() => {
                    if !param.param_type.matches(value) {
                        problems.push(format!(
                            "parameter '{}' must be a {}, got {}",
                            param.name,
                            param.param_type,
                            json_kind(value)
                        ));
                    } else if let Some(allowed) = &param.enum_values {
                        if !allowed.contains(value) {
                            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
                            problems.push(format!(
                                "parameter '{}' must be one of {}",
                                param.name,
                                options.join(", ")
                            ));
                        }
                    }
                }
                _ => {
                    args.remove(&param.name);
                    if param.required {
                        problems.push(format!("missing required parameter '{}'", param.name));
                    } else if let Some(default) = &param.default {
                        args.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(args)
        } else {
            Err(problems.join("; "))
        }
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with arguments that already passed schema validation
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Adapter turning an async closure into a [`Tool`]
struct FnTool<F> {
    schema: ToolSchema,
    executor: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput>> + Send,
{
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        (self.executor)(input.clone()).await
    }
}

struct RegisteredTool {
    schema: ToolSchema,
    tool: Arc<dyn Tool>,
}

/// Registry for available tools
///
/// Populate it at startup, then share it behind an `Arc`. Registration is the
/// only mutation; invocation borrows the registry immutably.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let schema = tool.schema();
        schema.check()?;

        if self.tools.contains_key(&schema.name) {
            return Err(AgentError::Config(format!(
                "tool '{}' is already registered",
                schema.name
            )));
        }

        tracing::debug!(tool = %schema.name, "Registered tool");
        self.tools
            .insert(schema.name.clone(), RegisteredTool { schema, tool });
        Ok(())
    }

    /// Register an async closure as a tool
    pub fn register_fn<F, Fut>(&mut self, schema: ToolSchema, executor: F) -> Result<()>
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        self.register(FnTool { schema, executor })
    }

    /// Invoke a tool with no time limit
    pub async fn invoke(&self, name: &str, input: Value) -> Result<ToolCallResult> {
        self.run(name, input, None).await
    }

    /// Invoke a tool, failing the call (not the caller) if it exceeds `timeout`
    pub async fn invoke_with_timeout(
        &self,
        name: &str,
        input: Value,
        timeout: Duration,
    ) -> Result<ToolCallResult> {
        self.run(name, input, Some(timeout)).await
    }

    async fn run(&self, name: &str, input: Value, timeout: Option<Duration>) -> Result<ToolCallResult> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;

        let args = match entry.schema.validate_input(&input) {
            Ok(args) => args,
            Err(reason) => {
                tracing::warn!(tool = %name, %reason, "Rejected tool input");
                return Ok(ToolCallResult::failure(
                    name,
                    input,
                    format!("Invalid input for tool '{name}': {reason}"),
                ));
            }
        };
        let normalized = Value::Object(args.clone());

        let execution = AssertUnwindSafe(entry.tool.execute(&args)).catch_unwind();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(tool = %name, ?limit, "Tool timed out");
                    return Ok(ToolCallResult::failure(
                        name,
                        normalized,
                        format!("Tool '{name}' timed out after {limit:?}"),
                    ));
                }
            },
            None => execution.await,
        };

        let result = match outcome {
            Ok(Ok(output)) => ToolCallResult {
                tool_name: name.to_string(),
                call_id: None,
                input: normalized,
                output: output.text,
                success: output.success,
            },
            Ok(Err(e)) => {
                tracing::warn!(tool = %name, error = %e, "Tool execution failed");
                ToolCallResult::failure(name, normalized, format!("Tool '{name}' failed: {e}"))
            }
            Err(_) => {
                tracing::error!(tool = %name, "Tool panicked");
                ToolCallResult::failure(name, normalized, format!("Tool '{name}' crashed while running"))
            }
        };

        Ok(result)
    }

    /// Get all tool schemas, in name order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }

    /// Get tool names, in name order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str(
            "To use a tool, reply with nothing but a tool block, starting at the very first character of your reply:\n\n",
        );
        prompt.push_str(TOOL_FENCE);
        prompt.push_str("\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");
        prompt.push_str("Request one tool per reply. The tool result will be sent back to you.\n\n");

        for schema in self.tools.values().map(|t| &t.schema) {
            prompt.push_str(&format!("### {}\n{}\n", schema.name, schema.description));

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "- `{}` ({}){}: {}",
                        param.name, param.param_type, required, param.description
                    ));
                    if let Some(values) = &param.enum_values {
                        let options: Vec<String> = values.iter().map(Value::to_string).collect();
                        prompt.push_str(&format!(" One of: {}.", options.join(", ")));
                    }
                    if let Some(default) = &param.default {
                        prompt.push_str(&format!(" Default: {default}."));
                    }
                    prompt.push('\n');
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}
