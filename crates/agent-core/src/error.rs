//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Tool-level failures never leave the agent loop as errors: the loop turns
/// them into observations for the model. Everything here that escapes a run
/// is terminal for that run.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Caller input rejected before any model or tool call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid agent configuration or tool registration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// LLM provider returned an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model completion did not finish in time
    #[error("Model call timed out after {0:?}")]
    ModelTimeout(Duration),

    /// Model kept producing output the loop could not interpret
    #[error("Malformed model output after {attempts} attempt(s): {reason}")]
    MalformedOutput { attempts: usize, reason: String },

    /// The context cannot be brought under the token budget
    #[error("Context length exceeded: {used} tokens (max: {max})")]
    ContextOverflow { used: u32, max: u32 },

    /// Run cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// Stream interrupted after fragments were already delivered
    #[error("Stream aborted: {0}")]
    StreamAborted(String),

    /// History store error
    #[error("Session error: {0}")]
    Session(String),
}

impl AgentError {
    /// Check if the caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ModelUnavailable(_) | AgentError::ModelTimeout(_)
        )
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Validation(_) => "VALIDATION_ERROR",
            AgentError::Config(_) => "CONFIGURATION_ERROR",
            AgentError::UnknownTool(_) => "UNKNOWN_TOOL",
            AgentError::ToolExecution(_) => "TOOL_EXECUTION_ERROR",
            AgentError::Provider(_) => "PROVIDER_ERROR",
            AgentError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            AgentError::ModelTimeout(_) => "MODEL_TIMEOUT",
            AgentError::MalformedOutput { .. } => "MALFORMED_OUTPUT",
            AgentError::ContextOverflow { .. } => "CONTEXT_OVERFLOW",
            AgentError::Cancelled => "CANCELLED",
            AgentError::StreamAborted(_) => "STREAM_ABORTED",
            AgentError::Session(_) => "SESSION_ERROR",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Validation(msg) => msg.clone(),
            AgentError::Provider(_) => "The assistant encountered an error. Please try again.".into(),
            AgentError::ModelUnavailable(_) => "The assistant is currently unavailable. Please try again.".into(),
            AgentError::ModelTimeout(_) => "The assistant took too long to respond. Please try again.".into(),
            AgentError::MalformedOutput { .. } => "The assistant could not produce a usable answer. Please rephrase your question.".into(),
            AgentError::ContextOverflow { .. } => "The conversation is too long for the assistant. Please shorten your question.".into(),
            AgentError::Cancelled => "The request was cancelled.".into(),
            AgentError::StreamAborted(_) => "The response was interrupted.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AgentError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            AgentError::ModelTimeout(Duration::from_secs(1)).code(),
            "MODEL_TIMEOUT"
        );
        assert_eq!(AgentError::StreamAborted("x".into()).code(), "STREAM_ABORTED");
        assert_eq!(AgentError::Session("x".into()).code(), "SESSION_ERROR");
    }

    #[test]
    fn test_retryable() {
        assert!(AgentError::ModelUnavailable("down".into()).is_retryable());
        assert!(!AgentError::Validation("empty".into()).is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
    }
}
