//! Error Types for the Storefront Assistant

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorefrontError>;

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unknown policy topic: {0}")]
    UnknownPolicy(String),

    #[error("Commerce platform error: {0}")]
    Commerce(String),

    #[error("Commerce platform unavailable: {0}")]
    Unavailable(String),

    #[error("Store knowledge error: {0}")]
    Knowledge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorefrontError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorefrontError::Unavailable(_))
    }

    /// Text shown to the model when a lookup fails
    pub fn user_message(&self) -> String {
        match self {
            StorefrontError::OrderNotFound(number) => format!(
                "No order with number '{number}' was found. Ask the customer to double-check the number from their confirmation email."
            ),
            StorefrontError::UnknownPolicy(topic) => format!("There is no store policy about '{topic}'."),
            StorefrontError::Unavailable(_) => {
                "The store system is temporarily unavailable. Try again shortly.".into()
            }
            other => other.to_string(),
        }
    }
}

impl From<StorefrontError> for agent_core::AgentError {
    fn from(err: StorefrontError) -> Self {
        match err {
            StorefrontError::Knowledge(msg) => agent_core::AgentError::Config(msg),
            other => agent_core::AgentError::ToolExecution(other.to_string()),
        }
    }
}
