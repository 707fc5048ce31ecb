//! Guard Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors from the encryption and verification collaborators
#[derive(Error, Debug)]
pub enum GuardError {
    /// Key material could not be turned into a 256-bit key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Input is not ciphertext produced by [`SecretBox`](crate::SecretBox)
    #[error("Invalid encrypted format: {0}")]
    InvalidFormat(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, or the ciphertext was altered
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The verification service could not be reached or answered nonsense
    #[error("Verification service error: {0}")]
    Verification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GuardError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, GuardError::Verification(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            GuardError::Verification(_) => "Verification is temporarily unavailable. Please try again.",
            GuardError::InvalidFormat(_) | GuardError::Decryption(_) => "Stored data could not be read.",
            _ => "An error occurred processing your request.",
        }
    }
}
