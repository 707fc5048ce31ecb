//! # agent-guard
//!
//! Collaborators that sit in front of and beside the assistant:
//!
//! - [`SecretBox`]: AES-256-GCM encryption of stored string fields, with the
//!   key injected at construction.
//! - [`BotVerifier`]: challenge-token checks gating the ask endpoints
//!   ([`TurnstileVerifier`], or [`DisabledVerifier`] for development).
//! - [`SealedHistoryStore`]: a history store wrapper that keeps message
//!   content encrypted at rest.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_guard::{SecretBox, SealedHistoryStore};
//! use agent_core::MemoryHistoryStore;
//!
//! let secrets = SecretBox::from_secret(&std::env::var("SECRET_KEY")?)?;
//! let history = SealedHistoryStore::new(MemoryHistoryStore::new(), secrets);
//! ```

mod error;
mod sealed;
mod secrets;
mod verification;

pub use error::{GuardError, Result};
pub use sealed::SealedHistoryStore;
pub use secrets::{KEY_LENGTH, SecretBox};
pub use verification::{BotVerifier, DisabledVerifier, TURNSTILE_VERIFY_URL, TurnstileVerifier};
