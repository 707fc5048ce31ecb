//! # agent-runtime
//!
//! Model backends implementing [`agent_core::LlmProvider`]. Only Ollama is
//! shipped, behind the default `ollama` feature.
//!
//! ```rust,ignore
//! use agent_runtime::{OllamaConfig, OllamaProvider};
//!
//! // OLLAMA_HOST / OLLAMA_PORT, defaulting to http://localhost:11434
//! let provider = Arc::new(OllamaProvider::from_env());
//! let agent = AgentBuilder::new().provider(provider).tools(registry).build()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
