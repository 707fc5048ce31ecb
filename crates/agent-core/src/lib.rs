//! # agent-core
//!
//! Bounded, tool-using conversational agent with a provider-agnostic LLM
//! abstraction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Agent                               │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐   │
//! │  │  Reasoning  │  │    Tool     │  │   LlmProvider       │   │
//! │  │    Loop     │──│  Registry   │──│   (Strategy)        │   │
//! │  └──────┬──────┘  └─────────────┘  └─────────────────────┘   │
//! │         │                                                    │
//! │  ┌──────┴──────┐  ┌─────────────┐                            │
//! │  │  Streaming  │  │  Protocol   │                            │
//! │  │   Adapter   │  │ tool/answer │                            │
//! │  └─────────────┘  └─────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping model backends without changing
//! agent logic. Runs share no mutable state; one `Agent` serves many
//! concurrent questions.

pub mod error;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod stream;
pub mod tool;

#[cfg(test)]
mod testing;

pub use error::{AgentError, Result};
pub use message::{ChatHistoryItem, ChatMessage, ChatRole, Conversation, Message, Role};
pub use provider::{GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, AgentOutcome, AgentState, AgentTrace, RunStatus, TraceEntry};
pub use session::{HistoryStore, MemoryHistoryStore, SessionId};
pub use stream::{AnswerEvent, AnswerStream};
pub use tool::{
    ParamType, ParameterSchema, Tool, ToolCall, ToolCallResult, ToolInput, ToolOutput, ToolRegistry,
    ToolSchema,
};

pub use tokio_util::sync::CancellationToken;
