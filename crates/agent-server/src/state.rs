//! Application State

use std::sync::Arc;

use agent_core::{Agent, HistoryStore, LlmProvider, ToolRegistry};
use agent_guard::BotVerifier;
use storefront_assistant::StoreKnowledge;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// LLM provider (Ollama, etc.)
    pub provider: Arc<dyn LlmProvider>,

    /// Storefront tools, shared by every request
    pub tools: Arc<ToolRegistry>,

    pub knowledge: Arc<StoreKnowledge>,

    pub config: Arc<ServerConfig>,

    /// Gate in front of the ask endpoints
    pub verifier: Arc<dyn BotVerifier>,

    /// Per-session history for requests that name a session
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    /// Agent for one request, with store context for the question category
    pub fn agent(&self, category: Option<&str>) -> Agent {
        let prompt = storefront_assistant::system_prompt(&self.knowledge, category);
        Agent::new(
            self.provider.clone(),
            self.tools.clone(),
            self.config.agent_config(prompt),
        )
    }
}
