//! Conversation Messages
//!
//! Two layers of message types live here:
//!
//! - [`ChatMessage`] / [`ChatHistoryItem`]: the caller-facing shapes. A history
//!   is an oldest-first slice of these and is read-only to the agent.
//! - [`Message`] / [`Conversation`]: the model-facing sequence the agent loop
//!   builds for one run, including system context and tool observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Role of a turn in caller-supplied history
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl From<ChatRole> for Role {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Assistant,
        }
    }
}

/// One turn of a chat, as exchanged with callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat turn plus an optional creation time.
///
/// The timestamp is for display and audit only. History order is slice
/// order; callers may supply items with missing or unordered timestamps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryItem {
    #[serde(flatten)]
    pub message: ChatMessage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatHistoryItem {
    pub fn new(message: ChatMessage) -> Self {
        Self {
            message,
            created_at: None,
        }
    }

    /// Stamp the item with the current time
    pub fn now(message: ChatMessage) -> Self {
        Self {
            message,
            created_at: Some(Utc::now()),
        }
    }
}

impl From<ChatHistoryItem> for ChatMessage {
    fn from(item: ChatHistoryItem) -> Self {
        item.message
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Optional name (tool name for tool observations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Call this observation answers, for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            timestamp: Utc::now(),
            tool_call_id: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool observation message
    pub fn tool(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        Self {
            tool_call_id,
            ..Self::new(Role::Tool, content)
        }
    }

    /// Add a name to the message
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        // ~4 characters per token, +4 for role overhead
        u32::try_from(self.content.len() / 4)
            .unwrap_or(u32::MAX)
            .saturating_add(4)
    }
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        Self::new(msg.role.into(), msg.content.clone())
    }
}

/// Model-facing message sequence for one agent run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,

    /// Maximum context length (in estimated tokens)
    #[serde(default = "default_max_context")]
    max_context_tokens: u32,
}

const TRUNCATION_MARKER: &str = "\n[output truncated]";

fn default_max_context() -> u32 {
    8192
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            max_context_tokens: default_max_context(),
        }
    }

    /// Set the context budget
    pub fn with_max_context_tokens(mut self, max: u32) -> Self {
        self.max_context_tokens = max;
        self
    }

    pub fn max_context_tokens(&self) -> u32 {
        self.max_context_tokens
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.messages
            .iter()
            .map(Message::estimate_tokens)
            .fold(0, u32::saturating_add)
    }

    /// Whether the estimate is within the budget
    pub fn fits(&self) -> bool {
        self.estimate_tokens() <= self.max_context_tokens
    }

    /// Shrink the conversation toward the budget.
    ///
    /// Older history goes first, oldest turn first; a dropped user turn
    /// takes its assistant reply with it. Next come the oldest tool exchanges
    /// after the latest user message, keeping the newest request and its
    /// observation. Last, that observation is cut short. System messages and
    /// the latest user message are never touched, so the result may still
    /// not fit; check [`Conversation::fits`]. Returns the number of messages
    /// removed.
    pub fn truncate_to_fit(&mut self) -> usize {
        let mut dropped = 0;

        while !self.fits() {
            let Some(removed) = self
                .drop_oldest_history()
                .or_else(|| self.drop_oldest_exchange())
            else {
                break;
            };
            dropped += removed;
        }

        let shortened = !self.fits() && self.shorten_last_observation();

        if dropped > 0 || shortened {
            tracing::debug!(
                dropped,
                shortened,
                remaining = self.messages.len(),
                "Truncated conversation"
            );
        }

        dropped
    }

    fn question_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == Role::User)
    }

    fn drop_oldest_history(&mut self) -> Option<usize> {
        let protected_from = self.question_index().unwrap_or(self.messages.len());
        let pos = self.messages[..protected_from]
            .iter()
            .position(|m| m.role != Role::System)?;

        let removed = self.messages.remove(pos);
        if removed.role == Role::User
            && pos + 1 < protected_from
            && self.messages[pos].role == Role::Assistant
        {
            self.messages.remove(pos);
            return Some(2);
        }
        Some(1)
    }

    /// Remove the first message after the question and the observations
    /// answering it. The last two messages stay.
    fn drop_oldest_exchange(&mut self) -> Option<usize> {
        let start = self.question_index()? + 1;
        if self.messages.len() <= start + 2 {
            return None;
        }

        self.messages.remove(start);
        let mut removed = 1;
        while self.messages.len() > start + 2 && self.messages[start].role == Role::Tool {
            self.messages.remove(start);
            removed += 1;
        }
        Some(removed)
    }

    fn shorten_last_observation(&mut self) -> bool {
        let excess = self.estimate_tokens().saturating_sub(self.max_context_tokens);
        let Some(last) = self.messages.last_mut().filter(|m| m.role == Role::Tool) else {
            return false;
        };

        // one spare token absorbs the rounding in the estimate
        let cut = usize::try_from(excess)
            .unwrap_or(usize::MAX)
            .saturating_add(1)
            .saturating_mul(4)
            .saturating_add(TRUNCATION_MARKER.len());
        let Some(mut keep) = last.content.len().checked_sub(cut).filter(|&keep| keep > 0) else {
            return false;
        };
        while !last.content.is_char_boundary(keep) {
            keep -= 1;
        }

        last.content.truncate(keep);
        last.content.push_str(TRUNCATION_MARKER);
        true
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(tag: &str) -> String {
        format!("{tag} {}", "x".repeat(396))
    }

    fn conversation(system: &str, max_context_tokens: u32) -> Conversation {
        let mut conv = Conversation::new().with_max_context_tokens(max_context_tokens);
        conv.push(Message::system(system));
        conv
    }

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_conversation() {
        let mut conv = conversation("You are helpful.", 8192);
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant("Hello!"));

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn test_history_item_serde_is_flat() {
        let item: ChatHistoryItem =
            serde_json::from_str(r#"{"role":"assistant","content":"Hi there"}"#).unwrap();
        assert_eq!(item.message, ChatMessage::assistant("Hi there"));
        assert!(item.created_at.is_none());

        let json = serde_json::to_value(ChatHistoryItem::new(ChatMessage::user("q"))).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "q"}));
    }

    #[test]
    fn test_truncate_drops_oldest_pairs_first() {
        // each padded message is ~104 estimated tokens
        let mut conv = conversation("sys", 330);
        conv.push(Message::user(padded("q1")));
        conv.push(Message::assistant(padded("a1")));
        conv.push(Message::user(padded("q2")));
        conv.push(Message::assistant(padded("a2")));
        conv.push(Message::user(padded("q3")));

        let dropped = conv.truncate_to_fit();

        assert_eq!(dropped, 2);
        let contents: Vec<_> = conv.messages().iter().map(|m| &m.content[..2]).collect();
        assert_eq!(contents, vec!["sy", "q2", "a2", "q3"]);
    }

    #[test]
    fn test_truncate_preserves_system_and_question() {
        let mut conv = conversation("sys", 10);
        conv.push(Message::user(padded("old")));
        conv.push(Message::assistant(padded("reply")));
        conv.push(Message::user(padded("question")));
        conv.push(Message::tool(padded("observation"), None));

        conv.truncate_to_fit();

        let roles: Vec<_> = conv.messages().iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Tool]);
        assert!(conv.messages()[1].content.starts_with("question"));
    }

    #[test]
    fn test_truncate_is_noop_within_budget() {
        let mut conv = conversation("sys", 8192);
        conv.push(Message::user("short"));
        assert_eq!(conv.truncate_to_fit(), 0);
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn test_truncate_drops_oldest_tool_exchanges() {
        let mut conv = conversation("sys", 330);
        conv.push(Message::user(padded("q")));
        for n in 1..=3 {
            conv.push(Message::assistant(padded(&format!("a{n}"))));
            conv.push(Message::tool(padded(&format!("t{n}")), None));
        }

        let dropped = conv.truncate_to_fit();

        assert_eq!(dropped, 4);
        assert!(conv.fits());
        let contents: Vec<_> = conv.messages().iter().map(|m| &m.content[..2]).collect();
        assert_eq!(contents, vec!["sy", "q ", "a3", "t3"]);
    }

    #[test]
    fn test_truncate_shortens_newest_observation() {
        let mut conv = conversation("sys", 200);
        conv.push(Message::user("where is my order"));
        conv.push(Message::assistant("lookup"));
        conv.push(Message::tool("y".repeat(8000), None));

        conv.truncate_to_fit();

        assert!(conv.fits());
        assert_eq!(conv.len(), 4);
        let observation = &conv.last().unwrap().content;
        assert!(observation.starts_with("yyyy"));
        assert!(observation.ends_with("[output truncated]"));
    }

    #[test]
    fn test_truncate_reports_when_nothing_fits() {
        let mut conv = conversation("sys", 200);
        conv.push(Message::user("where is my order"));
        conv.push(Message::assistant("z".repeat(4000)));
        conv.push(Message::tool("shipped", None));

        assert_eq!(conv.truncate_to_fit(), 0);
        assert!(!conv.fits());
        assert_eq!(conv.last().unwrap().content, "shipped");
    }
}
