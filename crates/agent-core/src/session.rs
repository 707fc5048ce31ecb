//! Session History
//!
//! The agent is stateless between runs: callers pass prior turns in with
//! every question. This module is the boundary where those turns are kept.
//! The server loads a session's history before a run and appends the
//! question and answer afterwards; the agent loop never touches a store.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{ChatHistoryItem, ChatMessage};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage for per-session chat history, oldest first
pub trait HistoryStore: Send + Sync {
    /// All items for a session; empty when the session is unknown
    fn load(&self, id: &SessionId) -> Result<Vec<ChatHistoryItem>>;

    /// Append one item to the end of a session's history
    fn append(&self, id: &SessionId, item: ChatHistoryItem) -> Result<()>;

    /// Forget a session
    fn clear(&self, id: &SessionId) -> Result<()>;

    /// The last `limit` turns, as plain messages ready for [`Agent::ask`](crate::Agent::ask)
    fn recent(&self, id: &SessionId, limit: usize) -> Result<Vec<ChatMessage>> {
        let items = self.load(id)?;
        let skip = items.len().saturating_sub(limit);
        Ok(items.into_iter().skip(skip).map(ChatMessage::from).collect())
    }
}

/// Sessions kept by [`MemoryHistoryStore::new`]
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Items kept per session by [`MemoryHistoryStore::new`]
pub const DEFAULT_MAX_ITEMS_PER_SESSION: usize = 200;

struct SessionLog {
    items: VecDeque<ChatHistoryItem>,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    logs: HashMap<SessionId, SessionLog>,
    clock: u64,
}

/// In-memory history store (for development/testing)
///
/// Bounded in both directions: appending past the per-session cap drops that
/// session's oldest items, and starting a session when the store is full
/// evicts the session that was appended to least recently.
pub struct MemoryHistoryStore {
    sessions: RwLock<Sessions>,
    max_sessions: usize,
    max_items: usize,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, DEFAULT_MAX_ITEMS_PER_SESSION)
    }

    /// Store with explicit caps; zero is treated as one
    pub fn with_limits(max_sessions: usize, max_items_per_session: usize) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
            max_items: max_items_per_session.max(1),
        }
    }

    /// Number of sessions with stored history
    pub fn session_count(&self) -> Result<usize> {
        Ok(self.sessions.read().map_err(poisoned)?.logs.len())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AgentError {
    AgentError::Session("history store lock poisoned".into())
}

impl Sessions {
    fn evict_least_recent(&mut self) {
        let oldest = self
            .logs
            .iter()
            .min_by_key(|(_, log)| log.last_used)
            .map(|(id, _)| id.clone());

        if let Some(id) = oldest {
            self.logs.remove(&id);
            tracing::debug!(session = %id, "Evicted least recently used session");
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, id: &SessionId) -> Result<Vec<ChatHistoryItem>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions
            .logs
            .get(id)
            .map(|log| log.items.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn append(&self, id: &SessionId, item: ChatHistoryItem) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.clock += 1;
        let now = sessions.clock;

        if !sessions.logs.contains_key(id) && sessions.logs.len() >= self.max_sessions {
            sessions.evict_least_recent();
        }

        let log = sessions.logs.entry(id.clone()).or_insert_with(|| SessionLog {
            items: VecDeque::new(),
            last_used: now,
        });
        log.last_used = now;
        log.items.push_back(item);
        while log.items.len() > self.max_items {
            log.items.pop_front();
        }
        Ok(())
    }

    fn clear(&self, id: &SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.logs.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
        assert_eq!(SessionId::from_string("abc").as_str(), "abc");
    }

    #[test]
    fn test_memory_store_keeps_append_order() {
        let store = MemoryHistoryStore::new();
        let id = SessionId::new();

        store.append(&id, ChatHistoryItem::now(ChatMessage::user("Hi"))).unwrap();
        store
            .append(&id, ChatHistoryItem::new(ChatMessage::assistant("Hello!")))
            .unwrap();

        let items = store.load(&id).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].message, ChatMessage::user("Hi"));
        assert!(items[1].created_at.is_none());
        assert_eq!(store.session_count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let store = MemoryHistoryStore::new();
        assert!(store.load(&SessionId::new()).unwrap().is_empty());
    }

    #[test]
    fn test_recent_returns_tail() {
        let store = MemoryHistoryStore::new();
        let id = SessionId::new();
        for i in 0..5 {
            store
                .append(&id, ChatHistoryItem::new(ChatMessage::user(format!("q{i}"))))
                .unwrap();
        }

        let recent = store.recent(&id, 2).unwrap();
        assert_eq!(recent, vec![ChatMessage::user("q3"), ChatMessage::user("q4")]);

        store.clear(&id).unwrap();
        assert!(store.recent(&id, 2).unwrap().is_empty());
    }

    #[test]
    fn test_session_history_is_capped() {
        let store = MemoryHistoryStore::with_limits(4, 3);
        let id = SessionId::new();
        for i in 0..5 {
            store
                .append(&id, ChatHistoryItem::new(ChatMessage::user(format!("q{i}"))))
                .unwrap();
        }

        let kept: Vec<_> = store.load(&id).unwrap().into_iter().map(ChatMessage::from).collect();
        assert_eq!(
            kept,
            vec![ChatMessage::user("q2"), ChatMessage::user("q3"), ChatMessage::user("q4")]
        );
    }

    #[test]
    fn test_least_recently_used_session_is_evicted() {
        let store = MemoryHistoryStore::with_limits(2, 10);
        let (a, b, c) = (SessionId::new(), SessionId::new(), SessionId::new());
        let turn = || ChatHistoryItem::new(ChatMessage::user("hi"));

        store.append(&a, turn()).unwrap();
        store.append(&b, turn()).unwrap();
        store.append(&a, turn()).unwrap();
        store.append(&c, turn()).unwrap();

        assert_eq!(store.session_count().unwrap(), 2);
        assert_eq!(store.load(&a).unwrap().len(), 2);
        assert!(store.load(&b).unwrap().is_empty());
        assert_eq!(store.load(&c).unwrap().len(), 1);
    }

    #[test]
    fn test_many_sessions_stay_bounded() {
        let store = MemoryHistoryStore::with_limits(8, 2);
        for _ in 0..100 {
            let id = SessionId::new();
            for _ in 0..5 {
                store.append(&id, ChatHistoryItem::new(ChatMessage::user("hi"))).unwrap();
            }
            assert!(store.load(&id).unwrap().len() <= 2);
        }
        assert_eq!(store.session_count().unwrap(), 8);
    }
}
