//! Encrypted history at rest
//!
//! Wraps any [`HistoryStore`] so message content is stored as ciphertext.
//! Roles and timestamps stay readable for ordering and audit.

use agent_core::{AgentError, ChatHistoryItem, HistoryStore, SessionId};

use crate::secrets::SecretBox;

pub struct SealedHistoryStore<S> {
    inner: S,
    secrets: SecretBox,
}

impl<S: HistoryStore> SealedHistoryStore<S> {
    pub fn new(inner: S, secrets: SecretBox) -> Self {
        Self { inner, secrets }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn session_error(e: crate::GuardError) -> AgentError {
    AgentError::Session(e.to_string())
}

impl<S: HistoryStore> HistoryStore for SealedHistoryStore<S> {
    fn load(&self, id: &SessionId) -> agent_core::Result<Vec<ChatHistoryItem>> {
        self.inner
            .load(id)?
            .into_iter()
            .map(|mut item| {
                item.message.content = self.secrets.decrypt(&item.message.content).map_err(session_error)?;
                Ok(item)
            })
            .collect()
    }

    fn append(&self, id: &SessionId, mut item: ChatHistoryItem) -> agent_core::Result<()> {
        item.message.content = self.secrets.encrypt(&item.message.content).map_err(session_error)?;
        self.inner.append(id, item)
    }

    fn clear(&self, id: &SessionId) -> agent_core::Result<()> {
        self.inner.clear(id)
    }
}

#[cfg(test)]
mod tests {
    use agent_core::{ChatMessage, MemoryHistoryStore};

    use super::*;
    use crate::secrets::KEY_LENGTH;

    #[test]
    fn test_content_is_encrypted_at_rest() {
        let store = SealedHistoryStore::new(MemoryHistoryStore::new(), SecretBox::new([3u8; KEY_LENGTH]));
        let id = SessionId::new();

        store
            .append(&id, ChatHistoryItem::now(ChatMessage::user("my order is #1001")))
            .unwrap();

        let raw = store.inner().load(&id).unwrap();
        assert!(SecretBox::is_sealed(&raw[0].message.content));
        assert!(raw[0].created_at.is_some());

        let items = store.load(&id).unwrap();
        assert_eq!(items[0].message, ChatMessage::user("my order is #1001"));
    }

    #[test]
    fn test_foreign_plaintext_fails_loudly() {
        let inner = MemoryHistoryStore::new();
        let id = SessionId::new();
        inner
            .append(&id, ChatHistoryItem::new(ChatMessage::assistant("not sealed")))
            .unwrap();

        let store = SealedHistoryStore::new(inner, SecretBox::new([3u8; KEY_LENGTH]));

        assert!(matches!(store.load(&id), Err(AgentError::Session(_))));
    }
}
