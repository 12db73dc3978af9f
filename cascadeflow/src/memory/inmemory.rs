//! Process-local session store.

use super::{ChatMessage, SessionStore};
use crate::errors::ExternalServiceError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

type History = Arc<Mutex<Vec<ChatMessage>>>;

/// Session store held in process memory.
///
/// Each session gets its own lock, created lazily on first access, so
/// concurrent runs for different sessions never contend. Sessions are
/// never evicted.
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, History>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sessions seen so far.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn history(&self, session_id: &str) -> History {
        // Clone the Arc so the map shard lock is released before the session lock is taken.
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .value()
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Vec<ChatMessage>, ExternalServiceError> {
        Ok(self.history(session_id).lock().clone())
    }

    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<(), ExternalServiceError> {
        let history = self.history(session_id);
        history.lock().push(message);
        tracing::trace!(session_id, "Appended chat message");
        Ok(())
    }

    async fn append_turn(&self, session_id: &str, messages: Vec<ChatMessage>) -> Result<(), ExternalServiceError> {
        let history = self.history(session_id);
        let count = messages.len();
        history.lock().extend(messages);
        tracing::trace!(session_id, count, "Appended chat turn");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;

    #[tokio::test]
    async fn test_unknown_session_is_empty_and_created_lazily() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.session_count(), 0);

        let history = store.get("nobody").await.unwrap();
        assert!(history.is_empty());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = InMemorySessionStore::new();
        store.append("s1", ChatMessage::user("hello")).await.unwrap();
        store.append("s1", ChatMessage::assistant("hi there")).await.unwrap();

        let history = store.get("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "hi there");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = InMemorySessionStore::new();
        store.append("a", ChatMessage::user("for a")).await.unwrap();
        store.append("b", ChatMessage::user("for b")).await.unwrap();

        assert_eq!(store.get("a").await.unwrap()[0].content, "for a");
        assert_eq!(store.get("b").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let store = InMemorySessionStore::new();
        let mut handles = Vec::new();

        for session in 0..4 {
            for turn in 0..25 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store
                        .append(&format!("s{session}"), ChatMessage::user(format!("m{turn}")))
                        .await
                        .unwrap();
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.session_count(), 4);
        for session in 0..4 {
            assert_eq!(store.get(&format!("s{session}")).await.unwrap().len(), 25);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_turns_stay_contiguous() {
        let store = InMemorySessionStore::new();
        let mut handles = Vec::new();

        for turn in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let messages = vec![
                    ChatMessage::user(format!("q{turn}")),
                    ChatMessage::assistant(format!("a{turn}")),
                ];
                store.append_turn("shared", messages).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.get("shared").await.unwrap();
        assert_eq!(history.len(), 100);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }
}
