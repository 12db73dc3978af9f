//! Per-session conversation memory.
//!
//! Chat pipelines receive a [`SessionStore`] at construction time instead of
//! reaching for a process-wide map. [`InMemorySessionStore`] is the default
//! backend; a durable keyed store can implement the same trait.

mod inmemory;
mod message;

pub use inmemory::InMemorySessionStore;
pub use message::{ChatMessage, Role};

use crate::errors::ExternalServiceError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Keyed store of conversation histories.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Returns the history for a session, oldest first.
    ///
    /// An unknown session has an empty history.
    async fn get(&self, session_id: &str) -> Result<Vec<ChatMessage>, ExternalServiceError>;

    /// Appends one message to a session, creating the session if needed.
    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<(), ExternalServiceError>;

    /// Appends the messages of one turn so they stay adjacent in the history.
    ///
    /// The default appends one by one; stores that can write a batch
    /// atomically should override it.
    async fn append_turn(&self, session_id: &str, messages: Vec<ChatMessage>) -> Result<(), ExternalServiceError> {
        for message in messages {
            self.append(session_id, message).await?;
        }
        Ok(())
    }
}
