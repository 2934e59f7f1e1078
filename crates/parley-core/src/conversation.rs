//! Bounded, ordered message history per conversation.
//!
//! All logs share the `messages` collection, a map from conversation id to
//! that conversation's messages, oldest first.

use crate::error::Result;
use crate::ids::{generate_message_id, now_millis, validate_key};
use crate::store::{collections, Store};
use parley_protocol::Message;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Default number of messages kept per conversation.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Shape of the `messages` collection.
pub type MessageLogs = BTreeMap<String, Vec<Message>>;

/// Append-only conversation history with FIFO eviction.
#[derive(Clone)]
pub struct ConversationLog {
    store: Arc<Store>,
    limit: usize,
}

impl ConversationLog {
    /// Create a log keeping [`DEFAULT_HISTORY_LIMIT`] messages per conversation.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_limit(store, DEFAULT_HISTORY_LIMIT)
    }

    /// Create a log with a custom per-conversation bound (at least 1).
    #[must_use]
    pub fn with_limit(store: Arc<Store>, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
        }
    }

    /// Get the per-conversation bound.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Append a message and return it as committed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a bad conversation id, or a storage error.
    pub async fn append(
        &self,
        conversation_id: &str,
        from: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Message> {
        self.append_then(conversation_id, from, text, |_| ()).await
    }

    /// Append a message, then run `on_commit` with it while appends to the
    /// log are still serialized.
    ///
    /// `on_commit` sees messages in exactly the order they were committed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a bad conversation id, or a storage error.
    pub async fn append_then(
        &self,
        conversation_id: &str,
        from: impl Into<String>,
        text: impl Into<String>,
        on_commit: impl FnOnce(&Message),
    ) -> Result<Message> {
        validate_key(conversation_id)?;

        let from = from.into();
        let text = text.into();
        let limit = self.limit;

        self.store
            .transact_then(
                collections::MESSAGES,
                |logs: &mut MessageLogs| {
                    let log = logs.entry(conversation_id.to_string()).or_default();

                    // Never step backwards in time within a log, even if the
                    // wall clock does.
                    let last = log.last().map(|m| m.time).unwrap_or_default();
                    let time = now_millis().max(last);

                    let message = Message {
                        id: generate_message_id(time),
                        conversation_id: conversation_id.to_string(),
                        from,
                        text,
                        time,
                    };
                    log.push(message.clone());

                    if log.len() > limit {
                        let evicted = log.len() - limit;
                        log.drain(..evicted);
                        debug!(conversation = %conversation_id, evicted, "Evicted oldest messages");
                    }

                    Ok(message)
                },
                on_commit,
            )
            .await
    }

    /// Read a conversation's history, oldest first.
    ///
    /// A conversation without history reads as empty.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn read(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut logs: MessageLogs = self.store.read(collections::MESSAGES).await?;
        Ok(logs.remove(conversation_id).unwrap_or_default())
    }

    /// Ids of all conversations that have history.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn conversations(&self) -> Result<Vec<String>> {
        let logs: MessageLogs = self.store.read(collections::MESSAGES).await?;
        Ok(logs.into_keys().collect())
    }
}
