//! The engine wires the store, logs, directory, presence and hub together.
//!
//! It is the surface the request layer talks to: every operation resolves to
//! one store transaction, and new messages are handed to the hub only after
//! they are durable, in commit order.

use crate::conversation::{ConversationLog, DEFAULT_HISTORY_LIMIT};
use crate::directory::Directory;
use crate::error::Result;
use crate::hub::{ConnectionId, Hub, HubConfig, PublishReport};
use crate::presence::Presence;
use crate::store::Store;
use parley_protocol::{Message, ServerFrame};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Messages kept per conversation.
    pub history_limit: usize,
    /// Hub configuration.
    pub hub: HubConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            hub: HubConfig::default(),
        }
    }
}

/// A committed message and how its fan-out went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The message as stored.
    pub message: Message,
    /// Outcome of pushing it to live connections.
    pub report: PublishReport,
}

/// Shared state of a Parley node.
pub struct Engine {
    store: Arc<Store>,
    log: ConversationLog,
    directory: Directory,
    presence: Presence,
    hub: Hub,
}

impl Engine {
    /// Create an engine over a store.
    #[must_use]
    pub fn new(store: Store, config: EngineConfig) -> Self {
        let store = Arc::new(store);
        info!(
            backend = store.backend_name(),
            history_limit = config.history_limit,
            "Creating engine"
        );

        Self {
            log: ConversationLog::with_limit(Arc::clone(&store), config.history_limit),
            directory: Directory::new(Arc::clone(&store)),
            presence: Presence::new(Arc::clone(&store)),
            hub: Hub::with_config(config.hub),
            store,
        }
    }

    /// Open an engine backed by files in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the directory cannot be created.
    pub async fn open(data_dir: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        Ok(Self::new(Store::open(data_dir).await?, config))
    }

    /// Create an engine that keeps everything in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Store::in_memory(), EngineConfig::default())
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Conversation history.
    #[must_use]
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Chats and channels.
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Online identities.
    #[must_use]
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Live connections.
    #[must_use]
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Append a message and push it to every live connection.
    ///
    /// The push happens after the append is durable, before the next append
    /// to the log commits, so subscribers see messages in commit order.
    ///
    /// # Errors
    ///
    /// Returns the append error; nothing is pushed in that case.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        from: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Delivery> {
        let mut report = PublishReport::default();

        let message = self
            .log
            .append_then(conversation_id, from, text, |message| {
                report = self.hub.publish(ServerFrame::new_message(message.clone()));
                debug!(
                    conversation = %conversation_id,
                    message = %message.id,
                    delivered = report.delivered,
                    skipped = report.skipped,
                    "Message fanned out"
                );
            })
            .await?;

        Ok(Delivery { message, report })
    }

    /// Register a live connection.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Arc<ServerFrame>>) {
        self.hub.register()
    }

    /// Forget a live connection. Presence is left alone; sockets and
    /// identities have independent lifetimes.
    pub fn disconnect(&self, connection_id: &str) {
        self.hub.unregister(connection_id);
    }

    /// Handle a liveness signal from a connection.
    ///
    /// With an identity, the connection is associated with it and the
    /// identity is marked online. Returns `true` if the identity just came
    /// online.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error from the presence update.
    pub async fn liveness(&self, connection_id: &str, identity: Option<&str>) -> Result<bool> {
        self.hub.touch(connection_id, identity);
        match identity {
            Some(identity) => self.presence.mark_online(identity).await,
            None => Ok(false),
        }
    }

    /// Mark offline every online identity without a connection that
    /// signalled liveness within `timeout`.
    ///
    /// Returns the identities that were marked offline.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn sweep_presence(&self, timeout: Duration) -> Result<Vec<String>> {
        let live = self.hub.live_identities(timeout);
        self.presence.retain(|identity| live.contains(identity)).await
    }
}
