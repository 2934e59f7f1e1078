//! Live connection registry and fan-out.
//!
//! Each registered connection owns a bounded outbound queue. Publishing never
//! waits: a connection whose queue is full is not writable right now and
//! misses the frame, a connection whose receiver is gone is pruned. Clients
//! recover gaps by reading history from the conversation log.

use dashmap::DashMap;
use parley_protocol::ServerFrame;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace};

/// A connection identifier.
pub type ConnectionId = String;

/// Default outbound queue depth per connection.
const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames that may queue for one connection before it counts as not
    /// writable.
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Registry entry for one live connection.
struct ConnectionEntry {
    sender: mpsc::Sender<Arc<ServerFrame>>,
    /// Identity from the last liveness signal, if any.
    identity: Option<String>,
    last_seen: Instant,
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections the frame was queued for.
    pub delivered: usize,
    /// Connections that were not writable.
    pub skipped: usize,
    /// Dead connections removed from the registry.
    pub pruned: usize,
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Connections that have sent a liveness signal with an identity.
    pub identified_count: usize,
}

/// The broadcast hub.
pub struct Hub {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    next_id: AtomicU64,
    config: HubConfig,
}

impl Hub {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Register a new connection.
    ///
    /// Returns its id and the receiving end of its outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Arc<ServerFrame>>) {
        let id = format!("conn_{:x}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.config.outbound_capacity.max(1));

        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                sender,
                identity: None,
                last_seen: Instant::now(),
            },
        );

        debug!(connection = %id, connections = self.connections.len(), "Connection registered");
        (id, receiver)
    }

    /// Remove a connection.
    ///
    /// Returns `true` if it was registered.
    pub fn unregister(&self, connection_id: &str) -> bool {
        let removed = self.connections.remove(connection_id).is_some();
        if removed {
            debug!(connection = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Record a liveness signal, optionally associating an identity.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn touch(&self, connection_id: &str, identity: Option<&str>) -> bool {
        match self.connections.get_mut(connection_id) {
            Some(mut entry) => {
                entry.last_seen = Instant::now();
                if let Some(identity) = identity {
                    if entry.identity.as_deref() != Some(identity) {
                        debug!(connection = %connection_id, identity = %identity, "Connection identified");
                        entry.identity = Some(identity.to_string());
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Identity associated with a connection.
    #[must_use]
    pub fn identity(&self, connection_id: &str) -> Option<String> {
        self.connections
            .get(connection_id)
            .and_then(|e| e.identity.clone())
    }

    /// Queue a frame for every writable connection.
    pub fn publish(&self, frame: ServerFrame) -> PublishReport {
        let frame = Arc::new(frame);
        let mut report = PublishReport::default();
        let mut dead = Vec::new();

        for entry in self.connections.iter() {
            match entry.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(connection = %entry.key(), "Connection not writable, frame dropped");
                    report.skipped += 1;
                }
                Err(TrySendError::Closed(_)) => dead.push(entry.key().clone()),
            }
        }

        for id in dead {
            if self.connections.remove(&id).is_some() {
                debug!(connection = %id, "Pruned dead connection");
                report.pruned += 1;
            }
        }

        trace!(
            frame = %frame.frame_type(),
            delivered = report.delivered,
            skipped = report.skipped,
            "Published frame"
        );
        report
    }

    /// Identities with at least one connection seen within `timeout`.
    #[must_use]
    pub fn live_identities(&self, timeout: Duration) -> HashSet<String> {
        self.connections
            .iter()
            .filter(|e| e.last_seen.elapsed() <= timeout)
            .filter_map(|e| e.identity.clone())
            .collect()
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connection_count: self.connections.len(),
            identified_count: self
                .connections
                .iter()
                .filter(|e| e.identity.is_some())
                .count(),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
