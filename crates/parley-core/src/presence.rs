//! Presence tracking for Parley.
//!
//! The online set is the `online` collection: identities in the order they
//! came online. Adding a present identity and removing an absent one are
//! no-ops, and no-ops do not touch storage.

use crate::error::Result;
use crate::store::{collections, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Point-in-time view of the online set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// Number of online identities.
    pub count: usize,
    /// Online identities, in the order they came online.
    pub users: Vec<String>,
}

/// Online-identity tracker.
#[derive(Clone)]
pub struct Presence {
    store: Arc<Store>,
}

impl Presence {
    /// Create a presence tracker over a store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Mark an identity online.
    ///
    /// Returns `true` if it was not online before.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn mark_online(&self, identity: &str) -> Result<bool> {
        let joined = self
            .store
            .transact(collections::ONLINE, |online: &mut Vec<String>| {
                if online.iter().any(|u| u == identity) {
                    return Ok(false);
                }
                online.push(identity.to_string());
                Ok(true)
            })
            .await?;

        if joined {
            debug!(identity = %identity, "Presence: online");
        }
        Ok(joined)
    }

    /// Mark an identity offline.
    ///
    /// Returns `true` if it was online before.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn mark_offline(&self, identity: &str) -> Result<bool> {
        let left = self
            .store
            .transact(collections::ONLINE, |online: &mut Vec<String>| {
                let before = online.len();
                online.retain(|u| u != identity);
                Ok(online.len() != before)
            })
            .await?;

        if left {
            debug!(identity = %identity, "Presence: offline");
        }
        Ok(left)
    }

    /// Whether an identity is online.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn is_online(&self, identity: &str) -> Result<bool> {
        let online: Vec<String> = self.store.read(collections::ONLINE).await?;
        Ok(online.iter().any(|u| u == identity))
    }

    /// Current online set.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn snapshot(&self) -> Result<PresenceSnapshot> {
        let users: Vec<String> = self.store.read(collections::ONLINE).await?;
        Ok(PresenceSnapshot {
            count: users.len(),
            users,
        })
    }

    /// Remove every online identity for which `keep` returns `false`.
    ///
    /// Returns the removed identities.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn retain(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
        let removed = self
            .store
            .transact(collections::ONLINE, |online: &mut Vec<String>| {
                let (kept, removed): (Vec<String>, Vec<String>) =
                    online.drain(..).partition(|u| keep(u));
                *online = kept;
                Ok(removed)
            })
            .await?;

        for identity in &removed {
            debug!(identity = %identity, "Presence: pruned stale identity");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence() -> Presence {
        Presence::new(Arc::new(Store::in_memory()))
    }

    #[tokio::test]
    async fn test_mark_online_is_idempotent() {
        let presence = presence();

        assert!(presence.mark_online("alice").await.unwrap());
        assert!(!presence.mark_online("alice").await.unwrap());
        assert!(presence.mark_online("bob").await.unwrap());

        let snapshot = presence.snapshot().await.unwrap();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.users, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_mark_offline_is_idempotent() {
        let presence = presence();
        presence.mark_online("alice").await.unwrap();

        assert!(presence.mark_offline("alice").await.unwrap());
        assert!(!presence.mark_offline("alice").await.unwrap());
        assert!(!presence.mark_offline("nobody").await.unwrap());

        assert!(!presence.is_online("alice").await.unwrap());
        assert_eq!(presence.snapshot().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_retain() {
        let presence = presence();
        for user in ["alice", "bob", "carol"] {
            presence.mark_online(user).await.unwrap();
        }

        let removed = presence.retain(|u| u != "bob").await.unwrap();
        assert_eq!(removed, vec!["bob".to_string()]);
        assert_eq!(
            presence.snapshot().await.unwrap().users,
            vec!["alice".to_string(), "carol".to_string()]
        );
    }
}
