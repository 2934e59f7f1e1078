//! Chat-pair and channel bookkeeping.
//!
//! Chats live in the `chats` collection, channels in `channels`. The `users`
//! collection belongs to the external identity layer; the directory only
//! reads it, for search and the public user list.

use crate::error::{Error, Result};
use crate::ids::{chat_id, now_millis, validate_key};
use crate::store::{collections, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Canonical id, see [`chat_id`].
    pub id: String,
    /// First participant, as given at creation.
    pub user1: String,
    /// Second participant, as given at creation.
    pub user2: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created: u64,
}

impl Chat {
    /// Whether `identity` takes part in this chat.
    #[must_use]
    pub fn involves(&self, identity: &str) -> bool {
        self.user1 == identity || self.user2 == identity
    }
}

/// A broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Unique lowercase handle; also the channel's conversation id.
    #[serde(rename = "user")]
    pub handle: String,
    /// Identity that created the channel.
    pub owner: String,
    /// Subscribed identities, in subscription order. Starts with the owner.
    #[serde(default)]
    pub subscribers: Vec<String>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub created: u64,
}

impl Channel {
    /// Whether `identity` owns or follows this channel.
    #[must_use]
    pub fn includes(&self, identity: &str) -> bool {
        self.owner == identity || self.subscribers.iter().any(|s| s == identity)
    }
}

/// Public view of a registered identity.
///
/// Unknown fields in the `users` collection (credentials, ban flags) are
/// ignored on read and never leave the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: String,
    pub user: String,
    pub avatar: String,
    pub verified: bool,
    pub role: String,
}

/// Chats and channels visible to one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub chats: Vec<Chat>,
    pub channels: Vec<Channel>,
}

/// A search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchHit {
    User {
        name: String,
        user: String,
        avatar: String,
        verified: bool,
    },
    Channel {
        name: String,
        user: String,
    },
}

/// Result of a subscribe request. Every variant is a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// The subscriber was added.
    Added,
    /// The subscriber was already a member.
    AlreadySubscribed,
    /// No channel has this handle; nothing was created.
    NoSuchChannel,
}

/// Chat and channel registry.
#[derive(Clone)]
pub struct Directory {
    store: Arc<Store>,
}

impl Directory {
    /// Create a directory over a store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Return the id of the chat between `a` and `b`, creating it if needed.
    ///
    /// Idempotent: both argument orders yield the same id and at most one
    /// record exists per pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a bad identity, or a storage error.
    pub async fn ensure_chat(&self, a: &str, b: &str) -> Result<String> {
        validate_key(a)?;
        validate_key(b)?;

        let id = chat_id(a, b);
        self.store
            .transact(collections::CHATS, |chats: &mut Vec<Chat>| {
                if !chats.iter().any(|c| c.id == id) {
                    chats.push(Chat {
                        id: id.clone(),
                        user1: a.to_string(),
                        user2: b.to_string(),
                        created: now_millis(),
                    });
                    debug!(chat = %id, "Chat created");
                }
                Ok(())
            })
            .await?;

        Ok(id)
    }

    /// Chats and channels `identity` takes part in.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn list_for(&self, identity: &str) -> Result<Listing> {
        let chats: Vec<Chat> = self.store.read(collections::CHATS).await?;
        let channels: Vec<Channel> = self.store.read(collections::CHANNELS).await?;

        Ok(Listing {
            chats: chats.into_iter().filter(|c| c.involves(identity)).collect(),
            channels: channels
                .into_iter()
                .filter(|c| c.includes(identity))
                .collect(),
        })
    }

    /// Create a channel whose display name is its handle.
    ///
    /// # Errors
    ///
    /// See [`Directory::create_named_channel`].
    pub async fn create_channel(&self, handle: &str, owner: &str) -> Result<Channel> {
        self.create_named_channel(handle, handle, owner).await
    }

    /// Create a channel. The handle is stored lowercased.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the handle is taken (case-insensitively),
    /// `InvalidKey` for a bad handle or owner, or a storage error.
    pub async fn create_named_channel(
        &self,
        handle: &str,
        name: &str,
        owner: &str,
    ) -> Result<Channel> {
        validate_key(handle)?;
        validate_key(owner)?;
        let handle = handle.to_lowercase();

        self.store
            .transact(collections::CHANNELS, |channels: &mut Vec<Channel>| {
                if channels.iter().any(|c| c.handle.to_lowercase() == handle) {
                    return Err(Error::AlreadyExists(handle.clone()));
                }

                let channel = Channel {
                    name: name.to_string(),
                    handle: handle.clone(),
                    owner: owner.to_string(),
                    subscribers: vec![owner.to_string()],
                    created: now_millis(),
                };
                channels.push(channel.clone());
                debug!(channel = %handle, owner = %owner, "Channel created");

                Ok(channel)
            })
            .await
    }

    /// Look up a channel by handle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no channel has this handle.
    pub async fn channel(&self, handle: &str) -> Result<Channel> {
        let handle = handle.to_lowercase();
        let channels: Vec<Channel> = self.store.read(collections::CHANNELS).await?;

        channels
            .into_iter()
            .find(|c| c.handle == handle)
            .ok_or(Error::NotFound(handle))
    }

    /// Subscribe an identity to a channel.
    ///
    /// Subscribing to a handle that was never created succeeds without
    /// creating anything, reported as [`Subscription::NoSuchChannel`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a bad subscriber, or a storage or integrity
    /// error.
    pub async fn subscribe(&self, handle: &str, subscriber: &str) -> Result<Subscription> {
        validate_key(subscriber)?;
        let handle = handle.to_lowercase();

        self.store
            .transact(collections::CHANNELS, |channels: &mut Vec<Channel>| {
                let Some(channel) = channels.iter_mut().find(|c| c.handle == handle) else {
                    debug!(channel = %handle, "Subscribe to unknown channel ignored");
                    return Ok(Subscription::NoSuchChannel);
                };

                if channel.subscribers.iter().any(|s| s == subscriber) {
                    return Ok(Subscription::AlreadySubscribed);
                }

                channel.subscribers.push(subscriber.to_string());
                debug!(channel = %handle, subscriber = %subscriber, "Subscribed");
                Ok(Subscription::Added)
            })
            .await
    }

    /// Public profiles of all registered identities.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn users(&self) -> Result<Vec<UserProfile>> {
        self.store.read(collections::USERS).await
    }

    /// Case-insensitive substring search over users and channels.
    ///
    /// Users come first, then channels, each in stored order.
    ///
    /// # Errors
    ///
    /// Returns a storage or integrity error.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query = query.to_lowercase();
        let users = self.users().await?;
        let channels: Vec<Channel> = self.store.read(collections::CHANNELS).await?;

        let matches = |handle: &str, name: &str| {
            handle.to_lowercase().contains(&query) || name.to_lowercase().contains(&query)
        };

        let found_users = users
            .into_iter()
            .filter(|u| matches(&u.user, &u.name))
            .map(|u| SearchHit::User {
                name: u.name,
                user: u.user,
                avatar: u.avatar,
                verified: u.verified,
            });

        let found_channels = channels
            .into_iter()
            .filter(|c| matches(&c.handle, &c.name))
            .map(|c| SearchHit::Channel {
                name: c.name,
                user: c.handle,
            });

        Ok(found_users.chain(found_channels).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::backend::{Backend, MemoryBackend};

    fn directory() -> Directory {
        Directory::new(Arc::new(Store::in_memory()))
    }

    #[tokio::test]
    async fn test_ensure_chat_is_idempotent() {
        let store = Arc::new(Store::in_memory());
        let directory = Directory::new(Arc::clone(&store));

        let first = directory.ensure_chat("alice", "bob").await.unwrap();
        let second = directory.ensure_chat("bob", "alice").await.unwrap();
        assert_eq!(first, "alice_bob");
        assert_eq!(first, second);

        let chats: Vec<Chat> = store.read(collections::CHATS).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].user1, "alice");
        assert_eq!(chats[0].user2, "bob");
    }

    #[tokio::test]
    async fn test_create_channel_rejects_duplicate_handle() {
        let directory = directory();

        let channel = directory
            .create_named_channel("News", "Daily News", "carol")
            .await
            .unwrap();
        assert_eq!(channel.handle, "news");
        assert_eq!(channel.subscribers, vec!["carol".to_string()]);

        assert!(matches!(
            directory.create_channel("NEWS", "dave").await,
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(directory.channel("news").await.unwrap().owner, "carol");
    }

    #[tokio::test]
    async fn test_subscribe() {
        let directory = directory();
        directory.create_channel("news", "carol").await.unwrap();

        assert_eq!(
            directory.subscribe("news", "alice").await.unwrap(),
            Subscription::Added
        );
        assert_eq!(
            directory.subscribe("News", "alice").await.unwrap(),
            Subscription::AlreadySubscribed
        );
        assert_eq!(
            directory.subscribe("news", "carol").await.unwrap(),
            Subscription::AlreadySubscribed
        );

        let channel = directory.channel("news").await.unwrap();
        assert_eq!(
            channel.subscribers,
            vec!["carol".to_string(), "alice".to_string()]
        );
    }

    #[tokio::test]
    async fn test_subscribe_to_missing_channel_creates_nothing() {
        let store = Arc::new(Store::in_memory());
        let directory = Directory::new(Arc::clone(&store));

        assert_eq!(
            directory.subscribe("ghost", "alice").await.unwrap(),
            Subscription::NoSuchChannel
        );

        let channels: Vec<Channel> = store.read(collections::CHANNELS).await.unwrap();
        assert!(channels.is_empty());
        assert!(matches!(
            directory.channel("ghost").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_invalid_subscriber() {
        let directory = directory();
        directory.create_channel("news", "carol").await.unwrap();

        assert!(matches!(
            directory.subscribe("news", "").await,
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            directory.subscribe("news", "bad\nname").await,
            Err(Error::InvalidKey(_))
        ));
        assert_eq!(
            directory.channel("news").await.unwrap().subscribers,
            vec!["carol".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_for() {
        let directory = directory();
        directory.ensure_chat("alice", "bob").await.unwrap();
        directory.ensure_chat("bob", "carol").await.unwrap();
        directory.create_channel("news", "carol").await.unwrap();
        directory.create_channel("sport", "dave").await.unwrap();
        directory.subscribe("sport", "alice").await.unwrap();

        let listing = directory.list_for("alice").await.unwrap();
        assert_eq!(listing.chats.len(), 1);
        assert_eq!(listing.chats[0].id, "alice_bob");
        assert_eq!(listing.channels.len(), 1);
        assert_eq!(listing.channels[0].handle, "sport");

        let listing = directory.list_for("carol").await.unwrap();
        assert_eq!(listing.chats[0].id, "bob_carol");
        assert_eq!(listing.channels[0].handle, "news");
    }

    #[tokio::test]
    async fn test_search_users_and_channels() {
        let backend = MemoryBackend::new();
        backend
            .persist(
                collections::USERS,
                Bytes::from_static(
                    br#"[{"name":"Alice","user":"alice","pass":"secret","avatar":"","role":"user","verified":true,"banned":false,"registered":1}]"#,
                ),
            )
            .await
            .unwrap();
        let directory = Directory::new(Arc::new(Store::new(backend)));
        directory
            .create_named_channel("alicefans", "Fans", "bob")
            .await
            .unwrap();
        directory.create_channel("news", "bob").await.unwrap();

        let hits = directory.search("ALI").await.unwrap();
        assert_eq!(
            hits,
            vec![
                SearchHit::User {
                    name: "Alice".to_string(),
                    user: "alice".to_string(),
                    avatar: String::new(),
                    verified: true,
                },
                SearchHit::Channel {
                    name: "Fans".to_string(),
                    user: "alicefans".to_string(),
                },
            ]
        );

        let users = directory.users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, "user");
    }

    #[tokio::test]
    async fn test_channel_wire_shape() {
        let directory = directory();
        let channel = directory.create_channel("news", "carol").await.unwrap();

        let value = serde_json::to_value(&channel).unwrap();
        assert_eq!(value["user"], "news");
        assert_eq!(value["owner"], "carol");
    }
}
