//! # parley-core
//!
//! Shared state and real-time fan-out for the Parley messaging backend.
//!
//! This crate provides the building blocks:
//!
//! - **Store** - Named durable collections with serialized transactions
//! - **ConversationLog** - Bounded, ordered message history per conversation
//! - **Directory** - Two-party chats and broadcast channels
//! - **Presence** - The set of identities currently online
//! - **Hub** - Live connections and fan-out of committed events
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Request   │────▶│   Engine    │────▶│    Hub      │──▶ connections
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │  (after commit)
//!          ┌─────────────────┼─────────────────┐
//!          ▼                 ▼                 ▼
//!   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//!   │ Conversation│   │  Directory  │   │  Presence   │
//!   └─────────────┘   └─────────────┘   └─────────────┘
//!          └─────────────────┼─────────────────┘
//!                            ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │    Store    │────▶│   Backend   │
//!                     └─────────────┘     └─────────────┘
//! ```

pub mod backend;
pub mod conversation;
pub mod directory;
pub mod engine;
pub mod error;
pub mod hub;
pub mod ids;
pub mod presence;
pub mod store;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use conversation::{ConversationLog, DEFAULT_HISTORY_LIMIT};
pub use directory::{Channel, Chat, Directory, Listing, SearchHit, Subscription, UserProfile};
pub use engine::{Delivery, Engine, EngineConfig};
pub use error::{Error, Result};
pub use hub::{ConnectionId, Hub, HubConfig, HubStats, PublishReport};
pub use parley_protocol::{Message, MessageId, ServerFrame};
pub use presence::{Presence, PresenceSnapshot};
pub use store::{collections, Store, TransactionObserver};
