//! The durable collection store.
//!
//! Every piece of shared state lives in a named collection: one JSON document
//! per name. All writers to the same collection are serialized through a
//! per-collection async mutex, so a load-mutate-persist cycle can never
//! interleave with another one on that collection. Unrelated collections
//! proceed concurrently.

use crate::backend::{Backend, FileBackend, MemoryBackend};
use crate::error::{Error, Result};
use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Collection names.
pub mod collections {
    /// Registered identities, written by the external identity layer.
    pub const USERS: &str = "users";
    /// Conversation id to ordered message log.
    pub const MESSAGES: &str = "messages";
    /// Broadcast channels.
    pub const CHANNELS: &str = "channels";
    /// Two-party chats.
    pub const CHATS: &str = "chats";
    /// Identities currently online.
    pub const ONLINE: &str = "online";
}

/// Called after every transaction with the collection, the time spent
/// holding its lock, and whether the transaction committed.
pub type TransactionObserver = Arc<dyn Fn(&str, Duration, bool) + Send + Sync>;

/// Keyed document store with serialized read-modify-write transactions.
pub struct Store {
    backend: Arc<dyn Backend>,
    /// One exclusive-access lock per collection name.
    locks: DashMap<String, Arc<Mutex<()>>>,
    observer: Option<TransactionObserver>,
}

impl Store {
    /// Create a store over a backend.
    #[must_use]
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Create a store over a shared backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        debug!(backend = backend.name(), "Creating store");
        Self {
            backend,
            locks: DashMap::new(),
            observer: None,
        }
    }

    /// Report the duration and outcome of every transaction to `observer`.
    #[must_use]
    pub fn with_observer(
        mut self,
        observer: impl Fn(&str, Duration, bool) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Open a file-backed store in a data directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(FileBackend::open(dir).await?))
    }

    /// Create a store that keeps everything in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Get the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Read the latest committed state of a collection.
    ///
    /// An absent collection reads as `T::default()`. Reads do not take the
    /// collection lock; backends only ever expose whole documents.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` on I/O errors and `IntegrityError` if the
    /// stored document cannot be parsed.
    pub async fn read<T>(&self, collection: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.backend.load(collection).await? {
            Some(data) => decode(collection, &data),
            None => Ok(T::default()),
        }
    }

    /// Run one serialized load-mutate-persist cycle on a collection.
    ///
    /// `mutate` receives the latest committed state (or `T::default()` if the
    /// collection is absent) and edits it in place. If it returns an error,
    /// nothing is written. Otherwise the new state is persisted and the
    /// closure's result is returned. A state that serializes to exactly the
    /// bytes that were loaded is not rewritten.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a storage, integrity or encoding error.
    /// On any error the committed state is the pre-transaction state.
    pub async fn transact<T, R, F>(&self, collection: &str, mutate: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> Result<R>,
    {
        self.transact_then(collection, mutate, |_| ()).await
    }

    /// Like [`Store::transact`], then run `on_commit` after the new state is
    /// durable and before the collection is released.
    ///
    /// Callbacks for one collection therefore run in commit order. They must
    /// not block; they hold up the next writer to the collection.
    ///
    /// # Errors
    ///
    /// Same as [`Store::transact`]. `on_commit` is not called on error.
    pub async fn transact_then<T, R, F, C>(
        &self,
        collection: &str,
        mutate: F,
        on_commit: C,
    ) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> Result<R>,
        C: FnOnce(&R),
    {
        let lock = self.lock_for(collection);
        let _guard = lock.lock().await;
        let start = Instant::now();

        let result = self
            .commit::<T, R, F, C>(collection, mutate, on_commit)
            .await;

        let elapsed = start.elapsed();
        if let Some(observer) = &self.observer {
            observer(collection, elapsed, result.is_ok());
        }
        trace!(
            collection = %collection,
            elapsed_us = elapsed.as_micros() as u64,
            committed = result.is_ok(),
            "Transaction finished"
        );

        result
    }

    /// The body of a transaction. The caller holds the collection lock.
    async fn commit<T, R, F, C>(&self, collection: &str, mutate: F, on_commit: C) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> Result<R>,
        C: FnOnce(&R),
    {
        let loaded = self.backend.load(collection).await?;
        let mut state: T = match &loaded {
            Some(data) => decode(collection, data)?,
            None => T::default(),
        };

        let outcome = mutate(&mut state)?;

        let encoded = serde_json::to_vec_pretty(&state).map_err(|source| Error::Encode {
            collection: collection.to_string(),
            source,
        })?;

        if loaded.as_deref() == Some(encoded.as_slice()) {
            trace!(collection = %collection, "Collection unchanged, skipping write");
        } else {
            self.backend
                .persist(collection, Bytes::from(encoded))
                .await?;
        }

        on_commit(&outcome);
        Ok(outcome)
    }

    fn lock_for(&self, collection: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(collection.to_string())
            .or_default()
            .value()
            .clone()
    }
}

fn decode<T: DeserializeOwned>(collection: &str, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|source| Error::IntegrityError {
        collection: collection.to_string(),
        source,
    })
}
