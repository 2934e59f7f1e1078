//! Persistence backends for the collection store.
//!
//! A backend moves whole collection documents in and out of durable storage.
//! It knows nothing about locking or document contents; the `Store` layers
//! serialization and per-collection exclusion on top.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Durable storage for named collection documents.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Load the committed document for a collection.
    ///
    /// Returns `None` only if the collection has never been written.
    async fn load(&self, collection: &str) -> Result<Option<Bytes>>;

    /// Replace the committed document for a collection.
    ///
    /// Either the whole document becomes visible or, on error, the previous
    /// one stays in place.
    async fn persist(&self, collection: &str, data: Bytes) -> Result<()>;

    /// Get the backend name (e.g., "file", "memory").
    fn name(&self) -> &'static str;
}

/// One JSON document per collection inside a data directory.
///
/// Writes are staged to `<collection>.json.tmp`, synced, then renamed over
/// `<collection>.json`, so a crash mid-write leaves the old document intact.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open a data directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(&dir.display().to_string(), e))?;

        info!(path = %dir.display(), "File backend opened");

        Ok(Self { dir })
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the committed document for a collection.
    #[must_use]
    pub fn document_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    fn staging_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json.tmp"))
    }

    async fn write_staged(&self, staging: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(staging).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }
}

/// Collection names become file names, so only a plain alphabet is allowed.
fn check_collection_name(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidKey("collection name must be [A-Za-z0-9_-]+"))
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn load(&self, collection: &str) -> Result<Option<Bytes>> {
        check_collection_name(collection)?;

        match fs::read(self.document_path(collection)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(collection, e)),
        }
    }

    async fn persist(&self, collection: &str, data: Bytes) -> Result<()> {
        check_collection_name(collection)?;

        let staging = self.staging_path(collection);
        let target = self.document_path(collection);

        let written = match self.write_staged(&staging, &data).await {
            Ok(()) => fs::rename(&staging, &target).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!(collection = %collection, error = %e, "Persist failed");
            if let Err(cleanup) = fs::remove_file(&staging).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    debug!(collection = %collection, error = %cleanup, "Staging file left behind");
                }
            }
            return Err(Error::storage(collection, e));
        }

        debug!(collection = %collection, bytes = data.len(), "Persisted collection");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Process-local backend, for tests and benchmarks.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: DashMap<String, Bytes>,
}

impl MemoryBackend {
    /// Create an empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn load(&self, collection: &str) -> Result<Option<Bytes>> {
        Ok(self.documents.get(collection).map(|d| d.value().clone()))
    }

    async fn persist(&self, collection: &str, data: Bytes) -> Result<()> {
        self.documents.insert(collection.to_string(), data);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_backend_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        assert!(backend.load("online").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_backend_persist_replaces_document() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend
            .persist("online", Bytes::from_static(b"[\"alice\"]"))
            .await
            .unwrap();
        backend
            .persist("online", Bytes::from_static(b"[\"bob\"]"))
            .await
            .unwrap();

        let data = backend.load("online").await.unwrap().unwrap();
        assert_eq!(&data[..], b"[\"bob\"]");
        assert!(!dir.path().join("online.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_backend_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        assert!(matches!(
            backend.load("../etc/passwd").await,
            Err(Error::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_file_backend_read_error_is_storage_failure() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        // A directory where the document should be cannot be read as a file.
        std::fs::create_dir(dir.path().join("chats.json")).unwrap();

        assert!(matches!(
            backend.load("chats").await,
            Err(Error::StorageFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();
        assert!(backend.load("chats").await.unwrap().is_none());

        backend
            .persist("chats", Bytes::from_static(b"[]"))
            .await
            .unwrap();
        assert_eq!(&backend.load("chats").await.unwrap().unwrap()[..], b"[]");
        assert_eq!(backend.name(), "memory");
    }
}
