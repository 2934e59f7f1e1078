//! Error types for the Parley core.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced chat, channel or conversation does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record with the same unique key already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A conversation id or channel handle failed validation.
    #[error("Invalid key: {0}")]
    InvalidKey(&'static str),

    /// Reading or writing a collection failed at the I/O layer.
    #[error("Storage failure on '{collection}': {source}")]
    StorageFailure {
        collection: String,
        source: std::io::Error,
    },

    /// A collection exists on disk but cannot be parsed.
    #[error("Collection '{collection}' is corrupt: {source}")]
    IntegrityError {
        collection: String,
        source: serde_json::Error,
    },

    /// A collection could not be serialized; nothing was written.
    #[error("Failed to encode collection '{collection}': {source}")]
    Encode {
        collection: String,
        source: serde_json::Error,
    },
}

impl Error {
    /// Whether this error is a server-side fault rather than a negative
    /// answer to the caller's request.
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Error::StorageFailure { .. } | Error::IntegrityError { .. } | Error::Encode { .. }
        )
    }

    /// Short label for the error variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::InvalidKey(_) => "invalid_key",
            Error::StorageFailure { .. } => "storage_failure",
            Error::IntegrityError { .. } => "integrity",
            Error::Encode { .. } => "encode",
        }
    }

    pub(crate) fn storage(collection: &str, source: std::io::Error) -> Self {
        Error::StorageFailure {
            collection: collection.to_string(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_fault_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(Error::storage("messages", io).is_server_fault());
        assert!(!Error::AlreadyExists("news".to_string()).is_server_fault());
        assert!(!Error::NotFound("news".to_string()).is_server_fault());
        assert!(!Error::InvalidKey("empty").is_server_fault());
    }

    #[test]
    fn test_kind_labels() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let json = serde_json::from_str::<u8>("x").unwrap_err();

        assert_eq!(Error::storage("online", io).kind(), "storage_failure");
        assert_eq!(
            Error::IntegrityError {
                collection: "online".to_string(),
                source: json,
            }
            .kind(),
            "integrity"
        );
        assert_eq!(Error::NotFound("news".to_string()).kind(), "not_found");
    }
}
