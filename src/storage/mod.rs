//! Object-storage contract the engine depends on, plus two local backends.
//!
//! The engine only ever talks to [`StorageBackend`]; concrete backends (S3,
//! GCS, ...) live outside this crate and implement the same four methods.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub const PNG_CONTENT_TYPE: &str = "image/png";
pub const JSON_CONTENT_TYPE: &str = "application/json";

const NOT_FOUND_MARKERS: [&str; 4] = ["not found", "does not exist", "no such key", "nosuchkey"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {path}")]
    NotFound { path: String },
    #[error("storage backend error{}: {message}", status_suffix(.status))]
    Backend {
        status: Option<u16>,
        message: String,
    },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend {
            status: None,
            message: message.into(),
        }
    }

    /// Not-found class: the explicit variant, a 404 status, or a message that
    /// says the object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Backend { status, message } => {
                if *status == Some(404) {
                    return true;
                }
                let lowered = message.to_ascii_lowercase();
                NOT_FOUND_MARKERS
                    .iter()
                    .any(|marker| lowered.contains(marker))
            }
            StorageError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

impl UploadOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn png() -> Self {
        Self::new(PNG_CONTENT_TYPE)
    }

    pub fn json() -> Self {
        Self::new(JSON_CONTENT_TYPE)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short provider name recorded on each baseline's storage pointer.
    fn provider(&self) -> &str;

    /// Public URL for a stored path, if the backend exposes one.
    fn url_for(&self, _path: &str) -> Option<String> {
        None
    }

    async fn upload_file(
        &self,
        path: &str,
        bytes: &[u8],
        options: UploadOptions,
    ) -> Result<String, StorageError>;

    /// Fails with a not-found-classified error when the object is absent.
    async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_not_found_errors() {
        assert!(StorageError::NotFound { path: "a".into() }.is_not_found());
        assert!(StorageError::Backend {
            status: Some(404),
            message: "gone".into()
        }
        .is_not_found());
        assert!(StorageError::backend("The specified key does not exist.").is_not_found());
        assert!(StorageError::backend("NoSuchKey").is_not_found());
        assert!(StorageError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_not_found());
    }

    #[test]
    fn other_errors_are_not_absence() {
        assert!(!StorageError::Backend {
            status: Some(503),
            message: "service unavailable".into()
        }
        .is_not_found());
        assert!(!StorageError::backend("access denied").is_not_found());
    }

    #[test]
    fn backend_error_message_includes_status() {
        let err = StorageError::Backend {
            status: Some(500),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "storage backend error (status 500): boom");
        assert_eq!(
            StorageError::backend("boom").to_string(),
            "storage backend error: boom"
        );
    }
}
