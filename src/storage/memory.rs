use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::{StorageBackend, StorageError, UploadOptions};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    options: UploadOptions,
}

/// Process-local backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        match self.objects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects().contains_key(path)
    }

    /// Upload metadata recorded for `path`, if the object exists.
    pub fn metadata(&self, path: &str) -> Option<BTreeMap<String, String>> {
        self.objects()
            .get(path)
            .map(|object| object.options.metadata.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects()
            .get(path)
            .map(|object| object.options.content_type.clone())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn provider(&self) -> &str {
        "memory"
    }

    async fn upload_file(
        &self,
        path: &str,
        bytes: &[u8],
        options: UploadOptions,
    ) -> Result<String, StorageError> {
        self.objects().insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                options,
            },
        );
        Ok(path.to_string())
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.objects()
            .get(path)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        self.objects()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })
    }
}
