use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{StorageBackend, StorageError, UploadOptions};

const METADATA_SUFFIX: &str = ".meta.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarMetadata {
    content_type: String,
    metadata: BTreeMap<String, String>,
}

/// Stores objects as plain files under a root directory.
///
/// Upload metadata is written next to each object as `{path}.meta.json`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StorageError::backend(format!(
                "invalid object path '{path}'"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn sidecar(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_os_string();
        name.push(METADATA_SUFFIX);
        PathBuf::from(name)
    }

    fn map_missing(err: std::io::Error, path: &str) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound {
                path: path.to_string(),
            }
        } else {
            StorageError::Io(err)
        }
    }
}

#[async_trait]
impl StorageBackend for FsStorage {
    fn provider(&self) -> &str {
        "filesystem"
    }

    fn url_for(&self, path: &str) -> Option<String> {
        self.resolve(path)
            .ok()
            .map(|file| format!("file://{}", file.display()))
    }

    async fn upload_file(
        &self,
        path: &str,
        bytes: &[u8],
        options: UploadOptions,
    ) -> Result<String, StorageError> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, bytes).await?;

        let sidecar = SidecarMetadata {
            content_type: options.content_type,
            metadata: options.metadata,
        };
        let serialized = serde_json::to_vec_pretty(&sidecar)
            .map_err(|err| StorageError::backend(format!("failed to encode metadata: {err}")))?;
        tokio::fs::write(Self::sidecar(&file), serialized).await?;

        Ok(path.to_string())
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let file = self.resolve(path)?;
        tokio::fs::read(&file)
            .await
            .map_err(|err| Self::map_missing(err, path))
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::Io(err)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(entry_path);
                    continue;
                }

                let Ok(relative) = entry_path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.ends_with(METADATA_SUFFIX) || !key.starts_with(prefix) {
                    continue;
                }
                found.push(key);
            }
        }

        found.sort();
        Ok(found)
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let file = self.resolve(path)?;
        tokio::fs::remove_file(&file)
            .await
            .map_err(|err| Self::map_missing(err, path))?;
        match tokio::fs::remove_file(Self::sidecar(&file)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upload_download_and_list() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());

        storage
            .upload_file("baselines/root_10x10.png", b"png", UploadOptions::png())
            .await
            .unwrap();
        storage
            .upload_file("other/file.json", b"{}", UploadOptions::json())
            .await
            .unwrap();

        assert_eq!(
            storage.download_file("baselines/root_10x10.png").await.unwrap(),
            b"png"
        );
        assert_eq!(
            storage.list_files("baselines/").await.unwrap(),
            vec!["baselines/root_10x10.png".to_string()]
        );
        assert_eq!(storage.list_files("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());

        let err = storage.download_file("baselines/nope.png").await.unwrap_err();
        assert!(err.is_not_found());
        let err = storage.delete_file("baselines/nope.png").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn rejects_paths_escaping_the_root() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());

        let err = storage
            .upload_file("../outside.png", b"x", UploadOptions::png())
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn delete_removes_metadata_sidecar() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        storage
            .upload_file(
                "a/b.png",
                b"x",
                UploadOptions::png().with_metadata("route", "/"),
            )
            .await
            .unwrap();
        assert!(dir.path().join("a/b.png.meta.json").exists());

        storage.delete_file("a/b.png").await.unwrap();
        assert!(!dir.path().join("a/b.png").exists());
        assert!(!dir.path().join("a/b.png.meta.json").exists());
    }
}
