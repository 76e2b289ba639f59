use std::{
    collections::BTreeMap,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::{
    helpers::{baseline_id, fingerprint, image_dimensions, image_storage_path},
    index::{IndexDocument, IndexStore},
    models::{Baseline, BaselineQuery, NewBaseline, StorageRef, DEFAULT_QUERY_LIMIT},
};
use crate::storage::{StorageBackend, UploadOptions};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "visual_baseline::repository";

use crate::{log_debug, log_info, log_warn};

/// Metadata attached to stored image bytes.
pub type ImageMetadata = BTreeMap<String, String>;

/// Baseline entity storage.
///
/// The in-memory index, keyed by baseline id, is the source of truth for the
/// lifetime of the process. It is loaded once by [`BaselineRepository::open`]
/// and the complete document is handed to the [`IndexStore`] after every
/// mutation.
pub struct BaselineRepository {
    storage: Arc<dyn StorageBackend>,
    index_store: Arc<dyn IndexStore>,
    index: RwLock<BTreeMap<String, Baseline>>,
}

impl BaselineRepository {
    pub async fn open(
        storage: Arc<dyn StorageBackend>,
        index_store: Arc<dyn IndexStore>,
    ) -> Result<Self> {
        let loaded = index_store
            .load()
            .await
            .context("failed to load baseline index")?;
        let index: BTreeMap<String, Baseline> = loaded
            .into_iter()
            .map(|baseline| (baseline.id.clone(), baseline))
            .collect();

        log_info!("Baseline repository opened with {} entries", index.len());

        Ok(Self {
            storage,
            index_store,
            index: RwLock::new(index),
        })
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Create or upsert the baseline for `data`'s context and commit.
    pub async fn save(&self, data: NewBaseline) -> Result<Baseline> {
        let fingerprint = fingerprint(&data.image);
        let dimensions = image_dimensions(&data.image)
            .with_context(|| format!("baseline image for route '{}' is not decodable", data.route))?;

        let mut image_metadata = ImageMetadata::new();
        image_metadata.insert("route".into(), data.route.clone());
        image_metadata.insert("viewport".into(), data.viewport.clone());
        image_metadata.insert("commit".into(), data.metadata.commit.clone());
        let path = self.save_image(&data.image, &image_metadata).await?;

        let id = baseline_id(
            &data.repository.owner,
            &data.repository.name,
            &data.repository.branch,
            &data.route,
            &data.viewport,
            &data.metadata.commit,
        );

        let mut index = self.index.write().await;
        let now = Utc::now();
        let previous = index.get(&id).cloned();
        let (created_at, updated_at) = match &previous {
            Some(existing) => (existing.created_at, now.max(existing.updated_at)),
            None => (now, now),
        };

        let baseline = Baseline {
            id: id.clone(),
            repository: data.repository,
            route: data.route,
            viewport: data.viewport,
            created_at,
            updated_at,
            metadata: data.metadata,
            storage: self.storage_ref(&path, data.image.len()),
            fingerprint,
            dimensions,
        };

        index.insert(id.clone(), baseline.clone());
        if let Err(err) = self.persist(&index).await {
            restore(&mut index, &id, previous);
            return Err(err);
        }
        if let Some(superseded) = &previous {
            if superseded.storage.path != baseline.storage.path {
                self.release_image(&index, &superseded.storage.path, &id).await;
            }
        }

        log_info!(
            "Saved baseline {} for {} @ {} ({})",
            baseline.id,
            baseline.route,
            baseline.viewport,
            if previous.is_some() { "updated" } else { "created" }
        );
        Ok(baseline)
    }

    /// Explicit update: replaces the stored image of an existing baseline.
    ///
    /// Only the storage pointer, fingerprint, dimensions and `updated_at` change.
    pub async fn update(&self, id: &str, image: &[u8]) -> Result<Baseline> {
        let current = self
            .get(id)
            .await
            .ok_or_else(|| anyhow!("baseline {id} not found"))?;

        let dimensions = image_dimensions(image)
            .with_context(|| format!("replacement image for baseline {id} is not decodable"))?;
        let mut image_metadata = ImageMetadata::new();
        image_metadata.insert("route".into(), current.route.clone());
        image_metadata.insert("viewport".into(), current.viewport.clone());
        image_metadata.insert("commit".into(), current.metadata.commit.clone());
        let path = self.save_image(image, &image_metadata).await?;

        let mut index = self.index.write().await;
        let previous = index.get(id).cloned();
        let Some(mut updated) = previous.clone() else {
            return Err(anyhow!("baseline {id} was removed during update"));
        };
        updated.storage = self.storage_ref(&path, image.len());
        updated.fingerprint = fingerprint(image);
        updated.dimensions = dimensions;
        updated.updated_at = Utc::now().max(updated.updated_at);

        index.insert(id.to_string(), updated.clone());
        if let Err(err) = self.persist(&index).await {
            restore(&mut index, id, previous);
            return Err(err);
        }
        if let Some(superseded) = &previous {
            if superseded.storage.path != updated.storage.path {
                self.release_image(&index, &superseded.storage.path, id).await;
            }
        }

        log_info!("Updated baseline {} image -> {}", id, updated.storage.path);
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> Option<Baseline> {
        self.index.read().await.get(id).cloned()
    }

    /// Filter, sort by `updated_at` descending, then paginate.
    pub async fn find(&self, query: &BaselineQuery) -> Vec<Baseline> {
        let index = self.index.read().await;
        let mut matches: Vec<Baseline> = index
            .values()
            .filter(|baseline| query.matches(baseline))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        matches
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Remove a baseline. Image deletion failures are logged, never fatal.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut index = self.index.write().await;
        let Some(target) = index.remove(id) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&index).await {
            index.insert(id.to_string(), target);
            return Err(err);
        }
        self.release_image(&index, &target.storage.path, id).await;

        log_info!("Deleted baseline {}", id);
        Ok(true)
    }

    pub async fn get_image(&self, baseline: &Baseline) -> Result<Vec<u8>> {
        self.storage
            .download_file(&baseline.storage.path)
            .await
            .with_context(|| {
                format!(
                    "failed to fetch image {} for baseline {}",
                    baseline.storage.path, baseline.id
                )
            })
    }

    /// Store image bytes at a path derived from their fingerprint.
    pub async fn save_image(&self, bytes: &[u8], metadata: &ImageMetadata) -> Result<String> {
        let fingerprint = fingerprint(bytes);
        let path = image_storage_path(&fingerprint);

        let mut options = UploadOptions::png().with_metadata("fingerprint", fingerprint);
        for (key, value) in metadata {
            options = options.with_metadata(key.clone(), value.clone());
        }

        self.storage
            .upload_file(&path, bytes, options)
            .await
            .with_context(|| format!("failed to store image at {path}"))
    }

    /// Re-hash the stored bytes and compare against the recorded fingerprint.
    pub async fn verify_fingerprint(&self, baseline: &Baseline) -> Result<bool> {
        let bytes = self.get_image(baseline).await?;
        Ok(fingerprint(&bytes) == baseline.fingerprint)
    }

    /// Delete `path` unless an entry in `index` still points at it.
    async fn release_image(&self, index: &BTreeMap<String, Baseline>, path: &str, id: &str) {
        if index.values().any(|other| other.storage.path == path) {
            log_debug!("Keeping image {} released by {}: still referenced", path, id);
            return;
        }
        if let Err(err) = self.storage.delete_file(path).await {
            log_warn!("Failed to delete image {} released by {}: {err}", path, id);
        }
    }

    fn storage_ref(&self, path: &str, size: usize) -> StorageRef {
        StorageRef {
            provider: self.storage.provider().to_string(),
            path: path.to_string(),
            url: self.storage.url_for(path),
            size: Some(size as u64),
        }
    }

    async fn persist(&self, index: &BTreeMap<String, Baseline>) -> Result<()> {
        let document = IndexDocument::new(index.values().cloned().collect());
        self.index_store
            .persist(&document)
            .await
            .context("failed to persist baseline index")
    }
}

fn restore(index: &mut BTreeMap<String, Baseline>, id: &str, previous: Option<Baseline>) {
    match previous {
        Some(baseline) => {
            index.insert(id.to_string(), baseline);
        }
        None => {
            index.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::index::StorageIndexStore;
    use crate::db::models::{BaselineMetadata, RepositoryRef};
    use crate::storage::MemoryStorage;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn new_baseline(branch: &str, route: &str, commit: &str, image: Vec<u8>) -> NewBaseline {
        NewBaseline {
            repository: RepositoryRef::new("acme", "web", branch),
            route: route.into(),
            viewport: "1920x1080".into(),
            metadata: BaselineMetadata {
                commit: commit.into(),
                author: "ci".into(),
                pr_number: None,
                tags: None,
            },
            image,
        }
    }

    async fn open(storage: Arc<MemoryStorage>) -> BaselineRepository {
        let index = Arc::new(StorageIndexStore::new(storage.clone(), "baselines/index.json"));
        BaselineRepository::open(storage, index).await.unwrap()
    }

    #[tokio::test]
    async fn save_is_idempotent_per_context_and_commit() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;

        let first = repo
            .save(new_baseline("main", "/", "c1", png(4, 4, [255, 0, 0, 255])))
            .await
            .unwrap();
        let second = repo
            .save(new_baseline("main", "/", "c1", png(4, 4, [0, 255, 0, 255])))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.count().await, 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_ne!(first.fingerprint, second.fingerprint);
    }

    #[tokio::test]
    async fn fingerprint_matches_stored_bytes() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        let image = png(3, 2, [1, 2, 3, 255]);

        let baseline = repo
            .save(new_baseline("main", "/", "c1", image.clone()))
            .await
            .unwrap();

        assert_eq!(baseline.fingerprint, fingerprint(&image));
        assert_eq!(repo.get_image(&baseline).await.unwrap(), image);
        assert!(repo.verify_fingerprint(&baseline).await.unwrap());
        assert_eq!(baseline.dimensions.width, 3);
        assert_eq!(baseline.dimensions.height, 2);
        assert_eq!(baseline.storage.size, Some(image.len() as u64));
    }

    #[tokio::test]
    async fn find_filters_sorts_and_paginates() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        for (branch, route, commit) in [
            ("main", "/", "c1"),
            ("main", "/about", "c2"),
            ("feature", "/", "c3"),
            ("main", "/", "c4"),
        ] {
            repo.save(new_baseline(branch, route, commit, png(2, 2, [9, 9, 9, 255])))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let all = repo.find(&BaselineQuery::new()).await;
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].metadata.commit, "c4");

        let main_root = repo
            .find(&BaselineQuery::new().with_branch("main").with_route("/"))
            .await;
        let commits: Vec<_> = main_root.iter().map(|b| b.metadata.commit.as_str()).collect();
        assert_eq!(commits, vec!["c4", "c1"]);

        let page = repo
            .find(&BaselineQuery::new().with_offset(1).with_limit(2))
            .await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].metadata.commit, "c3");
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let storage = Arc::new(MemoryStorage::new());
        let saved = {
            let repo = open(storage.clone()).await;
            repo.save(new_baseline("main", "/", "c1", png(2, 2, [0, 0, 0, 255])))
                .await
                .unwrap()
        };

        let reopened = open(storage).await;
        assert_eq!(reopened.get(&saved.id).await, Some(saved));
    }

    #[tokio::test]
    async fn delete_keeps_shared_images() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        let image = png(2, 2, [5, 5, 5, 255]);

        let a = repo
            .save(new_baseline("main", "/", "c1", image.clone()))
            .await
            .unwrap();
        let b = repo
            .save(new_baseline("main", "/", "c2", image))
            .await
            .unwrap();
        assert_eq!(a.storage.path, b.storage.path);

        assert!(repo.delete(&a.id).await.unwrap());
        assert!(storage.contains(&b.storage.path));

        assert!(repo.delete(&b.id).await.unwrap());
        assert!(!storage.contains(&b.storage.path));
        assert!(!repo.delete(&b.id).await.unwrap());
        assert_eq!(repo.count().await, 0);
    }

    #[tokio::test]
    async fn delete_proceeds_when_image_is_already_gone() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        let baseline = repo
            .save(new_baseline("main", "/", "c1", png(2, 2, [5, 5, 5, 255])))
            .await
            .unwrap();
        storage.delete_file(&baseline.storage.path).await.unwrap();

        assert!(repo.delete(&baseline.id).await.unwrap());
        assert!(repo.get(&baseline.id).await.is_none());
    }

    #[tokio::test]
    async fn update_rewrites_only_image_fields() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        let original = repo
            .save(new_baseline("main", "/", "c1", png(2, 2, [5, 5, 5, 255])))
            .await
            .unwrap();

        let replacement = png(6, 4, [7, 7, 7, 255]);
        let updated = repo.update(&original.id, &replacement).await.unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.metadata, original.metadata);
        assert_eq!(updated.fingerprint, fingerprint(&replacement));
        assert_eq!(updated.dimensions.width, 6);
        assert!(updated.updated_at >= original.updated_at);
        assert!(repo.update("missing", &replacement).await.is_err());
        assert!(!storage.contains(&original.storage.path));
        assert!(storage.contains(&updated.storage.path));
    }

    #[tokio::test]
    async fn resave_with_new_bytes_removes_superseded_image() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        let first = repo
            .save(new_baseline("main", "/", "c1", png(2, 2, [5, 5, 5, 255])))
            .await
            .unwrap();
        let second = repo
            .save(new_baseline("main", "/", "c1", png(2, 2, [9, 9, 9, 255])))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(!storage.contains(&first.storage.path));

        assert!(repo.delete(&second.id).await.unwrap());
        assert!(storage.list_files("baseline-images/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resave_keeps_image_still_shared_by_another_commit() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        let shared = png(2, 2, [5, 5, 5, 255]);
        let first = repo
            .save(new_baseline("main", "/", "c1", shared.clone()))
            .await
            .unwrap();
        repo.save(new_baseline("main", "/", "c2", shared))
            .await
            .unwrap();

        repo.save(new_baseline("main", "/", "c1", png(2, 2, [9, 9, 9, 255])))
            .await
            .unwrap();
        assert!(storage.contains(&first.storage.path));
    }

    #[tokio::test]
    async fn rejects_undecodable_images() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = open(storage.clone()).await;
        let result = repo
            .save(new_baseline("main", "/", "c1", b"not a png".to_vec()))
            .await;
        assert!(result.is_err());
        assert_eq!(repo.count().await, 0);
    }
}
