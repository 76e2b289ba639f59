//! Whole-document persistence for the baseline index.
//!
//! The repository keeps the index in memory and hands the complete document
//! to an [`IndexStore`] on every mutation. There are no partial writes and no
//! locking: the last writer wins.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::Baseline;
use crate::settings::EngineConfig;
use crate::storage::{StorageBackend, UploadOptions};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "visual_baseline::index";

use crate::{log_debug, log_info};

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub baselines: Vec<Baseline>,
}

impl IndexDocument {
    pub fn new(baselines: Vec<Baseline>) -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at: Utc::now(),
            count: baselines.len(),
            baselines,
        }
    }
}

#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Load every persisted baseline. A store that has never been written
    /// loads as empty.
    async fn load(&self) -> Result<Vec<Baseline>>;

    /// Replace the persisted index with `document`.
    async fn persist(&self, document: &IndexDocument) -> Result<()>;
}

/// Keeps the index as one JSON object at a fixed path in a storage backend.
pub struct StorageIndexStore {
    storage: Arc<dyn StorageBackend>,
    path: String,
}

impl StorageIndexStore {
    pub fn new(storage: Arc<dyn StorageBackend>, path: impl Into<String>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }

    /// Store at `config.index_path`.
    pub fn from_config(storage: Arc<dyn StorageBackend>, config: &EngineConfig) -> Self {
        Self::new(storage, config.index_path.clone())
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl IndexStore for StorageIndexStore {
    async fn load(&self) -> Result<Vec<Baseline>> {
        let bytes = match self.storage.download_file(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                log_info!("No baseline index at {}; starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read index {}", self.path))
            }
        };

        let document: IndexDocument = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse index {}", self.path))?;
        if document.version > INDEX_VERSION {
            bail!(
                "index version ({}) is newer than supported ({})",
                document.version,
                INDEX_VERSION
            );
        }

        log_debug!(
            "Loaded {} baselines from index {}",
            document.baselines.len(),
            self.path
        );
        Ok(document.baselines)
    }

    async fn persist(&self, document: &IndexDocument) -> Result<()> {
        let serialized =
            serde_json::to_vec_pretty(document).context("failed to serialize baseline index")?;
        self.storage
            .upload_file(&self.path, &serialized, UploadOptions::json())
            .await
            .with_context(|| format!("failed to write index {}", self.path))?;
        Ok(())
    }
}
