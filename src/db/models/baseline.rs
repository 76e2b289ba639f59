//! Baseline entity and the input used to create one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source-control context a baseline was captured for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BaselineMetadata {
    pub commit: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl BaselineMetadata {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .map(|tags| tags.iter().any(|t| t == tag))
            .unwrap_or(false)
    }

    /// True when this baseline carries every tag in `required`.
    pub fn has_all_tags<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|tag| self.has_tag(tag.as_ref()))
    }
}

/// Pointer to externally stored image bytes. Pixel data is never embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageRef {
    pub provider: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A versioned reference screenshot for one (repository, branch, route, viewport) context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub id: String,
    pub repository: RepositoryRef,
    pub route: String,
    pub viewport: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: BaselineMetadata,
    pub storage: StorageRef,
    pub fingerprint: String,
    pub dimensions: Dimensions,
}

/// Everything `BaselineRepository::save` needs to create or upsert a baseline.
#[derive(Debug, Clone)]
pub struct NewBaseline {
    pub repository: RepositoryRef,
    pub route: String,
    pub viewport: String,
    pub metadata: BaselineMetadata,
    pub image: Vec<u8>,
}
