//! Route manifest: the "all routes" set used for full baselining.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteManifest {
    pub routes: Vec<String>,
}

#[async_trait]
pub trait RouteManifestSource: Send + Sync {
    async fn load(&self) -> Result<RouteManifest>;
}

/// Reads `{ "routes": [...] }` from a JSON file.
pub struct JsonRouteManifest {
    path: PathBuf,
}

impl JsonRouteManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RouteManifestSource for JsonRouteManifest {
    async fn load(&self) -> Result<RouteManifest> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read route manifest {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse route manifest {}", self.path.display()))
    }
}

/// Fixed, in-memory route list.
#[derive(Debug, Clone, Default)]
pub struct StaticRouteManifest {
    routes: Vec<String>,
}

impl StaticRouteManifest {
    pub fn new<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            routes: routes.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RouteManifestSource for StaticRouteManifest {
    async fn load(&self) -> Result<RouteManifest> {
        Ok(RouteManifest {
            routes: self.routes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn loads_json_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, r#"{ "routes": ["/", "/dashboard"] }"#).unwrap();

        let manifest = JsonRouteManifest::new(&path).load().await.unwrap();
        assert_eq!(manifest.routes, vec!["/", "/dashboard"]);
    }

    #[tokio::test]
    async fn missing_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        let source = JsonRouteManifest::new(dir.path().join("nope.json"));
        assert!(source.load().await.is_err());
    }
}
