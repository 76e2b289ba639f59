use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::capture::{capture_route, route_url, Browser, BrowserLauncher, CaptureSettings};
use crate::db::models::{
    Baseline, BaselineComparison, BaselineQuery, CaptureMetadata, DiffRegion, NewBaseline,
    Viewport,
};
use crate::db::repositories::BaselineRepository;
use crate::diff::{decode_image, PixelDiffer};
use crate::routes::RouteManifestSource;
use crate::selection::BaselineStrategy;
use crate::settings::EngineConfig;
use crate::storage::{StorageBackend, UploadOptions};

use super::fetch::FetchOutcome;
use super::keys::{get_baseline_key, is_baseline_image, BASELINE_PREFIX};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "visual_baseline::lifecycle";

use crate::{log_debug, log_error, log_info, log_warn};

pub const SOURCE_TAG: &str = "visual-baseline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineState {
    /// No baseline existed; the capture was stored as the new one.
    Bootstrapped,
    Compared,
    /// Sizes differ; reported as a full difference without a pixel pass.
    DimensionMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualComparison {
    pub has_difference: bool,
    pub diff_percentage: f64,
    pub state: BaselineState,
    #[serde(skip)]
    pub diff_image: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<DiffRegion>,
}

impl VisualComparison {
    fn bootstrapped() -> Self {
        Self {
            has_difference: false,
            diff_percentage: 0.0,
            state: BaselineState::Bootstrapped,
            diff_image: None,
            regions: Vec::new(),
        }
    }

    fn dimension_mismatch() -> Self {
        Self {
            has_difference: true,
            diff_percentage: 100.0,
            state: BaselineState::DimensionMismatch,
            diff_image: None,
            regions: Vec::new(),
        }
    }
}

/// Result of a repository-backed, strategy-selected comparison.
#[derive(Debug, Clone)]
pub enum StrategyComparison {
    Compared(BaselineComparison),
    Bootstrapped(Baseline),
}

impl StrategyComparison {
    pub fn state(&self) -> BaselineState {
        match self {
            StrategyComparison::Compared(_) => BaselineState::Compared,
            StrategyComparison::Bootstrapped(_) => BaselineState::Bootstrapped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// No reference URL configured.
    Disabled,
    ColdStart { created: Vec<String> },
    Incremental { created: Vec<String> },
    /// An internal error was downgraded to a warning.
    Skipped,
}

/// Drives capture, creation, backfill and comparison over a route × viewport
/// matrix using one browser per run.
pub struct BaselineManager {
    storage: Arc<dyn StorageBackend>,
    launcher: Arc<dyn BrowserLauncher>,
    routes: Arc<dyn RouteManifestSource>,
    repository: Option<Arc<BaselineRepository>>,
    differ: PixelDiffer,
    config: EngineConfig,
}

impl BaselineManager {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        launcher: Arc<dyn BrowserLauncher>,
        routes: Arc<dyn RouteManifestSource>,
        config: EngineConfig,
    ) -> Self {
        let differ = PixelDiffer::new(Arc::clone(&storage), config.diff.clone());
        Self {
            storage,
            launcher,
            routes,
            repository: None,
            differ,
            config,
        }
    }

    pub fn with_repository(mut self, repository: Arc<BaselineRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn differ(&self) -> &PixelDiffer {
        &self.differ
    }

    /// `viewports`, or the configured matrix when it is empty.
    fn viewports_or_configured<'a>(&'a self, viewports: &'a [Viewport]) -> &'a [Viewport] {
        if viewports.is_empty() {
            &self.config.viewports
        } else {
            viewports
        }
    }

    /// Capture and store every route × viewport pair. Returns the keys written.
    /// An empty `viewports` uses the configured viewports.
    pub async fn create_baselines(
        &self,
        routes: &[String],
        viewports: &[Viewport],
    ) -> Result<Vec<String>> {
        let Some(base_url) = self.config.reference_url() else {
            log_info!("No reference URL configured; skipping baseline creation");
            return Ok(Vec::new());
        };
        let viewports = self.viewports_or_configured(viewports);
        if routes.is_empty() || viewports.is_empty() {
            return Ok(Vec::new());
        }

        log_info!(
            "Creating baselines for {} routes x {} viewports from {}",
            routes.len(),
            viewports.len(),
            base_url
        );

        let mut browser = self
            .launcher
            .launch()
            .await
            .context("failed to launch browser")?;

        let result = self
            .capture_matrix(browser.as_mut(), base_url, routes, viewports)
            .await;

        if let Err(err) = browser.close().await {
            log_warn!("Failed to close browser: {err:#}");
        }

        let created = result?;
        log_info!(
            "Created {} of {} baselines",
            created.len(),
            routes.len() * viewports.len()
        );
        Ok(created)
    }

    async fn capture_matrix(
        &self,
        browser: &mut dyn Browser,
        base_url: &str,
        routes: &[String],
        viewports: &[Viewport],
    ) -> Result<Vec<String>> {
        let mut context = browser
            .new_context()
            .await
            .context("failed to open browser context")?;
        let mut page = context.new_page().await.context("failed to open page")?;
        let settings: CaptureSettings = self.config.capture_settings();

        let mut created = Vec::new();
        for route in routes {
            let url = route_url(base_url, route);
            for &viewport in viewports {
                let stored = match capture_route(page.as_mut(), &url, viewport, &settings).await {
                    Ok(bytes) => self.update_baseline(route, viewport, &bytes).await,
                    Err(err) => Err(err),
                };
                match stored {
                    Ok(key) => created.push(key),
                    Err(err) => {
                        log_warn!("Skipping baseline for {} @ {}: {err:#}", route, viewport);
                    }
                }
            }
        }
        Ok(created)
    }

    /// Baseline every route in the manifest.
    pub async fn create_all_baselines(&self, viewports: &[Viewport]) -> Result<Vec<String>> {
        let manifest = self
            .routes
            .load()
            .await
            .context("failed to load route manifest")?;
        self.create_baselines(&manifest.routes, viewports).await
    }

    /// Create baselines for routes that have none at any of `viewports`.
    /// A route with partial viewport coverage is left alone.
    pub async fn create_missing_baselines(
        &self,
        routes: &[String],
        viewports: &[Viewport],
    ) -> Result<Vec<String>> {
        let viewports = self.viewports_or_configured(viewports);
        let mut missing = Vec::new();
        for route in routes {
            let mut covered = false;
            for &viewport in viewports {
                if self.fetch_outcome(route, viewport).await.is_found() {
                    covered = true;
                    break;
                }
            }
            if !covered {
                missing.push(route.clone());
            }
        }

        if missing.is_empty() {
            log_debug!("All {} routes have baselines", routes.len());
            return Ok(Vec::new());
        }

        log_info!("{} routes missing baselines: {:?}", missing.len(), missing);
        self.create_baselines(&missing, viewports).await
    }

    pub async fn fetch_outcome(&self, route: &str, viewport: Viewport) -> FetchOutcome {
        let key = get_baseline_key(route, viewport);
        FetchOutcome::from_download(self.storage.download_file(&key).await)
    }

    /// Stored baseline bytes, or `None` when absent or unreadable.
    pub async fn fetch_baseline(&self, route: &str, viewport: Viewport) -> Option<Vec<u8>> {
        match self.fetch_outcome(route, viewport).await {
            FetchOutcome::Found(bytes) => Some(bytes),
            FetchOutcome::Absent => {
                log_info!("No baseline for {} @ {}", route, viewport);
                None
            }
            FetchOutcome::Error(err) => {
                log_warn!("Failed to fetch baseline for {} @ {}: {err}", route, viewport);
                None
            }
        }
    }

    /// Write `bytes` as the baseline for the pair. Failures propagate.
    pub async fn update_baseline(
        &self,
        route: &str,
        viewport: Viewport,
        bytes: &[u8],
    ) -> Result<String> {
        let key = get_baseline_key(route, viewport);
        let options = UploadOptions::png()
            .with_metadata("route", route)
            .with_metadata("viewport", viewport.to_string())
            .with_metadata("timestamp", Utc::now().to_rfc3339())
            .with_metadata("source", SOURCE_TAG);

        match self.storage.upload_file(&key, bytes, options).await {
            Ok(path) => {
                log_debug!("Stored baseline {} ({} bytes)", path, bytes.len());
                Ok(path)
            }
            Err(err) => {
                log_error!("Failed to store baseline {}: {err}", key);
                Err(anyhow::Error::new(err).context(format!(
                    "failed to update baseline for route '{route}' at viewport {viewport}"
                )))
            }
        }
    }

    /// Compare against the stored baseline, bootstrapping it when absent.
    pub async fn compare_with_baseline(
        &self,
        route: &str,
        viewport: Viewport,
        current: &[u8],
    ) -> Result<VisualComparison> {
        let Some(baseline_bytes) = self.fetch_baseline(route, viewport).await else {
            self.update_baseline(route, viewport, current).await?;
            log_info!("Bootstrapped baseline for {} @ {}", route, viewport);
            return Ok(VisualComparison::bootstrapped());
        };

        let baseline = decode_image(&baseline_bytes)
            .with_context(|| format!("failed to decode baseline for {route} @ {viewport}"))?;
        let current = match decode_image(current) {
            Ok(image) => image,
            Err(err) => {
                log_warn!(
                    "Current capture for {} @ {} is undecodable ({err:#}); reporting full difference",
                    route,
                    viewport
                );
                return Ok(VisualComparison {
                    state: BaselineState::Compared,
                    ..VisualComparison::dimension_mismatch()
                });
            }
        };

        if baseline.dimensions() != current.dimensions() {
            log_info!(
                "Dimension mismatch for {} @ {}: baseline {:?}, current {:?}",
                route,
                viewport,
                baseline.dimensions(),
                current.dimensions()
            );
            return Ok(VisualComparison::dimension_mismatch());
        }

        let diff = self.differ.diff_images(&baseline, &current);
        let has_difference = diff.percentage > self.config.noise_floor_percent;
        log_debug!(
            "{} @ {}: {:.2}% different ({} pixels)",
            route,
            viewport,
            diff.percentage,
            diff.pixels_diff
        );

        Ok(VisualComparison {
            has_difference,
            diff_percentage: diff.percentage,
            state: BaselineState::Compared,
            diff_image: diff.diff_image,
            regions: diff.regions.unwrap_or_default(),
        })
    }

    /// Make sure baselines exist before a run. Never fails; errors are
    /// logged as warnings. Empty `routes` falls back to the manifest and
    /// empty `viewports` to the configured viewports.
    pub async fn ensure_baselines(&self, routes: &[String], viewports: &[Viewport]) -> EnsureOutcome {
        if self.config.reference_url().is_none() {
            log_info!("Visual comparison disabled: no reference URL configured");
            return EnsureOutcome::Disabled;
        }

        match self.try_ensure(routes, viewports).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_warn!("Could not ensure baselines; continuing without them: {err:#}");
                EnsureOutcome::Skipped
            }
        }
    }

    async fn try_ensure(&self, routes: &[String], viewports: &[Viewport]) -> Result<EnsureOutcome> {
        let routes = if routes.is_empty() {
            self.routes
                .load()
                .await
                .context("failed to load route manifest")?
                .routes
        } else {
            routes.to_vec()
        };

        let existing = self
            .storage
            .list_files(BASELINE_PREFIX)
            .await
            .context("failed to list existing baselines")?;
        let has_any = existing.iter().any(|key| is_baseline_image(key));

        if has_any {
            let created = self.create_missing_baselines(&routes, viewports).await?;
            Ok(EnsureOutcome::Incremental { created })
        } else {
            log_info!("No baselines found; creating the full set");
            let created = self.create_baselines(&routes, viewports).await?;
            Ok(EnsureOutcome::ColdStart { created })
        }
    }

    /// Select a baseline from the repository with `strategy` and diff against
    /// it. Without a selection the capture is saved as a new baseline.
    ///
    /// `query` narrows the candidate set; its branch is only handed to the
    /// strategy, and its pagination is ignored.
    pub async fn compare_with_strategy(
        &self,
        query: &BaselineQuery,
        strategy: &BaselineStrategy,
        current: NewBaseline,
        metadata: Option<CaptureMetadata>,
    ) -> Result<StrategyComparison> {
        let repository = self
            .repository
            .as_ref()
            .context("strategy comparison requires a baseline repository")?;

        let mut candidate_query = query.clone().with_offset(0).with_limit(usize::MAX);
        if let Some(filter) = candidate_query.repository.as_mut() {
            filter.branch = None;
        }
        let candidates = repository.find(&candidate_query).await;

        match strategy.select_baseline(query, &candidates) {
            Some(baseline) => {
                log_debug!(
                    "{} strategy selected baseline {} ({})",
                    strategy.name(),
                    baseline.id,
                    baseline.metadata.commit
                );
                let comparison = self
                    .differ
                    .compare(baseline, &current.image, metadata)
                    .await?;
                Ok(StrategyComparison::Compared(comparison))
            }
            None => {
                log_info!(
                    "{} strategy found no baseline among {} candidates for {} @ {}; bootstrapping",
                    strategy.name(),
                    candidates.len(),
                    current.route,
                    current.viewport
                );
                let saved = repository.save(current).await?;
                Ok(StrategyComparison::Bootstrapped(saved))
            }
        }
    }
}
