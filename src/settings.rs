use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureSettings;
use crate::db::models::Viewport;
use crate::diff::DiffConfig;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "visual_baseline::settings";

use crate::log_warn;

pub const REFERENCE_URL_ENV: &str = "VISUAL_BASELINE_REFERENCE_URL";
pub const DEBUG_ENV: &str = "VISUAL_BASELINE_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Production/reference origin baselines are captured from. Visual
    /// comparison is disabled while this is unset.
    pub reference_url: Option<String>,
    pub viewports: Vec<Viewport>,
    pub navigation_timeout_ms: u64,
    pub settle_delay_ms: u64,
    /// Diff percentages at or below this are reported as no difference.
    pub noise_floor_percent: f64,
    pub index_path: String,
    pub diff: DiffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_url: None,
            viewports: Viewport::defaults(),
            navigation_timeout_ms: 30_000,
            settle_delay_ms: 1_000,
            noise_floor_percent: 0.1,
            index_path: "baselines/index.json".into(),
            diff: DiffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_reference_url(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    pub fn with_settle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.settle_delay_ms = delay_ms;
        self
    }

    /// The reference URL, if set to something non-blank.
    pub fn reference_url(&self) -> Option<&str> {
        self.reference_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    /// Overlay `VISUAL_BASELINE_REFERENCE_URL` and `VISUAL_BASELINE_DEBUG`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(REFERENCE_URL_ENV).ok(),
            std::env::var(DEBUG_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, reference_url: Option<String>, debug: Option<String>) {
        if let Some(url) = reference_url.filter(|url| !url.trim().is_empty()) {
            self.reference_url = Some(url);
        }

        let debug_mode = debug
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.settle_delay_ms = 0;
        }
    }
}

/// JSON-file-backed engine configuration.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineConfig>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!(
                    "Ignoring unparsable settings at {}: {err}; using defaults",
                    path.display()
                );
                EngineConfig::default()
            })
        } else {
            EngineConfig::default()
        };
        data.apply_env_overrides();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineConfig> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineConfig> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.read().clone()
    }

    pub fn update(&self, config: EngineConfig) -> Result<()> {
        let mut guard = self.write();
        *guard = config;
        self.persist(&guard)
    }

    fn persist(&self, data: &EngineConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
