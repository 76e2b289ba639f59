//! Baseline storage, selection and pixel-level visual diffing for
//! screenshot-based regression checks.

pub mod capture;
pub mod db;
pub mod diff;
pub mod lifecycle;
pub mod routes;
pub mod selection;
pub mod settings;
pub mod storage;
pub mod utils;

pub use capture::{BrowserLauncher, CaptureSettings};
pub use db::models::{
    Baseline, BaselineComparison, BaselineMetadata, BaselineQuery, DiffRegion, DiffResult,
    NewBaseline, RegionType, RepositoryRef, Viewport,
};
pub use db::{BaselineRepository, IndexStore, SqliteIndexStore, StorageIndexStore};
pub use diff::{DiffConfig, PixelDiffer};
pub use lifecycle::{
    get_baseline_key, BaselineManager, BaselineState, EnsureOutcome, FetchOutcome,
    StrategyComparison, VisualComparison,
};
pub use routes::{JsonRouteManifest, RouteManifest, RouteManifestSource, StaticRouteManifest};
pub use selection::BaselineStrategy;
pub use settings::{EngineConfig, SettingsStore};
pub use storage::{FsStorage, MemoryStorage, StorageBackend, StorageError, UploadOptions};
pub use utils::init_logging;
