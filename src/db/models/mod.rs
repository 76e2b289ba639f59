pub mod baseline;
pub mod comparison;
pub mod query;
pub mod viewport;

pub use baseline::{Baseline, BaselineMetadata, Dimensions, NewBaseline, RepositoryRef, StorageRef};
pub use comparison::{
    BaselineComparison, CaptureMetadata, CurrentScreenshot, DiffRegion, DiffResult, RegionType,
};
pub use query::{BaselineQuery, RepositoryFilter, DEFAULT_QUERY_LIMIT};
pub use viewport::Viewport;
