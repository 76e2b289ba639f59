mod fetch;
mod keys;
mod manager;

pub use fetch::FetchOutcome;
pub use keys::{get_baseline_key, is_baseline_image, sanitize_route, BASELINE_PREFIX};
pub use manager::{
    BaselineManager, BaselineState, EnsureOutcome, StrategyComparison, VisualComparison,
    SOURCE_TAG,
};
