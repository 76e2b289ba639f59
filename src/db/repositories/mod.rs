mod baselines;

pub use baselines::{BaselineRepository, ImageMetadata};
