pub mod strategy;

pub use strategy::{most_recent, BaselineStrategy, STABLE_TAG};
