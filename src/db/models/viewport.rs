//! Viewport key used to index baselines and drive capture sizes.

use std::{fmt, str::FromStr};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Browser viewport, keyed as `"{width}x{height}"` (e.g. `"1920x1080"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Default capture matrix: desktop, laptop, mobile.
    pub fn defaults() -> Vec<Viewport> {
        vec![
            Viewport::new(1920, 1080),
            Viewport::new(1366, 768),
            Viewport::new(375, 667),
        ]
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let (width, height) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("viewport '{value}' is not of the form WIDTHxHEIGHT"))?;
        let width: u32 = width
            .trim()
            .parse()
            .with_context(|| format!("invalid viewport width in '{value}'"))?;
        let height: u32 = height
            .trim()
            .parse()
            .with_context(|| format!("invalid viewport height in '{value}'"))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("viewport '{value}' has a zero dimension"));
        }
        Ok(Self { width, height })
    }
}

impl Serialize for Viewport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Viewport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
