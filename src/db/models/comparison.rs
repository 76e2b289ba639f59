//! Transient comparison results. None of these are persisted as entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::baseline::Baseline;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    Added,
    Removed,
    Changed,
}

impl RegionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionType::Added => "added",
            RegionType::Removed => "removed",
            RegionType::Changed => "changed",
        }
    }
}

/// Axis-aligned box in diff-image coordinates (after dimension reconciliation).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiffRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    pub confidence: f64,
}

impl DiffRegion {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True when this box fully contains the given rectangle.
    pub fn covers(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        self.x <= x && self.y <= y && self.right() >= x + width && self.bottom() >= y + height
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub has_differences: bool,
    /// 0-100, rounded to two decimals.
    pub percentage: f64,
    pub pixels_diff: u64,
    pub total_pixels: u64,
    /// PNG-encoded diff image.
    #[serde(default, skip_serializing)]
    pub diff_image: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<DiffRegion>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentScreenshot {
    #[serde(default, skip_serializing)]
    pub bytes: Vec<u8>,
    pub metadata: CaptureMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaselineComparison {
    pub baseline: Baseline,
    pub current: CurrentScreenshot,
    pub diff: DiffResult,
}

impl BaselineComparison {
    pub fn summary(&self) -> String {
        if !self.diff.has_differences {
            return format!(
                "{} @ {}: no differences against baseline {}",
                self.baseline.route, self.baseline.viewport, self.baseline.id
            );
        }

        let region_count = self.diff.regions.as_ref().map(Vec::len).unwrap_or(0);
        format!(
            "{} @ {}: {} of {} pixels differ ({:.2}%), {} region(s)",
            self.baseline.route,
            self.baseline.viewport,
            self.diff.pixels_diff,
            self.diff.total_pixels,
            self.diff.percentage,
            region_count
        )
    }
}
