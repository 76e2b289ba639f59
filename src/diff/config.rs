use serde::{Deserialize, Serialize};

/// Tunable constants for the pixel differ. Defaults are the engine's
/// reference values and must stay as they are for comparable results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiffConfig {
    /// Per-pixel matching threshold in YIQ space (0 = exact, 1 = anything matches).
    pub threshold: f64,

    /// Count anti-aliased pixels as differences instead of detecting them.
    pub include_anti_aliasing: bool,

    /// Colour painted for differing pixels.
    pub diff_color: [u8; 3],
    /// Colour painted for anti-aliasing-only differences.
    pub aa_color: [u8; 3],
    /// Opacity of the faded original drawn under unchanged pixels.
    pub grayscale_alpha: f64,

    /// Region scan stride in pixels.
    pub grid_step: u32,
    /// Regions narrower or shorter than this are dropped as noise.
    pub min_region_size: u32,
    /// Regions closer than this are merged.
    pub merge_margin: u32,
    /// Confidence assigned to regions from pixel-exact comparison.
    pub confidence: f64,

    /// Random interior points sampled to classify a region.
    pub sample_points: usize,
    /// Share of empty samples at or above which a side counts as empty.
    pub empty_ratio_high: f64,
    /// Share of empty samples at or below which a side counts as filled.
    pub empty_ratio_low: f64,
    /// RGB channels above this (all three) count as blank page.
    pub near_white: u8,
    /// Fixed seed for region sampling; `None` draws from entropy.
    pub sample_seed: Option<u64>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            include_anti_aliasing: false,
            diff_color: [255, 0, 0],
            aa_color: [255, 255, 0],
            grayscale_alpha: 0.1,
            grid_step: 10,
            min_region_size: 10,
            merge_margin: 20,
            confidence: 0.9,
            sample_points: 10,
            empty_ratio_high: 0.7,
            empty_ratio_low: 0.3,
            near_white: 250,
            sample_seed: None,
        }
    }
}

impl DiffConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_sample_seed(mut self, seed: u64) -> Self {
        self.sample_seed = Some(seed);
        self
    }

    pub fn with_include_anti_aliasing(mut self, include: bool) -> Self {
        self.include_anti_aliasing = include;
        self
    }
}
