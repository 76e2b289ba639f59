pub mod config;
pub mod merge;
pub mod pixel;
pub mod regions;

pub use config::DiffConfig;
pub use merge::merge_regions;
pub use pixel::{decode_image, encode_png, pixel_diff, reconcile, resize_nearest};
pub use regions::{classify_region, extract_regions, Rect};

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use image::RgbaImage;
use rand::{rngs::StdRng, SeedableRng};

use crate::db::models::{
    Baseline, BaselineComparison, CaptureMetadata, CurrentScreenshot, DiffRegion, DiffResult,
};
use crate::storage::StorageBackend;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "visual_baseline::diff";

use crate::{log_debug, log_warn};

/// Pixel-level comparison of a capture against a resolved baseline.
pub struct PixelDiffer {
    storage: Arc<dyn StorageBackend>,
    config: DiffConfig,
}

impl PixelDiffer {
    pub fn new(storage: Arc<dyn StorageBackend>, config: DiffConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Compare `current` against `baseline`'s stored image.
    ///
    /// Only fetching or decoding the baseline can fail; every other condition,
    /// including an undecodable capture, yields a comparison.
    pub async fn compare(
        &self,
        baseline: &Baseline,
        current: &[u8],
        metadata: Option<CaptureMetadata>,
    ) -> Result<BaselineComparison> {
        let baseline_bytes = self
            .storage
            .download_file(&baseline.storage.path)
            .await
            .with_context(|| format!("failed to fetch baseline image for {}", baseline.id))?;
        let baseline_image = decode_image(&baseline_bytes)
            .with_context(|| format!("failed to decode baseline image for {}", baseline.id))?;

        let diff = match decode_image(current) {
            Ok(current_image) => self.diff_images(&baseline_image, &current_image),
            Err(err) => {
                log_warn!(
                    "Current capture for {} @ {} is undecodable ({err:#}); reporting full difference",
                    baseline.route,
                    baseline.viewport
                );
                total_difference(&baseline_image)
            }
        };

        let mut metadata = metadata.unwrap_or_default();
        metadata.captured_at.get_or_insert_with(Utc::now);

        Ok(BaselineComparison {
            baseline: baseline.clone(),
            current: CurrentScreenshot {
                bytes: current.to_vec(),
                metadata,
            },
            diff,
        })
    }

    /// Full diff of two decoded images, reconciling sizes first.
    pub fn diff_images(&self, baseline: &RgbaImage, current: &RgbaImage) -> DiffResult {
        let (reconciled_baseline, reconciled_current) = reconcile(baseline, current);
        let result = pixel_diff(&reconciled_baseline, &reconciled_current, &self.config);

        let (width, height) = result.diff_image.dimensions();
        let total_pixels = u64::from(width) * u64::from(height);
        let percentage = round_percentage(result.pixels_diff, total_pixels);
        let has_differences = result.pixels_diff > 0;

        let regions = has_differences.then(|| self.find_regions(&result.diff_image, baseline, current));

        log_debug!(
            "Pixel diff: {} of {} pixels differ ({:.2}%), {} anti-aliased",
            result.pixels_diff,
            total_pixels,
            percentage,
            result.anti_aliased
        );

        let diff_image = match encode_png(&result.diff_image) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log_warn!("Failed to encode diff image: {err:#}");
                None
            }
        };

        DiffResult {
            has_differences,
            percentage,
            pixels_diff: result.pixels_diff,
            total_pixels,
            diff_image,
            regions,
        }
    }

    fn find_regions(
        &self,
        diff_image: &RgbaImage,
        baseline: &RgbaImage,
        current: &RgbaImage,
    ) -> Vec<DiffRegion> {
        let mut rng = match self.config.sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let raw: Vec<DiffRegion> = extract_regions(diff_image, &self.config)
            .into_iter()
            .map(|rect| DiffRegion {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                region_type: classify_region(&rect, baseline, current, &self.config, &mut rng),
                confidence: self.config.confidence,
            })
            .collect();

        merge_regions(raw, self.config.merge_margin)
    }
}

/// `pixels / total * 100`, rounded to two decimals.
pub fn round_percentage(pixels: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percentage = pixels as f64 / total as f64 * 100.0;
    (percentage * 100.0).round() / 100.0
}

fn total_difference(baseline: &RgbaImage) -> DiffResult {
    let total_pixels = u64::from(baseline.width()) * u64::from(baseline.height());
    DiffResult {
        has_differences: true,
        percentage: 100.0,
        pixels_diff: total_pixels,
        total_pixels,
        diff_image: None,
        regions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BaselineMetadata, Dimensions, RegionType, RepositoryRef, StorageRef};
    use crate::storage::{MemoryStorage, UploadOptions};
    use image::Rgba;

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    fn differ(storage: Arc<MemoryStorage>) -> PixelDiffer {
        PixelDiffer::new(storage, DiffConfig::default().with_sample_seed(42))
    }

    async fn stored_baseline(storage: &MemoryStorage, image: &RgbaImage) -> Baseline {
        let bytes = encode_png(image).unwrap();
        storage
            .upload_file("baseline-images/x.png", &bytes, UploadOptions::png())
            .await
            .unwrap();
        Baseline {
            id: "b1".into(),
            repository: RepositoryRef::new("acme", "web", "main"),
            route: "/dashboard".into(),
            viewport: "1920x1080".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: BaselineMetadata::default(),
            storage: StorageRef {
                provider: "memory".into(),
                path: "baseline-images/x.png".into(),
                url: None,
                size: None,
            },
            fingerprint: crate::db::helpers::fingerprint(&bytes),
            dimensions: Dimensions {
                width: image.width(),
                height: image.height(),
            },
        }
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_percentage(1, 3), 33.33);
        assert_eq!(round_percentage(2, 3), 66.67);
        assert_eq!(round_percentage(0, 0), 0.0);
    }

    #[test]
    fn identical_images_report_no_regions() {
        let differ = differ(Arc::new(MemoryStorage::new()));
        let img = white(50, 50);
        let diff = differ.diff_images(&img, &img);
        assert!(!diff.has_differences);
        assert_eq!(diff.percentage, 0.0);
        assert!(diff.regions.is_none());
        assert!(diff.diff_image.is_some());
    }

    #[test]
    fn added_block_is_classified() {
        let differ = differ(Arc::new(MemoryStorage::new()));
        let baseline = white(200, 200);
        let mut current = baseline.clone();
        for y in 40..100 {
            for x in 40..100 {
                current.put_pixel(x, y, Rgba([30, 30, 30, 255]));
            }
        }

        let diff = differ.diff_images(&baseline, &current);
        assert!(diff.has_differences);
        assert_eq!(diff.pixels_diff, 3600);
        assert_eq!(diff.percentage, 9.0);
        let regions = diff.regions.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].region_type, RegionType::Added);
        assert_eq!(regions[0].confidence, 0.9);
    }

    #[test]
    fn mismatched_sizes_are_reconciled() {
        let differ = differ(Arc::new(MemoryStorage::new()));
        let diff = differ.diff_images(&white(40, 20), &white(20, 40));
        assert_eq!(diff.total_pixels, 1600);
        assert!(!diff.has_differences);
    }

    #[tokio::test]
    async fn compare_fetches_baseline_and_tolerates_bad_capture() {
        let storage = Arc::new(MemoryStorage::new());
        let differ = differ(storage.clone());
        let baseline = stored_baseline(&storage, &white(10, 10)).await;

        let same = differ
            .compare(&baseline, &encode_png(&white(10, 10)).unwrap(), None)
            .await
            .unwrap();
        assert!(!same.diff.has_differences);
        assert!(same.current.metadata.captured_at.is_some());

        let garbage = differ.compare(&baseline, b"garbage", None).await.unwrap();
        assert!(garbage.diff.has_differences);
        assert_eq!(garbage.diff.percentage, 100.0);
        assert_eq!(garbage.diff.total_pixels, 100);
    }

    #[tokio::test]
    async fn compare_fails_when_baseline_is_missing() {
        let storage = Arc::new(MemoryStorage::new());
        let differ = differ(storage.clone());
        let mut baseline = stored_baseline(&storage, &white(10, 10)).await;
        baseline.storage.path = "baseline-images/missing.png".into();

        let result = differ
            .compare(&baseline, &encode_png(&white(10, 10)).unwrap(), None)
            .await;
        assert!(result.is_err());
    }
}
