//! Coarse region extraction over the diff image, and change classification.

use image::{Rgba, RgbaImage};
use rand::Rng;

use crate::db::models::RegionType;

use super::config::DiffConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Sampled flood fill on a `grid_step` lattice.
///
/// Each unvisited lattice point painted with the diff colour seeds a
/// 4-directional fill that stays on the lattice. Every point reached stands
/// for the `grid_step` cell to its lower right, so the box spans whole cells,
/// clamped to the image. Boxes smaller than `min_region_size` on either axis
/// are dropped. Changes that fall between lattice points are not seen.
pub fn extract_regions(diff_image: &RgbaImage, config: &DiffConfig) -> Vec<Rect> {
    let (width, height) = diff_image.dimensions();
    let step = config.grid_step.max(1);
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let cols = width.div_ceil(step) as usize;
    let rows = height.div_ceil(step) as usize;
    let mut visited = vec![false; cols * rows];
    let diff_color = Rgba([
        config.diff_color[0],
        config.diff_color[1],
        config.diff_color[2],
        255,
    ]);
    let is_diff = |gx: usize, gy: usize| {
        *diff_image.get_pixel(gx as u32 * step, gy as u32 * step) == diff_color
    };

    let mut regions = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for gy in 0..rows {
        for gx in 0..cols {
            if visited[gy * cols + gx] || !is_diff(gx, gy) {
                continue;
            }

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (gx, gy, gx, gy);
            visited[gy * cols + gx] = true;
            stack.push((gx, gy));

            while let Some((cx, cy)) = stack.pop() {
                min_x = min_x.min(cx);
                max_x = max_x.max(cx);
                min_y = min_y.min(cy);
                max_y = max_y.max(cy);

                let neighbours = [
                    (cx.checked_sub(1), Some(cy)),
                    (Some(cx + 1).filter(|&x| x < cols), Some(cy)),
                    (Some(cx), cy.checked_sub(1)),
                    (Some(cx), Some(cy + 1).filter(|&y| y < rows)),
                ];
                for (nx, ny) in neighbours {
                    let (Some(nx), Some(ny)) = (nx, ny) else {
                        continue;
                    };
                    let idx = ny * cols + nx;
                    if !visited[idx] && is_diff(nx, ny) {
                        visited[idx] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            let x = min_x as u32 * step;
            let y = min_y as u32 * step;
            let rect = Rect {
                x,
                y,
                width: ((max_x - min_x + 1) as u32 * step).min(width - x),
                height: ((max_y - min_y + 1) as u32 * step).min(height - y),
            };
            if rect.width >= config.min_region_size && rect.height >= config.min_region_size {
                regions.push(rect);
            }
        }
    }

    regions
}

/// Decide whether content appeared, disappeared or changed inside `rect`.
///
/// Samples are drawn from the original, un-resized images; points outside an
/// image's own bounds count as empty there.
pub fn classify_region<R: Rng>(
    rect: &Rect,
    baseline: &RgbaImage,
    current: &RgbaImage,
    config: &DiffConfig,
    rng: &mut R,
) -> RegionType {
    let samples = config.sample_points.max(1);
    let mut baseline_empty = 0usize;
    let mut current_empty = 0usize;

    for _ in 0..samples {
        let x = rect.x + rng.gen_range(0..rect.width.max(1));
        let y = rect.y + rng.gen_range(0..rect.height.max(1));
        if is_empty_at(baseline, x, y, config.near_white) {
            baseline_empty += 1;
        }
        if is_empty_at(current, x, y, config.near_white) {
            current_empty += 1;
        }
    }

    let baseline_ratio = baseline_empty as f64 / samples as f64;
    let current_ratio = current_empty as f64 / samples as f64;

    if baseline_ratio >= config.empty_ratio_high && current_ratio <= config.empty_ratio_low {
        RegionType::Added
    } else if current_ratio >= config.empty_ratio_high && baseline_ratio <= config.empty_ratio_low {
        RegionType::Removed
    } else {
        RegionType::Changed
    }
}

/// Transparent or near-white counts as blank page.
fn is_empty_at(image: &RgbaImage, x: u32, y: u32, near_white: u8) -> bool {
    if x >= image.width() || y >= image.height() {
        return true;
    }
    let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
    a == 0 || (r > near_white && g > near_white && b > near_white)
}
