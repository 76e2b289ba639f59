//! Dimension reconciliation and the per-pixel comparison pass.
//!
//! Colour distance is measured in YIQ space with alpha blended against
//! white, and anti-aliased edges are told apart from real changes by
//! looking at each pixel's 3x3 neighbourhood in both images.

use std::{borrow::Cow, io::Cursor};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};

use super::config::DiffConfig;

/// Largest possible YIQ delta between two colours.
const MAX_YIQ_DELTA: f64 = 35215.0;

pub struct PixelDiff {
    pub diff_image: RgbaImage,
    pub pixels_diff: u64,
    pub anti_aliased: u64,
}

pub fn decode_image(data: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory(data)
        .map(|img| img.to_rgba8())
        .context("failed to decode image")
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(buffer)
}

/// Bring both images onto a shared `max(w) x max(h)` canvas.
///
/// Mismatched images are stretched with nearest-neighbour sampling, which can
/// distort aspect ratio when both axes differ.
pub fn reconcile<'a>(
    baseline: &'a RgbaImage,
    current: &'a RgbaImage,
) -> (Cow<'a, RgbaImage>, Cow<'a, RgbaImage>) {
    if baseline.dimensions() == current.dimensions() {
        return (Cow::Borrowed(baseline), Cow::Borrowed(current));
    }

    let width = baseline.width().max(current.width());
    let height = baseline.height().max(current.height());
    (
        resize_nearest(baseline, width, height),
        resize_nearest(current, width, height),
    )
}

/// Source pixel for each destination pixel is `floor(dst * src / dst_dim)` per axis.
pub fn resize_nearest(src: &RgbaImage, width: u32, height: u32) -> Cow<'_, RgbaImage> {
    if src.dimensions() == (width, height) {
        return Cow::Borrowed(src);
    }

    let (src_w, src_h) = src.dimensions();
    let mut out = RgbaImage::new(width, height);
    if src_w == 0 || src_h == 0 {
        return Cow::Owned(out);
    }

    for y in 0..height {
        let sy = (u64::from(y) * u64::from(src_h) / u64::from(height)) as u32;
        for x in 0..width {
            let sx = (u64::from(x) * u64::from(src_w) / u64::from(width)) as u32;
            out.put_pixel(x, y, *src.get_pixel(sx, sy));
        }
    }
    Cow::Owned(out)
}

/// Compare two equally sized images and paint the diff image.
///
/// Differing pixels get `diff_color`, anti-aliasing-only differences get
/// `aa_color`, and everything else a faded grayscale copy of the baseline.
pub fn pixel_diff(baseline: &RgbaImage, current: &RgbaImage, config: &DiffConfig) -> PixelDiff {
    debug_assert_eq!(baseline.dimensions(), current.dimensions());

    let (width, height) = baseline.dimensions();
    let img1: &[u8] = baseline.as_raw();
    let img2: &[u8] = current.as_raw();
    let mut diff_image = RgbaImage::new(width, height);

    let max_delta = MAX_YIQ_DELTA * config.threshold * config.threshold;
    let mut pixels_diff = 0u64;
    let mut anti_aliased = 0u64;

    {
        let out: &mut [u8] = &mut diff_image;
        let identical = img1 == img2;

        for y in 0..height {
            for x in 0..width {
                let pos = (y as usize * width as usize + x as usize) * 4;

                if identical {
                    draw_gray_pixel(img1, pos, config.grayscale_alpha, out);
                    continue;
                }

                let delta = color_delta(img1, img2, pos, pos, false);
                if delta.abs() > max_delta {
                    let is_aa = !config.include_anti_aliasing
                        && (antialiased(img1, x, y, width, height, img2)
                            || antialiased(img2, x, y, width, height, img1));
                    if is_aa {
                        draw_pixel(out, pos, config.aa_color);
                        anti_aliased += 1;
                    } else {
                        draw_pixel(out, pos, config.diff_color);
                        pixels_diff += 1;
                    }
                } else {
                    draw_gray_pixel(img1, pos, config.grayscale_alpha, out);
                }
            }
        }
    }

    PixelDiff {
        diff_image,
        pixels_diff,
        anti_aliased,
    }
}

/// Whether the pixel at (x1, y1) looks like an anti-aliased edge between
/// two flat areas present in both images.
fn antialiased(img: &[u8], x1: u32, y1: u32, width: u32, height: u32, img2: &[u8]) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = offset(x1, y1, width);

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.0f64;
    let mut max = 0.0f64;
    let mut min_at = (0, 0);
    let mut max_at = (0, 0);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }

            let delta = color_delta(img, img, pos, offset(x, y, width), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (x, y);
            } else if delta > max {
                max = delta;
                max_at = (x, y);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_at.0, min_at.1, width, height)
        && has_many_siblings(img2, min_at.0, min_at.1, width, height))
        || (has_many_siblings(img, max_at.0, max_at.1, width, height)
            && has_many_siblings(img2, max_at.0, max_at.1, width, height))
}

/// More than two identical neighbours in the 3x3 box around (x1, y1).
fn has_many_siblings(img: &[u8], x1: u32, y1: u32, width: u32, height: u32) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = offset(x1, y1, width);

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let other = offset(x, y, width);
            if img[pos..pos + 4] == img[other..other + 4] {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }
    false
}

/// Squared YIQ distance between two pixels, negative when the first one is
/// brighter. With `y_only` the signed luma difference is returned instead.
fn color_delta(img1: &[u8], img2: &[u8], k: usize, m: usize, y_only: bool) -> f64 {
    if img1[k..k + 4] == img2[m..m + 4] {
        return 0.0;
    }

    let (r1, g1, b1) = blend_rgba(&img1[k..k + 4]);
    let (r2, g2, b2) = blend_rgba(&img2[m..m + 4]);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

fn blend_rgba(px: &[u8]) -> (f64, f64, f64) {
    let (r, g, b, a) = (
        f64::from(px[0]),
        f64::from(px[1]),
        f64::from(px[2]),
        px[3],
    );
    if a < 255 {
        let alpha = f64::from(a) / 255.0;
        (blend(r, alpha), blend(g, alpha), blend(b, alpha))
    } else {
        (r, g, b)
    }
}

/// Blend a channel with white.
fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

fn draw_pixel(out: &mut [u8], pos: usize, [r, g, b]: [u8; 3]) {
    out[pos] = r;
    out[pos + 1] = g;
    out[pos + 2] = b;
    out[pos + 3] = 255;
}

fn draw_gray_pixel(img: &[u8], pos: usize, alpha: f64, out: &mut [u8]) {
    let luma = rgb2y(
        f64::from(img[pos]),
        f64::from(img[pos + 1]),
        f64::from(img[pos + 2]),
    );
    let value = blend(luma, alpha * f64::from(img[pos + 3]) / 255.0)
        .round()
        .clamp(0.0, 255.0) as u8;
    draw_pixel(out, pos, [value, value, value]);
}

fn offset(x: u32, y: u32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}
