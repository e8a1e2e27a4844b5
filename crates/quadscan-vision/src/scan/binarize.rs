// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binarization: global Otsu thresholding, local-mean adaptive thresholding,
// and shadow compensation for unevenly lit documents.

use image::{GrayImage, Luma};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use tracing::debug;

use super::morphology::{max_filter, min_filter};

/// Global Otsu binarization.
///
/// Returns the chosen threshold and a mask where pixels brighter than the
/// threshold are 255.
pub fn otsu_binarize(gray: &GrayImage) -> (u8, GrayImage) {
    if gray.width() == 0 || gray.height() == 0 {
        return (128, gray.clone());
    }
    let level = otsu_level(gray);
    debug!(level, "Otsu threshold computed");
    (level, threshold(gray, level, ThresholdType::Binary))
}

/// Adaptive thresholding against the local mean.
///
/// A pixel is black when it is darker than the mean of its
/// `(2 * block_radius + 1)` square window minus `offset`, white otherwise.
/// Windows are clipped at the border. Flat regions of any brightness come
/// out white, so only the dark side of an edge survives as black.
pub fn adaptive_threshold(gray: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let sums = integral_image::<_, u64>(gray);

    GrayImage::from_fn(width, height, |x, y| {
        let (left, top) = (x.saturating_sub(block_radius), y.saturating_sub(block_radius));
        let right = (x + block_radius).min(width - 1);
        let bottom = (y + block_radius).min(height - 1);
        let count = u64::from(right - left + 1) * u64::from(bottom - top + 1);
        let mean = sum_image_pixels(&sums, left, top, right, bottom)[0] / count;

        let level = mean as i32 - offset;
        if i32::from(gray.get_pixel(x, y).0[0]) < level {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    })
}

/// Flatten uneven illumination.
///
/// The background is estimated with a grey-level closing (max then min
/// filter) of the given radius; each pixel is divided by its background and
/// rescaled to the full 8-bit range.
pub fn compensate_shadows(gray: &GrayImage, radius: u32) -> GrayImage {
    let background = min_filter(&max_filter(gray, radius), radius);
    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y).0[0] as f32;
        let bg = background.get_pixel(x, y).0[0].max(1) as f32;
        Luma([(value / bg * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// Per-pixel mix `(1 - weight) * base + weight * overlay`.
///
/// Shadow compensation alone flattens large uniform regions, document and
/// background alike, so it is mixed back into the original.
pub fn blend(base: &GrayImage, overlay: &GrayImage, weight: f32) -> GrayImage {
    let (width, height) = base.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let a = base.get_pixel(x, y).0[0] as f32;
        let b = overlay.get_pixel(x, y).0[0] as f32;
        Luma([((1.0 - weight) * a + weight * b).round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal() -> GrayImage {
        GrayImage::from_fn(40, 40, |x, _| if x < 20 { Luma([30]) } else { Luma([220]) })
    }

    #[test]
    fn otsu_splits_bimodal_histogram() {
        let (threshold, mask) = otsu_binarize(&bimodal());
        assert!((30..220).contains(&threshold), "threshold {threshold}");
        assert_eq!(mask.get_pixel(5, 5).0[0], 0);
        assert_eq!(mask.get_pixel(35, 5).0[0], 255);
    }

    #[test]
    fn otsu_of_empty_image_is_midpoint() {
        let (level, mask) = otsu_binarize(&GrayImage::new(0, 0));
        assert_eq!(level, 128);
        assert_eq!(mask.dimensions(), (0, 0));
    }

    #[test]
    fn adaptive_offset_spares_faint_texture() {
        // A 6-level ripple sits well inside an offset of 10.
        let img = GrayImage::from_fn(30, 30, |x, _| Luma([100 + (x % 2) as u8 * 6]));
        let out = adaptive_threshold(&img, 3, 10);
        assert!(out.pixels().all(|p| p.0[0] == 255));
        let strict = adaptive_threshold(&img, 3, 0);
        assert_eq!(strict.get_pixel(10, 10).0[0], 0);
    }

    #[test]
    fn adaptive_threshold_keeps_flat_regions_white() {
        let out = adaptive_threshold(&GrayImage::from_pixel(30, 30, Luma([90])), 7, 10);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn adaptive_threshold_marks_dark_side_of_edge() {
        let out = adaptive_threshold(&bimodal(), 7, 10);
        assert_eq!(out.get_pixel(18, 20).0[0], 0);
        assert_eq!(out.get_pixel(2, 20).0[0], 255);
    }

    #[test]
    fn shadow_compensation_flattens_gradient() {
        let img = GrayImage::from_fn(60, 60, |x, _| Luma([(100 + x * 2) as u8]));
        let out = compensate_shadows(&img, 9);
        let left = out.get_pixel(30, 30).0[0] as i32;
        let right = out.get_pixel(50, 30).0[0] as i32;
        assert!((left - right).abs() < 15, "left {left} right {right}");
        assert!(left > 200);
    }

    #[test]
    fn blend_mixes_by_weight() {
        let dark = GrayImage::from_pixel(4, 4, Luma([0]));
        let bright = GrayImage::from_pixel(4, 4, Luma([200]));
        assert_eq!(blend(&dark, &bright, 0.3).get_pixel(1, 1).0[0], 60);
        assert_eq!(blend(&dark, &bright, 0.0).get_pixel(1, 1).0[0], 0);
    }
}
