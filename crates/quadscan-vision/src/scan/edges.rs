// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multi-scale edge maps: Canny at several blur levels combined by weighted vote.

use image::{GrayImage, Luma};
use imageproc::contrast::stretch_contrast;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::stats::percentile;

use super::morphology::bridge_edges;

/// One Canny pass of the multi-scale detector.
#[derive(Debug, Clone, Copy)]
pub struct EdgeScale {
    /// Gaussian pre-blur; zero skips blurring.
    pub sigma: f32,
    pub low: f32,
    pub high: f32,
    pub weight: f32,
}

/// Fine, medium and coarse passes. The coarse pass favours long document
/// boundaries over texture.
pub const DEFAULT_SCALES: [EdgeScale; 3] = [
    EdgeScale {
        sigma: 0.0,
        low: 50.0,
        high: 100.0,
        weight: 0.3,
    },
    EdgeScale {
        sigma: 1.0,
        low: 30.0,
        high: 80.0,
        weight: 0.4,
    },
    EdgeScale {
        sigma: 2.0,
        low: 20.0,
        high: 60.0,
        weight: 0.3,
    },
];

/// Largest contrast gain applied by `normalize_contrast`.
const MAX_GAIN: u32 = 6;
/// Percentile spreads below this are left alone as a flat image.
const MIN_SPREAD: u8 = 8;

/// Stretch the 1st to 99th percentile range of `gray` towards the full
/// 8-bit range, with the gain capped at `MAX_GAIN`.
///
/// `canny` smooths before thresholding, so a faint outline stays under the
/// fixed per-scale thresholds unless the image is normalised first.
pub fn normalize_contrast(gray: &GrayImage) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    let lower = percentile(gray, 1);
    let upper = percentile(gray, 99);
    if upper.saturating_sub(lower) < MIN_SPREAD {
        return gray.clone();
    }

    let target = (u32::from(upper - lower) * MAX_GAIN).min(255);
    let mid = (u32::from(lower) + u32::from(upper)) / 2;
    let out_lower = mid.saturating_sub(target / 2).min(255 - target);
    stretch_contrast(gray, lower, upper, out_lower as u8, (out_lower + target) as u8)
}

/// Combine edge maps from several scales by weighted vote.
///
/// A pixel is an edge when the summed weight of the scales that fired there
/// reaches `min_vote`. The result is closed with a 3x3 kernel to reconnect
/// broken outlines.
pub fn multi_scale_edges(gray: &GrayImage, scales: &[EdgeScale], min_vote: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut votes = vec![0f32; width as usize * height as usize];

    for scale in scales {
        let edges = if scale.sigma > 0.0 {
            canny(&gaussian_blur_f32(gray, scale.sigma), scale.low, scale.high)
        } else {
            canny(gray, scale.low, scale.high)
        };
        for (vote, pixel) in votes.iter_mut().zip(edges.pixels()) {
            if pixel.0[0] > 0 {
                *vote += scale.weight;
            }
        }
    }

    let combined = GrayImage::from_fn(width, height, |x, y| {
        let vote = votes[y as usize * width as usize + x as usize];
        if vote + f32::EPSILON >= min_vote {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    bridge_edges(&combined, 1)
}
