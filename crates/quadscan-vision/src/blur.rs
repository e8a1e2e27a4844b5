// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sharpness gate based on the variance of the Laplacian.

use image::GrayImage;
use imageproc::filter::laplacian_filter;
use quadscan_core::BlurMetric;
use quadscan_core::Rect;
use tracing::trace;

/// Stateless blur check: `variance < threshold` means blurry.
#[derive(Debug, Clone, Copy)]
pub struct BlurGate {
    threshold: f64,
}

impl BlurGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Measure the whole image.
    pub fn measure(&self, gray: &GrayImage) -> BlurMetric {
        let variance = laplacian_variance(gray);
        trace!(variance, threshold = self.threshold, "Laplacian variance");
        BlurMetric {
            variance,
            threshold: self.threshold,
        }
    }

    /// Measure only `region`, clamped to the image.
    pub fn measure_region(&self, gray: &GrayImage, region: Rect) -> BlurMetric {
        let (w, h) = gray.dimensions();
        let x0 = region.x.max(0.0).floor() as u32;
        let y0 = region.y.max(0.0).floor() as u32;
        let x1 = (region.right().ceil().max(0.0) as u32).min(w);
        let y1 = (region.bottom().ceil().max(0.0) as u32).min(h);
        if x0 >= x1 || y0 >= y1 {
            return self.measure(gray);
        }
        let crop = image::imageops::crop_imm(gray, x0, y0, x1 - x0, y1 - y0).to_image();
        self.measure(&crop)
    }
}

/// Variance of the 4-neighbour Laplacian response. Zero for images too small
/// to filter.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    if gray.width() < 3 || gray.height() < 3 {
        return 0.0;
    }
    let response = laplacian_filter(gray);
    let n = response.width() as f64 * response.height() as f64;

    let (mut sum, mut sum_sq) = (0.0f64, 0.0f64);
    for pixel in response.pixels() {
        let v = pixel.0[0] as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
