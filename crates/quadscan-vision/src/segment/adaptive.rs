// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adaptive threshold + morphology strategy, the general-purpose fallback.

use image::{GrayImage, Luma};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use quadscan_core::error::Result;
use quadscan_core::{Candidate, StrategyKind};
use tracing::debug;

use super::contour::candidates_from_mask;
use super::{Deadline, StrategyInput};
use crate::scan::binarize::{adaptive_threshold, blend, compensate_shadows};
use crate::scan::morphology::{bridge_edges, clean_mask};

const SHADOW_RADIUS: u32 = 9;
const SHADOW_WEIGHT: f32 = 0.3;
const BLUR_SIGMA: f32 = 1.0;
const BLOCK_RADIUS: u32 = 7;
const BLOCK_OFFSET: i32 = 10;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const TOP_CONTOURS: usize = 3;
const MIN_AREA_FRACTION: f64 = 0.08;
const MAX_AREA_FRACTION: f64 = 0.80;
const APPROX_FRACTION: f64 = 0.02;

pub fn adaptive_morphology(input: &StrategyInput<'_>, deadline: &Deadline) -> Result<Vec<Candidate>> {
    let gray = &input.working.gray;

    let flattened = blend(gray, &compensate_shadows(gray, SHADOW_RADIUS), SHADOW_WEIGHT);
    let smoothed = gaussian_blur_f32(&flattened, BLUR_SIGMA);
    deadline.check()?;

    let binary = adaptive_threshold(&smoothed, BLOCK_RADIUS, BLOCK_OFFSET);
    let cleaned = clean_mask(&binary, 2, 1);
    deadline.check()?;

    // The dark side of the page border is a closed ribbon in the mask even
    // where Canny breaks the outline, so both are contoured together.
    let edges = canny(&cleaned, CANNY_LOW, CANNY_HIGH);
    let outline = bridge_edges(&dark_or_edge(&cleaned, &edges), 1);
    deadline.check()?;

    let candidates = candidates_from_mask(
        &outline,
        StrategyKind::AdaptiveMorphology,
        TOP_CONTOURS,
        MIN_AREA_FRACTION,
        MAX_AREA_FRACTION,
        APPROX_FRACTION,
    );
    debug!(count = candidates.len(), "Adaptive candidates");
    Ok(candidates)
}

/// Union of the black pixels of `mask` and the set pixels of `edges`.
fn dark_or_edge(mask: &GrayImage, edges: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let dark = mask.get_pixel(x, y).0[0] == 0;
        let edge = edges.get_pixel(x, y).0[0] > 0;
        Luma([if dark || edge { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{document, working};
    use super::*;
    use quadscan_core::config::{CascadeConfig, GeometryConfig};
    use std::time::Duration;

    fn run(rgb: image::RgbImage) -> Vec<Candidate> {
        let img = working(rgb);
        let cascade = CascadeConfig::default();
        let geometry = GeometryConfig::default();
        let input = StrategyInput {
            working: &img,
            expected_aspect: None,
            cascade: &cascade,
            geometry: &geometry,
        };
        let deadline = Deadline::start(StrategyKind::AdaptiveMorphology, Duration::from_secs(5));
        adaptive_morphology(&input, &deadline).unwrap()
    }

    #[test]
    fn flat_frame_has_no_candidates() {
        assert!(run(image::RgbImage::from_pixel(160, 120, image::Rgb([90, 90, 90]))).is_empty());
    }

    #[test]
    fn outlines_document_on_dark_table() {
        let found = run(document(240, 200, (50, 40, 190, 160), [225, 225, 225], [30, 30, 30]));
        assert!(!found.is_empty());
        let centre = found[0].bounding_box.center();
        assert!((centre.x - 120.0).abs() < 10.0 && (centre.y - 100.0).abs() < 10.0);
        assert!(found[0].quad.is_some());
        // The ring around the page, not a fragment of it.
        let area_fraction = found[0].area / (240.0 * 200.0);
        assert!(area_fraction > 0.3, "area fraction {area_fraction}");
    }

    #[test]
    fn dark_pixels_and_edges_are_merged() {
        let mut mask = GrayImage::from_pixel(4, 1, Luma([255]));
        mask.put_pixel(0, 0, Luma([0]));
        let mut edges = GrayImage::new(4, 1);
        edges.put_pixel(2, 0, Luma([255]));
        let merged = dark_or_edge(&mask, &edges);
        let row: Vec<u8> = merged.pixels().map(|p| p.0[0]).collect();
        assert_eq!(row, vec![255, 0, 255, 0]);
    }
}
