// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lightweight colour segmentation strategy.
//
// The frame centre supplies a foreground colour prior and the four border
// strips a background prior. Pixels close to the foreground colour seed a
// flood fill that grows across locally similar neighbours; pixels close to
// the background colour are then forced back to background.

use image::{GrayImage, Luma, RgbImage};
use imageproc::edges::canny;
use quadscan_core::error::Result;
use quadscan_core::{Candidate, StrategyKind};
use tracing::debug;

use super::contour::candidates_from_mask;
use super::{Deadline, StrategyInput};
use crate::scan::morphology::clean_mask;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const TOP_CONTOURS: usize = 3;
const MIN_AREA_FRACTION: f64 = 0.08;
const MAX_AREA_FRACTION: f64 = 0.85;
const APPROX_FRACTION: f64 = 0.02;

type Color = [f64; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prior {
    Foreground,
    Background,
    Unknown,
}

pub fn color_segmentation(input: &StrategyInput<'_>, deadline: &Deadline) -> Result<Vec<Candidate>> {
    let rgb = &input.working.rgb;
    let (width, height) = rgb.dimensions();
    let margin = width.min(height) / 8;
    if margin == 0 {
        return Ok(Vec::new());
    }

    let foreground = mean_color(rgb, margin, margin, width - margin, height - margin);
    let strips = [
        mean_color(rgb, 0, 0, width, margin),
        mean_color(rgb, 0, height - margin, width, height),
        mean_color(rgb, 0, 0, margin, height),
        mean_color(rgb, width - margin, 0, width, height),
    ];
    let background = strips.iter().fold([0.0; 3], |acc, c| {
        [acc[0] + c[0] / 4.0, acc[1] + c[1] / 4.0, acc[2] + c[2] / 4.0]
    });
    debug!(?foreground, ?background, "Colour priors sampled");

    let threshold = input.cascade.color_threshold;
    let mut priors = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        if y % 32 == 0 {
            deadline.check()?;
        }
        for x in 0..width {
            let c = color_at(rgb, x, y);
            let (fg, bg) = (distance(c, foreground), distance(c, background));
            priors.push(if fg < bg && fg < threshold {
                Prior::Foreground
            } else if bg < threshold {
                Prior::Background
            } else {
                Prior::Unknown
            });
        }
    }

    let mut grown = grow_foreground(rgb, &priors, input.cascade.flood_threshold, deadline)?;
    for (cell, prior) in grown.iter_mut().zip(&priors) {
        if *prior == Prior::Background {
            *cell = false;
        }
    }

    let mask = GrayImage::from_fn(width, height, |x, y| {
        Luma([if grown[(y * width + x) as usize] { 255 } else { 0 }])
    });
    let edges = canny(&clean_mask(&mask, 1, 1), CANNY_LOW, CANNY_HIGH);
    deadline.check()?;

    let candidates = candidates_from_mask(
        &edges,
        StrategyKind::ColorSegmentation,
        TOP_CONTOURS,
        MIN_AREA_FRACTION,
        MAX_AREA_FRACTION,
        APPROX_FRACTION,
    );
    debug!(count = candidates.len(), "Colour candidates");
    Ok(candidates)
}

fn color_at(rgb: &RgbImage, x: u32, y: u32) -> Color {
    let p = rgb.get_pixel(x, y).0;
    [p[0] as f64, p[1] as f64, p[2] as f64]
}

fn distance(a: Color, b: Color) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Mean colour of `[x0, x1) x [y0, y1)`.
fn mean_color(rgb: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> Color {
    let mut sum = [0.0; 3];
    let mut count = 0.0;
    for y in y0..y1 {
        for x in x0..x1 {
            let c = color_at(rgb, x, y);
            for i in 0..3 {
                sum[i] += c[i];
            }
            count += 1.0;
        }
    }
    if count == 0.0 {
        return sum;
    }
    sum.map(|s| s / count)
}

/// 4-connected flood fill from every foreground seed, stepping to neighbours
/// whose colour is within `threshold` of the current pixel.
fn grow_foreground(
    rgb: &RgbImage,
    priors: &[Prior],
    threshold: f64,
    deadline: &Deadline,
) -> Result<Vec<bool>> {
    let (width, height) = rgb.dimensions();
    let mut visited = vec![false; priors.len()];
    let mut stack: Vec<(u32, u32)> = Vec::new();
    let mut steps = 0usize;

    for (index, prior) in priors.iter().enumerate() {
        if *prior != Prior::Foreground || visited[index] {
            continue;
        }
        stack.push((index as u32 % width, index as u32 / width));

        while let Some((x, y)) = stack.pop() {
            let i = (y * width + x) as usize;
            if visited[i] {
                continue;
            }
            visited[i] = true;
            steps += 1;
            if steps % 4096 == 0 {
                deadline.check()?;
            }

            let here = color_at(rgb, x, y);
            let neighbours = [
                (x + 1 < width).then(|| (x + 1, y)),
                x.checked_sub(1).map(|nx| (nx, y)),
                (y + 1 < height).then(|| (x, y + 1)),
                y.checked_sub(1).map(|ny| (x, ny)),
            ];
            for (nx, ny) in neighbours.into_iter().flatten() {
                if !visited[(ny * width + nx) as usize] && distance(here, color_at(rgb, nx, ny)) < threshold {
                    stack.push((nx, ny));
                }
            }
        }
    }
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{document, working};
    use super::*;
    use quadscan_core::config::{CascadeConfig, GeometryConfig};
    use std::time::Duration;

    fn run(rgb: RgbImage) -> Vec<Candidate> {
        let img = working(rgb);
        let cascade = CascadeConfig::default();
        let geometry = GeometryConfig::default();
        let input = StrategyInput {
            working: &img,
            expected_aspect: None,
            cascade: &cascade,
            geometry: &geometry,
        };
        let deadline = Deadline::start(StrategyKind::ColorSegmentation, Duration::from_secs(5));
        color_segmentation(&input, &deadline).unwrap()
    }

    #[test]
    fn document_covering_centre_is_segmented() {
        let found = run(document(200, 160, (18, 18, 182, 142), [215, 200, 170], [60, 90, 60]));
        assert!(!found.is_empty());
        let bbox = found[0].bounding_box;
        assert!((bbox.center().x - 100.0).abs() < 5.0 && (bbox.center().y - 80.0).abs() < 5.0);
        assert!(found[0].quad.is_some());
    }

    #[test]
    fn flat_frame_has_no_foreground() {
        assert!(run(RgbImage::from_pixel(120, 100, image::Rgb([70, 70, 70]))).is_empty());
    }

    #[test]
    fn flood_fill_stops_at_colour_step() {
        let rgb = document(40, 20, (0, 0, 20, 20), [200, 200, 200], [20, 20, 20]);
        let mut priors = vec![Prior::Unknown; 800];
        priors[0] = Prior::Foreground;
        let deadline = Deadline::start(StrategyKind::ColorSegmentation, Duration::from_secs(1));
        let grown = grow_foreground(&rgb, &priors, 30.0, &deadline).unwrap();
        assert_eq!(grown.iter().filter(|g| **g).count(), 400);
    }
}
