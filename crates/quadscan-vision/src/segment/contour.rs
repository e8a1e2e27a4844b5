// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour post-processing shared by every strategy: external contour
// extraction, Ramer–Douglas–Peucker approximation, four-point fitting with a
// hull + minimum-area-rectangle fallback, and the shape metrics attached to
// each candidate.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull, min_area_rect};
use imageproc::point::Point;
use quadscan_core::{Candidate, Point2, Rect, StrategyKind};

use crate::geometry::{aspect_ratio, aspect_within, order_points};

/// Contour as traced on the pixel grid.
pub type PixelContour = Vec<Point<i32>>;

/// Outer borders of the top-level connected components of `mask`.
pub fn external_contours(mask: &GrayImage) -> Vec<PixelContour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
        .map(|c| c.points)
        .filter(|points| points.len() >= 3)
        .collect()
}

/// Contours paired with their area, largest first.
pub fn largest_first(contours: Vec<PixelContour>) -> Vec<(f64, PixelContour)> {
    let mut sized: Vec<(f64, PixelContour)> = contours
        .into_iter()
        .map(|c| (contour_area(&c), c))
        .collect();
    sized.sort_by(|a, b| b.0.total_cmp(&a.0));
    sized
}

/// Shoelace area of a traced contour.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice: i64 = 0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += points[i].x as i64 * points[j].y as i64 - points[j].x as i64 * points[i].y as i64;
    }
    twice.abs() as f64 / 2.0
}

/// Closed RDP approximation with tolerance `fraction` of the perimeter.
pub fn approximate(contour: &[Point<i32>], fraction: f64) -> PixelContour {
    let epsilon = fraction * arc_length(contour, true);
    approximate_polygon_dp(contour, epsilon, true)
}

pub fn to_point2(p: &Point<i32>) -> Point2 {
    Point2::new(p.x as f64, p.y as f64)
}

fn to_quad(points: &[Point<i32>]) -> Option<[Point2; 4]> {
    match points {
        [a, b, c, d] => Some([to_point2(a), to_point2(b), to_point2(c), to_point2(d)]),
        _ => None,
    }
}

/// Share of the hull area a four-vertex approximation must keep. Below it
/// the approximation has cut a corner off and the minimum-area rectangle
/// describes the shape better.
const MIN_HULL_COVERAGE: f64 = 0.95;

/// The RDP approximation of `hull` if it has four vertices and covers most of
/// the hull.
fn hull_approx_quad(hull: &[Point<i32>], fraction: f64) -> Option<[Point2; 4]> {
    let approx = approximate(hull, fraction);
    if contour_area(&approx) < MIN_HULL_COVERAGE * contour_area(hull) {
        return None;
    }
    to_quad(&approx)
}

/// Four-point fit of the convex hull: the RDP approximation of the hull when
/// it has exactly four vertices and keeps the hull's area, otherwise the
/// minimum-area rectangle.
pub fn hull_quad(contour: &[Point<i32>], fraction: f64) -> Option<[Point2; 4]> {
    let hull = convex_hull(contour);
    if hull.len() < 3 {
        return None;
    }
    hull_approx_quad(&hull, fraction).or_else(|| to_quad(&min_area_rect(&hull[..])))
}

/// Four-point fit used by the edge-based strategies: the contour's own
/// approximation when it already has four vertices, else the hull fit.
pub fn fit_quad(contour: &[Point<i32>], approx: &[Point<i32>], fraction: f64) -> Option<[Point2; 4]> {
    to_quad(approx).or_else(|| hull_quad(contour, fraction))
}

/// Four-point fit that must also match the expected aspect ratio when one is
/// known. Tries the hull approximation first, then the minimum-area rectangle.
pub fn fit_quad_with_aspect(
    contour: &[Point<i32>],
    fraction: f64,
    expected_aspect: Option<f64>,
    tolerance: f64,
) -> Option<[Point2; 4]> {
    let matches = |quad: &[Point2; 4]| match expected_aspect.filter(|e| *e > 0.0) {
        Some(expected) => aspect_ratio(&order_points(quad))
            .map(|measured| aspect_within(measured, expected, tolerance))
            .unwrap_or(false),
        None => true,
    };

    let hull = convex_hull(contour);
    if hull.len() < 3 {
        return None;
    }
    if let Some(quad) = hull_approx_quad(&hull, fraction).filter(|q| matches(q)) {
        return Some(quad);
    }
    to_quad(&min_area_rect(&hull[..])).filter(|q| matches(q))
}

/// Build a candidate with its shape metrics.
///
/// `approx` is the polygon approximation of `contour`; when it has fewer than
/// 3 or more than 8 vertices the four-point fit is reported instead.
pub fn describe(
    contour: &[Point<i32>],
    approx: &[Point<i32>],
    quad: Option<[Point2; 4]>,
    strategy: StrategyKind,
) -> Candidate {
    let area = contour_area(contour);
    let perimeter = arc_length(contour, true);
    let hull_area = contour_area(&convex_hull(contour));
    let points: Vec<Point2> = contour.iter().map(to_point2).collect();
    let bounding_box = Rect::bounding(&points).unwrap_or_default();

    let solidity = if hull_area > 0.0 {
        (area / hull_area).min(1.0)
    } else {
        0.0
    };
    let rectangularity = if bounding_box.area() > 0.0 {
        (area / bounding_box.area()).min(1.0)
    } else {
        0.0
    };

    let vertices = if (3..=8).contains(&approx.len()) {
        approx.iter().map(to_point2).collect()
    } else {
        quad.map(|q| q.to_vec()).unwrap_or_default()
    };

    Candidate {
        vertices,
        corner_count: approx.len(),
        quad,
        area,
        perimeter,
        bounding_box,
        solidity,
        rectangularity,
        strategy,
    }
}

/// Shared tail of the edge-based strategies: contour the edge map, keep the
/// `limit` largest contours whose area fraction lies in `[min_fraction,
/// max_fraction]`, and fit four points to each.
pub fn candidates_from_mask(
    mask: &GrayImage,
    strategy: StrategyKind,
    limit: usize,
    min_fraction: f64,
    max_fraction: f64,
    approx_fraction: f64,
) -> Vec<Candidate> {
    let frame_area = mask.width() as f64 * mask.height() as f64;
    if frame_area <= 0.0 {
        return Vec::new();
    }

    largest_first(external_contours(mask))
        .into_iter()
        .filter(|(area, _)| {
            let fraction = area / frame_area;
            fraction >= min_fraction && fraction <= max_fraction
        })
        .take(limit)
        .map(|(_, contour)| {
            let approx = approximate(&contour, approx_fraction);
            let quad = fit_quad(&contour, &approx, approx_fraction);
            describe(&contour, &approx, quad, strategy)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn filled_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn rectangle_has_one_external_contour() {
        let mask = filled_rect(100, 80, 20, 10, 80, 70);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        let area = contour_area(&contours[0]);
        // Boundary pixel centres span 59 x 59.
        assert!((area - 59.0 * 59.0).abs() < 1.0, "area {area}");
    }

    #[test]
    fn nested_components_are_ignored() {
        let mut mask = filled_rect(100, 100, 10, 10, 90, 90);
        for y in 30..70 {
            for x in 30..70 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 40..60 {
            for x in 40..60 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        assert_eq!(external_contours(&mask).len(), 1);
    }

    #[test]
    fn rectangle_approximates_to_four_points() {
        let mask = filled_rect(100, 80, 20, 10, 80, 70);
        let contour = &external_contours(&mask)[0];
        let approx = approximate(contour, 0.02);
        assert_eq!(approx.len(), 4);

        let candidate = describe(contour, &approx, fit_quad(contour, &approx, 0.02), StrategyKind::FastThreshold);
        assert_eq!(candidate.corner_count, 4);
        assert!(candidate.solidity > 0.99);
        assert!(candidate.rectangularity > 0.99);
        assert!(candidate.quad.is_some());
    }

    #[test]
    fn notched_shape_falls_back_to_hull_rectangle() {
        // An L-shaped notch removed from one corner.
        let mut mask = filled_rect(120, 120, 10, 10, 110, 110);
        for y in 10..40 {
            for x in 80..110 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        let contour = &external_contours(&mask)[0];
        let approx = approximate(contour, 0.02);
        assert!(approx.len() > 4);
        let quad = fit_quad(contour, &approx, 0.02).expect("hull fallback");
        let area = crate::geometry::polygon_area(&quad);
        assert!(area > 90.0 * 90.0, "area {area}");
        // The rectangle spans the notch instead of cutting it off.
        assert!(quad.iter().any(|p| p.x >= 108.0 && p.y <= 11.0), "{quad:?}");
    }

    #[test]
    fn coarse_hull_approximation_falls_back_to_rectangle() {
        let hull = vec![
            Point::new(0, 0),
            Point::new(60, 0),
            Point::new(100, 40),
            Point::new(100, 100),
            Point::new(0, 100),
        ];
        assert!(hull_approx_quad(&hull, 0.5).is_none());
        let quad = hull_quad(&hull, 0.5).expect("rectangle fallback");
        assert!(crate::geometry::polygon_area(&quad) >= contour_area(&hull));
    }

    #[test]
    fn aspect_filter_rejects_wrong_shape() {
        let mask = filled_rect(200, 200, 20, 20, 180, 180);
        let contour = &external_contours(&mask)[0];
        assert!(fit_quad_with_aspect(contour, 0.02, Some(1.0), 0.15).is_some());
        assert!(fit_quad_with_aspect(contour, 0.02, Some(2.35), 0.15).is_none());
        assert!(fit_quad_with_aspect(contour, 0.02, None, 0.15).is_some());
    }

    #[test]
    fn mask_candidates_respect_area_window() {
        let mask = filled_rect(100, 100, 5, 5, 15, 15);
        assert!(candidates_from_mask(&mask, StrategyKind::AdaptiveMorphology, 3, 0.08, 0.8, 0.02).is_empty());
        let mask = filled_rect(100, 100, 10, 10, 80, 90);
        assert_eq!(
            candidates_from_mask(&mask, StrategyKind::AdaptiveMorphology, 3, 0.08, 0.8, 0.02).len(),
            1
        );
    }
}
