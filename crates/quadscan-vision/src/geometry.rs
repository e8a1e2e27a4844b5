// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quadrilateral geometry: canonical corner ordering, side and angle
// measurements, and the validator that decides whether four points can be a
// physical document seen in perspective.

use std::cmp::Ordering;

use quadscan_core::config::GeometryConfig;
use quadscan_core::error::{Result, ScanError};
use quadscan_core::{DocumentCorners, Point2};
use tracing::{debug, instrument};

// -- Ordering -----------------------------------------------------------------

/// Order four points as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest `x + y`, bottom-right the largest. Top-right has
/// the smallest `y - x`, bottom-left the largest. Ties are broken on `y` then
/// `x`, so the result depends only on the set of points and not on the input
/// order. When the rule does not pick four distinct points (a square turned
/// by 45 degrees, for instance) the points are sorted clockwise around their
/// centroid starting from the top-left pick.
pub fn order_points(points: &[Point2; 4]) -> DocumentCorners {
    let sum = |p: &Point2| p.x + p.y;
    let diff = |p: &Point2| p.y - p.x;

    let tl = pick(points, sum, Ordering::Less);
    let br = pick(points, sum, Ordering::Greater);
    let tr = pick(points, diff, Ordering::Less);
    let bl = pick(points, diff, Ordering::Greater);

    let indices = [tl, tr, br, bl];
    let distinct = (0..4).all(|i| (i + 1..4).all(|j| indices[i] != indices[j]));
    if distinct {
        return DocumentCorners(indices.map(|i| points[i]));
    }

    order_clockwise(points, points[tl])
}

/// Index of the extreme point by `key`, ties broken on `(y, x)` in the same
/// direction.
fn pick(points: &[Point2; 4], key: impl Fn(&Point2) -> f64, want: Ordering) -> usize {
    let rank = |p: &Point2| (key(p), p.y, p.x);
    let mut best = 0;
    for i in 1..4 {
        let (a, b) = (rank(&points[i]), rank(&points[best]));
        let ord = a
            .0
            .total_cmp(&b.0)
            .then(a.1.total_cmp(&b.1))
            .then(a.2.total_cmp(&b.2));
        if ord == want {
            best = i;
        }
    }
    best
}

/// Sort clockwise (on screen, `y` down) around the centroid, rotated so that
/// `start` comes first.
fn order_clockwise(points: &[Point2; 4], start: Point2) -> DocumentCorners {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;

    let mut sorted = *points;
    sorted.sort_by(|a, b| {
        let ta = (a.y - cy).atan2(a.x - cx);
        let tb = (b.y - cy).atan2(b.x - cx);
        ta.total_cmp(&tb)
            .then(a.y.total_cmp(&b.y))
            .then(a.x.total_cmp(&b.x))
    });

    let first = sorted.iter().position(|p| *p == start).unwrap_or(0);
    sorted.rotate_left(first);
    DocumentCorners(sorted)
}

// -- Measurements ---------------------------------------------------------------

/// Side lengths in order top, right, bottom, left.
pub fn side_lengths(corners: &DocumentCorners) -> [f64; 4] {
    let p = corners.points();
    [
        p[0].distance(&p[1]),
        p[1].distance(&p[2]),
        p[2].distance(&p[3]),
        p[3].distance(&p[0]),
    ]
}

/// Mean width over mean height, using opposite side pairs.
pub fn aspect_ratio(corners: &DocumentCorners) -> Option<f64> {
    let [top, right, bottom, left] = side_lengths(corners);
    let height = (left + right) / 2.0;
    if height <= f64::EPSILON {
        return None;
    }
    Some((top + bottom) / 2.0 / height)
}

/// Whether `measured` lies within `tolerance` (a fraction of `expected`) of
/// the expected ratio.
pub fn aspect_within(measured: f64, expected: f64, tolerance: f64) -> bool {
    expected > 0.0 && (measured - expected).abs() <= tolerance * expected
}

/// Interior angle at every corner, in degrees.
pub fn interior_angles(corners: &DocumentCorners) -> [f64; 4] {
    let p = corners.points();
    let mut angles = [0.0; 4];
    for (i, angle) in angles.iter_mut().enumerate() {
        let prev = p[(i + 3) % 4];
        let cur = p[i];
        let next = p[(i + 1) % 4];
        let (ax, ay) = (prev.x - cur.x, prev.y - cur.y);
        let (bx, by) = (next.x - cur.x, next.y - cur.y);
        let denom = ax.hypot(ay) * bx.hypot(by);
        *angle = if denom <= f64::EPSILON {
            0.0
        } else {
            ((ax * bx + ay * by) / denom).clamp(-1.0, 1.0).acos().to_degrees()
        };
    }
    angles
}

/// Z component of `(b - a) x (c - b)`.
fn turn(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x)
}

/// Shoelace area of an ordered polygon.
pub fn polygon_area(points: &[Point2]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    twice.abs() / 2.0
}

// -- Validation -------------------------------------------------------------------

/// Rejects quadrilaterals that cannot be a flat rectangular document.
#[derive(Debug, Clone)]
pub struct GeometryValidator {
    config: GeometryConfig,
}

impl GeometryValidator {
    pub fn new(config: GeometryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Order `quad` canonically and check it.
    ///
    /// Checks, in order: minimum corner separation, no three consecutive
    /// corners collinear, consistent turn direction (convex and not
    /// self-intersecting), interior angles, opposite side balance, and the
    /// expected aspect ratio when one is given.
    #[instrument(skip(self, quad))]
    pub fn validate(&self, quad: &[Point2; 4], expected_aspect: Option<f64>) -> Result<DocumentCorners> {
        let corners = order_points(quad);
        let p = corners.points();
        let reject = |reason: String| {
            debug!(%reason, "Quadrilateral rejected");
            Err(ScanError::GeometryRejected(reason))
        };

        for i in 0..4 {
            for j in i + 1..4 {
                let d = p[i].distance(&p[j]);
                if d < self.config.min_corner_distance {
                    return reject(format!(
                        "corners {i} and {j} are {d:.1} apart (minimum {:.1})",
                        self.config.min_corner_distance
                    ));
                }
            }
        }

        let turns: [f64; 4] = std::array::from_fn(|i| turn(p[i], p[(i + 1) % 4], p[(i + 2) % 4]));
        if turns.iter().any(|t| t.abs() <= self.config.collinear_epsilon) {
            return reject("three consecutive corners are collinear".into());
        }
        let positive = turns.iter().filter(|t| **t > 0.0).count();
        if positive != 0 && positive != 4 {
            return reject("outline is not convex".into());
        }

        for (i, angle) in interior_angles(&corners).iter().enumerate() {
            if *angle < self.config.min_angle_deg || *angle > self.config.max_angle_deg {
                return reject(format!("corner {i} angle {angle:.1} out of range"));
            }
        }

        let [top, right, bottom, left] = side_lengths(&corners);
        let horizontal = top.min(bottom) / top.max(bottom);
        let vertical = left.min(right) / left.max(right);
        if horizontal < self.config.min_opposite_side_ratio
            || vertical < self.config.min_opposite_side_ratio
        {
            return reject(format!(
                "opposite sides unbalanced ({horizontal:.2}, {vertical:.2})"
            ));
        }

        if let Some(expected) = expected_aspect.filter(|e| *e > 0.0) {
            let measured = aspect_ratio(&corners).unwrap_or(0.0);
            if !aspect_within(measured, expected, self.config.validator_aspect_tolerance) {
                return reject(format!(
                    "aspect ratio {measured:.3} too far from {expected:.3}"
                ));
            }
        }

        Ok(corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(points: [(f64, f64); 4]) -> [Point2; 4] {
        points.map(|(x, y)| Point2::new(x, y))
    }

    fn permutations(points: [Point2; 4]) -> Vec<[Point2; 4]> {
        let mut out = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let idx = [a, b, c, d];
                        let distinct = (0..4).all(|i| (i + 1..4).all(|j| idx[i] != idx[j]));
                        if distinct {
                            out.push(idx.map(|i| points[i]));
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn orders_axis_aligned_rectangle() {
        let corners = order_points(&quad([(100.0, 80.0), (10.0, 10.0), (10.0, 80.0), (100.0, 10.0)]));
        assert_eq!(
            corners.0,
            quad([(10.0, 10.0), (100.0, 10.0), (100.0, 80.0), (10.0, 80.0)])
        );
    }

    #[test]
    fn ordering_is_idempotent_for_every_permutation() {
        let shapes = [
            quad([(12.0, 20.0), (180.0, 35.0), (170.0, 150.0), (5.0, 140.0)]),
            // Square turned by 45 degrees: sums and differences tie.
            quad([(100.0, 20.0), (180.0, 100.0), (100.0, 180.0), (20.0, 100.0)]),
            quad([(50.0, 10.0), (190.0, 60.0), (140.0, 190.0), (10.0, 120.0)]),
        ];
        for shape in shapes {
            let reference = order_points(&shape);
            for perm in permutations(shape) {
                let once = order_points(&perm);
                assert_eq!(once, reference, "order depends on input order");
                assert_eq!(order_points(&once.0), once, "not idempotent");
            }
        }
    }

    #[test]
    fn diamond_falls_back_to_clockwise_order() {
        let corners = order_points(&quad([(20.0, 100.0), (100.0, 180.0), (180.0, 100.0), (100.0, 20.0)]));
        assert_eq!(
            corners.0,
            quad([(100.0, 20.0), (180.0, 100.0), (100.0, 180.0), (20.0, 100.0)])
        );
    }

    #[test]
    fn rectangle_passes_validation() {
        let validator = GeometryValidator::new(GeometryConfig::default());
        let corners = validator
            .validate(&quad([(10.0, 10.0), (170.0, 10.0), (170.0, 110.0), (10.0, 110.0)]), Some(1.6))
            .unwrap();
        assert_eq!(corners.top_left(), Point2::new(10.0, 10.0));
    }

    #[test]
    fn close_corners_are_rejected() {
        let validator = GeometryValidator::new(GeometryConfig::default());
        let err = validator
            .validate(&quad([(10.0, 10.0), (40.0, 10.0), (40.0, 40.0), (10.0, 40.0)]), None)
            .unwrap_err();
        assert!(matches!(err, ScanError::GeometryRejected(_)));
    }

    #[test]
    fn concave_quad_is_rejected() {
        let validator = GeometryValidator::new(GeometryConfig::default());
        // Dart: the fourth point is pushed inside the triangle of the others.
        let result = validator.validate(
            &quad([(0.0, 0.0), (200.0, 0.0), (200.0, 200.0), (120.0, 80.0)]),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn skewed_parallelogram_fails_angle_check() {
        let validator = GeometryValidator::new(GeometryConfig::default());
        let err = validator
            .validate(
                &quad([(0.0, 0.0), (200.0, 0.0), (300.0, 60.0), (100.0, 60.0)]),
                None,
            )
            .unwrap_err();
        assert!(err.to_string().contains("angle"), "{err}");
    }

    #[test]
    fn aspect_mismatch_is_rejected() {
        let validator = GeometryValidator::new(GeometryConfig::default());
        let square = quad([(0.0, 0.0), (150.0, 0.0), (150.0, 150.0), (0.0, 150.0)]);
        assert!(validator.validate(&square, Some(1.0)).is_ok());
        assert!(validator.validate(&square, Some(1.588)).is_err());
    }

    #[test]
    fn rectangle_angles_are_right() {
        let corners = order_points(&quad([(0.0, 0.0), (100.0, 0.0), (100.0, 60.0), (0.0, 60.0)]));
        for angle in interior_angles(&corners) {
            assert!((angle - 90.0).abs() < 1e-9);
        }
        assert!((aspect_ratio(&corners).unwrap() - 100.0 / 60.0).abs() < 1e-9);
        assert!((polygon_area(&corners.0) - 6000.0).abs() < 1e-9);
    }
}
