// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification: map the four document corners onto an upright
// rectangle and warp the full-resolution frame into it.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use quadscan_core::config::RectifyConfig;
use quadscan_core::error::{Result, ScanError};
use quadscan_core::{DocumentCorners, Point2, RectifyMode};
use tracing::{debug, info, instrument, warn};

use crate::geometry::side_lengths;
use crate::image::ImageProcessor;

/// Warps a perspective-distorted document to an axis-aligned image.
///
/// Two size policies are available. `Enhanced` lets the output grow up to
/// twice the source dimension and samples bicubically; `Simple` caps the
/// output at the source dimension and samples bilinearly. Both enforce a
/// minimum side and fill pixels outside the source with white.
#[derive(Debug, Clone)]
pub struct PerspectiveRectifier {
    config: RectifyConfig,
}

impl PerspectiveRectifier {
    pub fn new(config: RectifyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RectifyConfig {
        &self.config
    }

    pub fn set_orientation_fix(&mut self, enabled: bool) {
        self.config.orientation_fix = enabled;
    }

    /// Output size for `corners` taken from a `src_w` x `src_h` frame.
    ///
    /// Width and height are the longer of each pair of opposite sides. When
    /// an expected aspect ratio is known and the measured one deviates by
    /// more than the configured tolerance, the longer dimension is shrunk to
    /// match. The floor is applied before the mode's ceiling.
    pub fn output_size(
        &self,
        corners: &DocumentCorners,
        src_w: u32,
        src_h: u32,
        expected_aspect: Option<f64>,
    ) -> (u32, u32) {
        let [top, right, bottom, left] = side_lengths(corners);
        let mut width = top.max(bottom);
        let mut height = left.max(right);

        if let Some(expected) = expected_aspect.filter(|e| *e > 0.0) {
            if width > 0.0 && height > 0.0 {
                let current = width / height;
                if (current - expected).abs() / expected > self.config.aspect_adjust_tolerance {
                    if current > expected {
                        width = height * expected;
                    } else {
                        height = width / expected;
                    }
                    debug!(current, expected, width, height, "Output aspect adjusted");
                }
            }
        }

        let floor = self.config.min_output_side as f64;
        let (cap_w, cap_h) = match self.config.mode {
            RectifyMode::Enhanced => (2.0 * src_w as f64, 2.0 * src_h as f64),
            RectifyMode::Simple => (src_w as f64, src_h as f64),
        };
        let width = width.max(floor).min(cap_w).round() as u32;
        let height = height.max(floor).min(cap_h).round() as u32;
        (width, height)
    }

    /// Projection taking the ordered corners to the corners of a
    /// `width` x `height` image.
    pub fn projection(corners: &DocumentCorners, width: u32, height: u32) -> Result<Projection> {
        let (w, h) = ((width.max(1) - 1) as f32, (height.max(1) - 1) as f32);
        let src = corners.0.map(|p| (p.x as f32, p.y as f32));
        let dst = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        Projection::from_control_points(src, dst)
            .ok_or_else(|| ScanError::TransformFailure("degenerate corner configuration".into()))
    }

    /// Rectify the document bounded by `corners` in `frame`.
    #[instrument(skip(self, frame, corners), fields(src_w = frame.width(), src_h = frame.height()))]
    pub fn rectify(
        &self,
        frame: &RgbImage,
        corners: &DocumentCorners,
        expected_aspect: Option<f64>,
    ) -> Result<RgbImage> {
        let (src_w, src_h) = frame.dimensions();
        let (width, height) = self.output_size(corners, src_w, src_h, expected_aspect);
        let floor = self.config.min_output_side;
        if width < floor || height < floor {
            warn!(width, height, floor, "Rectified output below minimum size");
            return Err(ScanError::TransformFailure(format!(
                "output {width}x{height} smaller than {floor}x{floor}"
            )));
        }

        let projection = Self::projection(corners, width, height)?;
        let interpolation = match self.config.mode {
            RectifyMode::Enhanced => Interpolation::Bicubic,
            RectifyMode::Simple => Interpolation::Bilinear,
        };

        let mut output = RgbImage::new(width, height);
        warp_into(frame, &projection, interpolation, Rgb([255u8, 255, 255]), &mut output);

        let output = if self.config.orientation_fix {
            ImageProcessor::from_rgb(output)
                .flip_horizontal()
                .rotate_counter_clockwise()
                .into_rgb()
        } else {
            output
        };

        info!(
            out_w = output.width(),
            out_h = output.height(),
            mode = ?self.config.mode,
            "Document rectified"
        );
        Ok(output)
    }
}

/// Apply `projection` to a point.
pub fn project(projection: &Projection, p: Point2) -> Point2 {
    let (x, y) = *projection * (p.x as f32, p.y as f32);
    Point2::new(x as f64, y as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::order_points;

    fn corners(points: [(f64, f64); 4]) -> DocumentCorners {
        order_points(&points.map(|(x, y)| Point2::new(x, y)))
    }

    fn document_frame() -> RgbImage {
        RgbImage::from_fn(400, 300, |x, y| {
            if (50..350).contains(&x) && (40..240).contains(&y) {
                Rgb([230, 230, 230])
            } else {
                Rgb([20, 20, 20])
            }
        })
    }

    #[test]
    fn axis_aligned_rectangle_keeps_its_size() {
        let rectifier = PerspectiveRectifier::new(RectifyConfig::default());
        let quad = corners([(50.0, 40.0), (350.0, 40.0), (350.0, 240.0), (50.0, 240.0)]);
        let out = rectifier.rectify(&document_frame(), &quad, None).unwrap();
        assert_eq!(out.dimensions(), (300, 200));
        assert_eq!(out.get_pixel(150, 100), &Rgb([230, 230, 230]));
    }

    #[test]
    fn corner_round_trip_is_sub_pixel() {
        let quad = corners([(50.0, 40.0), (350.0, 40.0), (350.0, 240.0), (50.0, 240.0)]);
        let projection = PerspectiveRectifier::projection(&quad, 300, 200).unwrap();
        let targets = [(0.0, 0.0), (299.0, 0.0), (299.0, 199.0), (0.0, 199.0)];
        for (src, (tx, ty)) in quad.0.iter().zip(targets) {
            let mapped = project(&projection, *src);
            assert!((mapped.x - tx).abs() < 1.0 && (mapped.y - ty).abs() < 1.0);
            let back = project(&projection.invert(), mapped);
            assert!(back.distance(src) < 1.0);
        }
    }

    #[test]
    fn small_document_is_raised_to_floor() {
        let rectifier = PerspectiveRectifier::new(RectifyConfig::default());
        let quad = corners([(10.0, 10.0), (130.0, 10.0), (130.0, 90.0), (10.0, 90.0)]);
        assert_eq!(rectifier.output_size(&quad, 400, 300, None), (200, 200));
    }

    #[test]
    fn simple_mode_caps_at_source_and_rejects_undersized() {
        let config = RectifyConfig {
            mode: RectifyMode::Simple,
            ..RectifyConfig::default()
        };
        let rectifier = PerspectiveRectifier::new(config);
        let frame = RgbImage::new(180, 400);
        let quad = corners([(0.0, 0.0), (179.0, 0.0), (179.0, 399.0), (0.0, 399.0)]);
        assert_eq!(rectifier.output_size(&quad, 180, 400, None), (180, 399));
        assert!(matches!(
            rectifier.rectify(&frame, &quad, None),
            Err(ScanError::TransformFailure(_))
        ));
    }

    #[test]
    fn enhanced_mode_may_exceed_source() {
        let rectifier = PerspectiveRectifier::new(RectifyConfig::default());
        let quad = corners([(0.0, 0.0), (179.0, 0.0), (179.0, 399.0), (0.0, 399.0)]);
        assert_eq!(rectifier.output_size(&quad, 180, 400, None), (200, 399));
    }

    #[test]
    fn expected_aspect_shrinks_longer_side() {
        let rectifier = PerspectiveRectifier::new(RectifyConfig::default());
        let quad = corners([(0.0, 0.0), (500.0, 0.0), (500.0, 250.0), (0.0, 250.0)]);
        // Measured 2.0 against an expected 1.588.
        let (w, h) = rectifier.output_size(&quad, 1000, 1000, Some(1.588));
        assert_eq!(h, 250);
        assert_eq!(w, (250.0f64 * 1.588).round() as u32);
        // Within tolerance: untouched.
        assert_eq!(rectifier.output_size(&quad, 1000, 1000, Some(1.9)), (500, 250));
    }

    #[test]
    fn collinear_corners_fail_to_project() {
        let quad = DocumentCorners([
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(200.0, 0.0),
            Point2::new(300.0, 0.0),
        ]);
        assert!(PerspectiveRectifier::projection(&quad, 300, 200).is_err());
    }

    #[test]
    fn orientation_fix_turns_output() {
        let config = RectifyConfig {
            orientation_fix: true,
            ..RectifyConfig::default()
        };
        let rectifier = PerspectiveRectifier::new(config);
        let quad = corners([(50.0, 40.0), (350.0, 40.0), (350.0, 240.0), (50.0, 240.0)]);
        let out = rectifier.rectify(&document_frame(), &quad, None).unwrap();
        assert_eq!(out.dimensions(), (200, 300));
    }
}
