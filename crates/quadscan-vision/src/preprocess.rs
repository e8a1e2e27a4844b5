// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Region preprocessing: crop the upright frame to the padded scan region and
// scale it down to the working resolution the segmentation strategies run at.

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use quadscan_core::config::PreprocessConfig;
use quadscan_core::error::{Result, ScanError};
use quadscan_core::{DocumentCorners, Point2, ScanRegion};
use tracing::{debug, instrument};

use crate::image::ImageProcessor;

/// A frame reduced to working resolution, with the mapping back to the frame.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    pub rgb: RgbImage,
    pub gray: GrayImage,
    /// Working size over cropped size. 1.0 when no downscale happened.
    pub ratio: f64,
    /// Top-left of the crop inside the upright frame.
    pub offset: (u32, u32),
}

impl WorkingImage {
    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn area(&self) -> f64 {
        self.rgb.width() as f64 * self.rgb.height() as f64
    }

    /// Map a working-resolution point back to upright frame coordinates.
    pub fn to_frame(&self, p: Point2) -> Point2 {
        Point2::new(
            p.x / self.ratio + self.offset.0 as f64,
            p.y / self.ratio + self.offset.1 as f64,
        )
    }

    /// Map a frame point into working resolution.
    pub fn from_frame(&self, p: Point2) -> Point2 {
        Point2::new(
            (p.x - self.offset.0 as f64) * self.ratio,
            (p.y - self.offset.1 as f64) * self.ratio,
        )
    }

    pub fn corners_to_frame(&self, corners: &DocumentCorners) -> DocumentCorners {
        corners.map(|p| self.to_frame(p))
    }
}

/// Crops to the scan region and downsamples for detection.
#[derive(Debug, Clone)]
pub struct RegionPreprocessor {
    config: PreprocessConfig,
}

impl RegionPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// The padded crop rectangle `(x, y, width, height)` for `region`, or
    /// `None` when the full frame should be used.
    pub fn crop_rect(
        &self,
        frame_width: u32,
        frame_height: u32,
        region: Option<&ScanRegion>,
    ) -> Option<(u32, u32, u32, u32)> {
        let region = region?;
        let min_side = self.config.min_region_side as f64;
        if !region.is_active(min_side) {
            return None;
        }

        let pad = self.config.region_padding as f64;
        let x0 = (region.rect.x - pad).max(0.0).floor();
        let y0 = (region.rect.y - pad).max(0.0).floor();
        let x1 = (region.rect.right() + pad).min(frame_width as f64).ceil();
        let y1 = (region.rect.bottom() + pad).min(frame_height as f64).ceil();

        let (w, h) = (x1 - x0, y1 - y0);
        if w < min_side || h < min_side {
            return None;
        }
        Some((x0 as u32, y0 as u32, w as u32, h as u32))
    }

    /// Produce the working image for one upright frame.
    #[instrument(skip(self, upright, region), fields(width = upright.width(), height = upright.height()))]
    pub fn prepare(&self, upright: &RgbImage, region: Option<&ScanRegion>) -> Result<WorkingImage> {
        let (frame_w, frame_h) = upright.dimensions();
        if frame_w == 0 || frame_h == 0 {
            return Err(ScanError::AcquisitionEmpty("empty upright frame".into()));
        }

        let (processor, offset) = match self.crop_rect(frame_w, frame_h, region) {
            Some((x, y, w, h)) => (
                ImageProcessor::from_rgb(upright.clone()).crop(x, y, w, h),
                (x, y),
            ),
            None => (ImageProcessor::from_rgb(upright.clone()), (0, 0)),
        };

        let (crop_w, crop_h) = (processor.width(), processor.height());
        let short_side = crop_w.min(crop_h);
        let working = self.config.working_size;

        // Crops under the floor stay at full resolution even when the working
        // size is smaller still.
        let ratio = if short_side > working && short_side >= self.config.full_resolution_floor {
            working as f64 / short_side as f64
        } else {
            1.0
        };

        let processor = if ratio < 1.0 {
            let new_w = ((crop_w as f64 * ratio).round() as u32).max(1);
            let new_h = ((crop_h as f64 * ratio).round() as u32).max(1);
            processor.resize_exact(new_w, new_h, FilterType::Triangle)
        } else {
            processor
        };

        debug!(
            crop_w,
            crop_h,
            ratio,
            offset_x = offset.0,
            offset_y = offset.1,
            "Working image prepared"
        );

        let gray = processor.grayscale();
        Ok(WorkingImage {
            rgb: processor.into_rgb(),
            gray,
            ratio,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadscan_core::Rect;

    fn region(x: f64, y: f64, w: f64, h: f64) -> ScanRegion {
        ScanRegion {
            rect: Rect::new(x, y, w, h),
            aspect_ratio: w / h,
            label: "test".into(),
        }
    }

    fn preprocessor() -> RegionPreprocessor {
        RegionPreprocessor::new(PreprocessConfig::default())
    }

    #[test]
    fn full_frame_is_downscaled_to_working_size() {
        let frame = RgbImage::new(800, 600);
        let working = preprocessor().prepare(&frame, None).unwrap();
        assert_eq!(working.height(), 200);
        assert_eq!(working.width(), 267);
        assert!((working.ratio - 200.0 / 600.0).abs() < 1e-9);
        assert_eq!(working.offset, (0, 0));
    }

    #[test]
    fn small_frame_keeps_full_resolution() {
        let frame = RgbImage::new(180, 140);
        let working = preprocessor().prepare(&frame, None).unwrap();
        assert_eq!((working.width(), working.height()), (180, 140));
        assert_eq!(working.ratio, 1.0);
    }

    #[test]
    fn crops_under_the_floor_are_not_downscaled() {
        let config = PreprocessConfig {
            working_size: 100,
            ..PreprocessConfig::default()
        };
        let preprocessor = RegionPreprocessor::new(config);

        let small = preprocessor.prepare(&RgbImage::new(140, 120), None).unwrap();
        assert_eq!(small.ratio, 1.0);
        assert_eq!((small.width(), small.height()), (140, 120));

        let large = preprocessor.prepare(&RgbImage::new(400, 300), None).unwrap();
        assert!((large.ratio - 100.0 / 300.0).abs() < 1e-9);
        assert_eq!(large.height(), 100);
    }

    #[test]
    fn region_is_padded_and_clamped() {
        let rect = preprocessor().crop_rect(1000, 800, Some(&region(50.0, 300.0, 400.0, 250.0)));
        assert_eq!(rect, Some((0, 200, 550, 450)));
    }

    #[test]
    fn inactive_region_falls_back_to_full_frame() {
        let rect = preprocessor().crop_rect(1000, 800, Some(&region(10.0, 10.0, 150.0, 300.0)));
        assert_eq!(rect, None);
    }

    #[test]
    fn working_points_map_back_to_frame() {
        let frame = RgbImage::new(1200, 1000);
        let working = preprocessor()
            .prepare(&frame, Some(&region(300.0, 300.0, 400.0, 300.0)))
            .unwrap();
        assert_eq!(working.offset, (200, 200));
        let p = Point2::new(40.0, 25.0);
        let back = working.from_frame(working.to_frame(p));
        assert!((back.x - p.x).abs() < 1e-9 && (back.y - p.y).abs() < 1e-9);
        let full = working.to_frame(Point2::new(0.0, 0.0));
        assert_eq!(full, Point2::new(200.0, 200.0));
    }

    #[test]
    fn empty_frame_is_acquisition_error() {
        let frame = RgbImage::new(0, 0);
        assert!(matches!(
            preprocessor().prepare(&frame, None),
            Err(ScanError::AcquisitionEmpty(_))
        ));
    }
}
