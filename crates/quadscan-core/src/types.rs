// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Quadscan document detector.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, ScanError};

/// Unique identifier for a scanning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Geometry primitives ------------------------------------------------------

/// A point in image space. `x` grows to the right, `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Smallest rectangle enclosing every point. Returns `None` for an empty set.
    pub fn bounding(points: &[Point2]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// Scale every coordinate independently along each axis.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

// -- Frames -------------------------------------------------------------------

/// Device rotation attached to a camera frame, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse a rotation given in degrees. Only right angles are accepted;
    /// negative values and multiples of 360 are normalised.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

/// One raw camera frame: packed 8-bit RGB, row-major, no padding.
///
/// A frame is owned by the pipeline run that receives it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub rotation: Rotation,
    /// Capture time relative to an arbitrary session epoch.
    pub timestamp: Duration,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        rotation: Rotation,
        timestamp: Duration,
    ) -> Self {
        Self {
            width,
            height,
            pixels,
            rotation,
            timestamp,
        }
    }

    /// Check that the buffer is non-empty and matches the declared size.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::AcquisitionEmpty(format!(
                "frame has zero dimension ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.pixels.len() != expected {
            return Err(ScanError::AcquisitionEmpty(format!(
                "pixel buffer holds {} bytes, expected {}",
                self.pixels.len(),
                expected
            )));
        }
        Ok(())
    }
}

// -- Documents ----------------------------------------------------------------

/// Known document formats with their expected width / height ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Indian national identity card (ID-1 format).
    Aadhaar,
    /// Indian tax identity card (ID-1 format).
    Pan,
    /// Passport data page.
    Passport,
    /// ISO A4 sheet in portrait.
    A4,
    /// Business / visiting card.
    VisitingCard,
    /// US dollar banknote.
    UsDollar,
    /// Caller supplied ratio.
    Custom(f64),
}

impl DocumentKind {
    /// Expected width / height.
    pub fn aspect_ratio(&self) -> f64 {
        match self {
            Self::Aadhaar | Self::Pan => 1.588,
            Self::Passport => 1.42,
            Self::A4 => 0.707,
            Self::VisitingCard => 1.74,
            Self::UsDollar => 2.35,
            Self::Custom(ratio) => *ratio,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Aadhaar => "Aadhaar",
            Self::Pan => "PAN",
            Self::Passport => "Passport",
            Self::A4 => "A4",
            Self::VisitingCard => "Visiting card",
            Self::UsDollar => "USD",
            Self::Custom(_) => "Document",
        }
    }

    /// Look a preset up by its lowercase name (`"a4"`, `"visiting_card"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace(|c: char| c == '-' || c == ' ', "_").as_str() {
            "aadhaar" => Some(Self::Aadhaar),
            "pan" => Some(Self::Pan),
            "passport" => Some(Self::Passport),
            "a4" => Some(Self::A4),
            "visiting_card" | "visitcard" | "business_card" => Some(Self::VisitingCard),
            "usd" | "us_dollar" => Some(Self::UsDollar),
            _ => None,
        }
    }
}

/// Region of the upright frame the detector concentrates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRegion {
    pub rect: Rect,
    /// Expected width / height of the document inside the region.
    pub aspect_ratio: f64,
    pub label: String,
}

impl ScanRegion {
    /// A region is only used for cropping when both sides reach `min_side`.
    pub fn is_active(&self, min_side: f64) -> bool {
        self.rect.width >= min_side && self.rect.height >= min_side
    }
}

/// A polygon produced by a segmentation strategy, with derived shape metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Polygon approximation of the contour (3 to 8 vertices).
    pub vertices: Vec<Point2>,
    /// Vertex count of the raw approximation, before any clamping to 3..=8.
    pub corner_count: usize,
    /// Four-point fit of the contour, when one could be derived.
    pub quad: Option<[Point2; 4]>,
    pub area: f64,
    pub perimeter: f64,
    pub bounding_box: Rect,
    /// Area over convex-hull area.
    pub solidity: f64,
    /// Area over bounding-box area.
    pub rectangularity: f64,
    pub strategy: StrategyKind,
}

/// Four document corners in canonical order: top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentCorners(pub [Point2; 4]);

impl DocumentCorners {
    pub fn top_left(&self) -> Point2 {
        self.0[0]
    }

    pub fn top_right(&self) -> Point2 {
        self.0[1]
    }

    pub fn bottom_right(&self) -> Point2 {
        self.0[2]
    }

    pub fn bottom_left(&self) -> Point2 {
        self.0[3]
    }

    pub fn points(&self) -> &[Point2; 4] {
        &self.0
    }

    /// Apply `f` to every corner, keeping the order.
    pub fn map(&self, f: impl Fn(Point2) -> Point2) -> Self {
        Self(self.0.map(f))
    }

    /// Flatten to `[x0, y0, x1, y1, ...]`.
    pub fn to_flat(&self) -> [f64; 8] {
        let mut out = [0.0; 8];
        for (i, p) in self.0.iter().enumerate() {
            out[2 * i] = p.x;
            out[2 * i + 1] = p.y;
        }
        out
    }

    pub fn bounding_rect(&self) -> Rect {
        Rect::bounding(&self.0).unwrap_or_default()
    }
}

// -- Detection state ----------------------------------------------------------

/// Mode of the temporal stability state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DetectionMode {
    #[default]
    Scanning,
    StableAccepted,
    ManualCropPending,
}

/// Counters carried across frames for one scanning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectionState {
    pub consecutive_hits: u32,
    pub consecutive_misses: u32,
    pub mode: DetectionMode,
}

/// Sharpness measurement of one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurMetric {
    /// Variance of the Laplacian response.
    pub variance: f64,
    pub threshold: f64,
}

impl BlurMetric {
    pub fn is_blurry(&self) -> bool {
        self.variance < self.threshold
    }

    /// `BlurRejected` when the image is blurry.
    pub fn check(&self) -> Result<()> {
        if self.is_blurry() {
            return Err(ScanError::BlurRejected {
                variance: self.variance,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// Segmentation strategies, in default cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FastThreshold,
    AdaptiveMorphology,
    ForegroundCut,
    ColorSegmentation,
    MultiScaleEdges,
    /// Corners supplied by the user rather than found by a strategy.
    Manual,
}

impl StrategyKind {
    /// The automatic strategies in default priority order.
    pub const CASCADE: [StrategyKind; 5] = [
        StrategyKind::FastThreshold,
        StrategyKind::AdaptiveMorphology,
        StrategyKind::ForegroundCut,
        StrategyKind::ColorSegmentation,
        StrategyKind::MultiScaleEdges,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::FastThreshold => "fast-threshold",
            Self::AdaptiveMorphology => "adaptive-morphology",
            Self::ForegroundCut => "foreground-cut",
            Self::ColorSegmentation => "color-segmentation",
            Self::MultiScaleEdges => "multi-scale-edges",
            Self::Manual => "manual",
        }
    }
}

/// Output size policy of the perspective rectifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectifyMode {
    /// Output may grow up to twice the source size; bicubic sampling.
    #[default]
    Enhanced,
    /// Output is capped at the source size; bilinear sampling.
    Simple,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_normalises_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn frame_validation_rejects_short_buffer() {
        let frame = Frame::new(4, 4, vec![0; 10], Rotation::Deg0, Duration::ZERO);
        assert!(matches!(frame.validate(), Err(ScanError::AcquisitionEmpty(_))));

        let frame = Frame::new(0, 4, Vec::new(), Rotation::Deg0, Duration::ZERO);
        assert!(frame.validate().is_err());

        let frame = Frame::new(4, 4, vec![0; 48], Rotation::Deg90, Duration::ZERO);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn document_presets_have_expected_ratios() {
        assert!((DocumentKind::A4.aspect_ratio() - 0.707).abs() < 1e-9);
        assert_eq!(DocumentKind::from_name("Visiting-Card"), Some(DocumentKind::VisitingCard));
        assert_eq!(DocumentKind::from_name("tax-form"), None);
    }

    #[test]
    fn corners_flatten_in_order() {
        let corners = DocumentCorners([
            Point2::new(1.0, 2.0),
            Point2::new(3.0, 4.0),
            Point2::new(5.0, 6.0),
            Point2::new(7.0, 8.0),
        ]);
        assert_eq!(corners.to_flat(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(corners.bounding_rect(), Rect::new(1.0, 2.0, 6.0, 6.0));
    }

    #[test]
    fn blur_metric_compares_strictly() {
        let metric = BlurMetric {
            variance: 100.0,
            threshold: 100.0,
        };
        assert!(!metric.is_blurry());
        assert!(metric.check().is_ok());

        let blurry = BlurMetric {
            variance: 99.5,
            ..metric
        };
        assert!(matches!(
            blurry.check(),
            Err(ScanError::BlurRejected { variance, .. }) if variance == 99.5
        ));
    }
}
