// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quadscan-vision: image-side stages of the document scanner.
//
// Region preprocessing, the segmentation cascade and its strategies, contour
// scoring, quadrilateral validation, the blur gate, and perspective
// rectification. Nothing here holds state across frames.

pub mod blur;
pub mod geometry;
pub mod image;
pub mod preprocess;
pub mod rectify;
pub mod scan;
pub mod score;
pub mod segment;

pub use blur::BlurGate;
pub use geometry::{GeometryValidator, order_points};
pub use crate::image::ImageProcessor;
pub use preprocess::{RegionPreprocessor, WorkingImage};
pub use rectify::PerspectiveRectifier;
pub use score::{ContourScorer, ScoredCandidate};
pub use segment::{CascadeHit, CascadeReport, SegmentationCascade, StrategyOutcome};
