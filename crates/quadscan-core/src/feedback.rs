// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable status messages shown while the camera is scanning.
//
// Every pipeline outcome maps to one short instruction the person holding the
// phone can act on. The text is what the feedback debouncer compares, so two
// outcomes that should not repeat each other must map to different strings.

use crate::error::ScanError;

/// What kind of status the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackKind {
    /// Nothing that looks like a document is in view.
    NoDocument,
    /// Something was found but its outline is not a plausible document.
    ShapeNotRecognized,
    /// The frame is too soft to capture.
    ImageBlurry,
    /// A document is locked and the tracker is counting up.
    HoldSteady,
    /// A rectified document was produced.
    Captured,
    /// Automatic detection gave up; corners must be placed by hand.
    ManualCropNeeded,
    /// Something failed inside the pipeline.
    ProcessingError,
}

impl FeedbackKind {
    /// Plain English text for this status.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoDocument => "No document detected. Place the document inside the frame.",
            Self::ShapeNotRecognized => {
                "Document shape not recognized. Make sure all four corners are visible."
            }
            Self::ImageBlurry => "Image is blurry. Hold the camera steady.",
            Self::HoldSteady => "Document detected. Hold steady...",
            Self::Captured => "Document captured.",
            Self::ManualCropNeeded => {
                "Couldn't find the document edges. Please adjust the corners manually."
            }
            Self::ProcessingError => "Processing error. Please try again.",
        }
    }
}

/// Map a per-frame error to the status shown to the user.
pub fn feedback_for_error(err: &ScanError) -> FeedbackKind {
    match err {
        ScanError::AcquisitionEmpty(_) | ScanError::SegmentationFailure => FeedbackKind::NoDocument,
        ScanError::GeometryRejected(_) => FeedbackKind::ShapeNotRecognized,
        ScanError::BlurRejected { .. } => FeedbackKind::ImageBlurry,
        ScanError::TransformFailure(_)
        | ScanError::InternalFault(_)
        | ScanError::StrategyTimeout { .. }
        | ScanError::ImageError(_)
        | ScanError::InvalidInput(_)
        | ScanError::Config(_)
        | ScanError::SessionClosed
        | ScanError::Io(_)
        | ScanError::Serialization(_) => FeedbackKind::ProcessingError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_maps_to_blurry() {
        let err = ScanError::BlurRejected {
            variance: 3.0,
            threshold: 100.0,
        };
        assert_eq!(feedback_for_error(&err), FeedbackKind::ImageBlurry);
    }

    #[test]
    fn transform_failure_is_processing_error() {
        let err = ScanError::TransformFailure("output too small".into());
        assert_eq!(feedback_for_error(&err), FeedbackKind::ProcessingError);
        assert!(FeedbackKind::ProcessingError.message().contains("Processing error"));
    }

    #[test]
    fn geometry_maps_to_shape_message() {
        let err = ScanError::GeometryRejected("angle out of range".into());
        assert_eq!(feedback_for_error(&err), FeedbackKind::ShapeNotRecognized);
    }

    #[test]
    fn messages_are_distinct() {
        let kinds = [
            FeedbackKind::NoDocument,
            FeedbackKind::ShapeNotRecognized,
            FeedbackKind::ImageBlurry,
            FeedbackKind::HoldSteady,
            FeedbackKind::Captured,
            FeedbackKind::ManualCropNeeded,
            FeedbackKind::ProcessingError,
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().map(|k| k.message()).collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
