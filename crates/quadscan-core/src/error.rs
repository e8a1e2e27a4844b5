// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Quadscan.

use thiserror::Error;

use crate::types::StrategyKind;

/// Top-level error type for all Quadscan operations.
///
/// None of the pipeline variants end a scanning session. They are reported
/// per frame, feed the stability counters, and scanning continues.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Pipeline outcomes --
    #[error("no usable frame: {0}")]
    AcquisitionEmpty(String),

    #[error("no document candidate found")]
    SegmentationFailure,

    #[error("candidate rejected by geometry check: {0}")]
    GeometryRejected(String),

    #[error("frame too blurry (variance {variance:.1} below {threshold:.1})")]
    BlurRejected { variance: f64, threshold: f64 },

    #[error("perspective transform failed: {0}")]
    TransformFailure(String),

    #[error("internal fault: {0}")]
    InternalFault(String),

    #[error("strategy {strategy:?} exceeded its {budget_ms} ms budget")]
    StrategyTimeout { strategy: StrategyKind, budget_ms: u64 },

    // -- Caller input --
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Image / IO --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("scan session is closed")]
    SessionClosed,

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a per-frame outcome, used for counters and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Acquisition,
    Segmentation,
    Geometry,
    Blur,
    Transform,
    Fault,
    Caller,
}

impl ScanError {
    /// Classify this error for counters and structured logs.
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            ScanError::AcquisitionEmpty(_) => OutcomeKind::Acquisition,
            ScanError::SegmentationFailure => OutcomeKind::Segmentation,
            ScanError::GeometryRejected(_) => OutcomeKind::Geometry,
            ScanError::BlurRejected { .. } => OutcomeKind::Blur,
            ScanError::TransformFailure(_) => OutcomeKind::Transform,
            ScanError::InternalFault(_)
            | ScanError::StrategyTimeout { .. }
            | ScanError::ImageError(_) => OutcomeKind::Fault,
            ScanError::InvalidInput(_)
            | ScanError::Config(_)
            | ScanError::SessionClosed
            | ScanError::Io(_)
            | ScanError::Serialization(_) => OutcomeKind::Caller,
        }
    }

    /// Whether this error should end the owning session.
    ///
    /// Only a closed session is terminal; every per-frame failure is absorbed
    /// by the stability tracker.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, ScanError::SessionClosed)
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_are_not_fatal() {
        let errors = [
            ScanError::AcquisitionEmpty("zero-sized".into()),
            ScanError::SegmentationFailure,
            ScanError::GeometryRejected("concave".into()),
            ScanError::BlurRejected {
                variance: 12.0,
                threshold: 100.0,
            },
            ScanError::TransformFailure("singular".into()),
            ScanError::InternalFault("panic".into()),
        ];
        for err in &errors {
            assert!(!err.is_session_fatal(), "{err} should not be fatal");
        }
        assert!(ScanError::SessionClosed.is_session_fatal());
    }

    #[test]
    fn timeout_counts_as_fault() {
        let err = ScanError::StrategyTimeout {
            strategy: StrategyKind::ForegroundCut,
            budget_ms: 5000,
        };
        assert_eq!(err.outcome_kind(), OutcomeKind::Fault);
    }

    #[test]
    fn blur_message_includes_variance() {
        let err = ScanError::BlurRejected {
            variance: 42.25,
            threshold: 100.0,
        };
        assert!(err.to_string().contains("42.2") || err.to_string().contains("42.3"));
    }
}
