// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Events the engine produces for its collaborators, and the sinks that
// receive them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use image::RgbImage;
use quadscan_core::{DocumentCorners, FeedbackKind, Point2, Rect, StrategyKind};
use tracing::trace;

/// Everything observable about a scanning session.
///
/// Coordinates are in upright full-resolution frame space, except
/// `OverlayRegion`, which is in the caller's view space when a view size is
/// configured.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A document passed stability, blur, and rectification, or a manual crop
    /// was applied.
    DocumentAccepted {
        corners: DocumentCorners,
        frame_width: u32,
        frame_height: u32,
        image: RgbImage,
        strategy: StrategyKind,
        captured_at: DateTime<Utc>,
    },
    /// Per-frame visualisation data, sent whether or not anything was found.
    LiveContours {
        best: Option<DocumentCorners>,
        candidates: Vec<Vec<Point2>>,
        frame_width: u32,
        frame_height: u32,
    },
    Feedback(FeedbackKind),
    OverlayRegion(Rect),
    /// Automatic detection gave up. Carries the frame the corners should be
    /// placed on.
    ManualCropNeeded {
        frame_width: u32,
        frame_height: u32,
        snapshot: Option<Arc<RgbImage>>,
    },
}

impl ScanEvent {
    /// Short stable name, used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DocumentAccepted { .. } => "document_accepted",
            Self::LiveContours { .. } => "live_contours",
            Self::Feedback(_) => "feedback",
            Self::OverlayRegion(_) => "overlay_region",
            Self::ManualCropNeeded { .. } => "manual_crop_needed",
        }
    }
}

/// Receiver of engine events.
pub trait EventSink {
    fn emit(&mut self, event: ScanEvent);
}

impl EventSink for Vec<ScanEvent> {
    fn emit(&mut self, event: ScanEvent) {
        self.push(event);
    }
}

/// Events sent after the receiver hung up are dropped.
impl EventSink for Sender<ScanEvent> {
    fn emit(&mut self, event: ScanEvent) {
        if let Err(err) = self.send(event) {
            trace!(event = err.0.name(), "Event dropped: receiver closed");
        }
    }
}
