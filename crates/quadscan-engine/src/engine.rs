// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The per-frame orchestrator.
//
// One admitted frame goes through: upright rotation, region preprocessing,
// the segmentation cascade, the live blur check, the stability tracker and,
// when detection has been stable long enough, the pre-capture blur check and
// perspective rectification. Every outcome, including a panic anywhere in
// that chain, is turned into tracker updates and events. Nothing here ends
// the session.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use image::{GrayImage, RgbImage};
use quadscan_core::error::OutcomeKind;
use quadscan_core::feedback::feedback_for_error;
use quadscan_core::{
    DetectionState, DocumentCorners, DocumentKind, FeedbackKind, Frame, Point2, Result,
    ScanConfig, ScanError, ScanRegion, SessionId, StrategyKind,
};
use quadscan_vision::segment::panic_message;
use quadscan_vision::{
    BlurGate, ImageProcessor, PerspectiveRectifier, RegionPreprocessor, SegmentationCascade,
    order_points,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::debounce::{FeedbackDebouncer, OverlayThrottle};
use crate::events::{EventSink, ScanEvent};
use crate::region::{derive_scan_region, to_view};
use crate::tracker::StabilityTracker;

// -- Commands and reports -----------------------------------------------------

/// Runtime adjustments accepted between frames.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Concentrate detection on a centred region of this aspect ratio.
    SetScanRegion { aspect_ratio: f64, label: String },
    ClearScanRegion,
    /// Zero the stability counters and return to scanning.
    Reset,
    /// Corners placed by the user on a frame of the given size, as
    /// `[x0, y0, x1, y1, x2, y2, x3, y3]` in any order.
    SubmitManualCrop {
        points: [f64; 8],
        frame_width: u32,
        frame_height: u32,
    },
    SetRequiredHits(u32),
    SetAutoCapture(bool),
    SetOrientationFix(bool),
    SetBlurEnabled(bool),
    SetBlurThreshold(f64),
    SetViewSize(Option<(u32, u32)>),
}

impl EngineCommand {
    /// Region command for a known document format.
    pub fn for_document(kind: DocumentKind) -> Self {
        Self::SetScanRegion {
            aspect_ratio: kind.aspect_ratio(),
            label: kind.label().to_string(),
        }
    }
}

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Valid, sharp detection; not yet stable.
    Tracking { hits: u32 },
    Accepted(StrategyKind),
    /// A detection was found but the image was not sharp enough.
    Blurry { variance: f64 },
    /// Stability was reached but rectification failed.
    CaptureFailed,
    Missed(OutcomeKind),
}

/// Point-in-time view of the engine, for status displays and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub state: DetectionState,
    /// Consecutive blurry frames, capped; diagnostic only.
    pub blur_streak: u32,
    pub region: Option<ScanRegion>,
    pub frames_processed: u64,
    pub documents_accepted: u64,
}

// -- Engine -------------------------------------------------------------------

pub struct ScanEngine {
    session: SessionId,
    config: ScanConfig,
    preprocessor: RegionPreprocessor,
    cascade: SegmentationCascade,
    blur: BlurGate,
    blur_enabled: bool,
    rectifier: PerspectiveRectifier,
    tracker: StabilityTracker,
    debouncer: FeedbackDebouncer,
    overlay: OverlayThrottle,
    region_request: Option<(f64, String)>,
    region: Option<ScanRegion>,
    /// Upright frame size the current region was derived for.
    region_frame: (u32, u32),
    view_size: Option<(u32, u32)>,
    /// Last upright full-resolution frame.
    last_frame: Option<Arc<RgbImage>>,
    /// Frame offered with the pending manual-crop prompt. Later frames do not
    /// replace it.
    manual_frame: Option<Arc<RgbImage>>,
    last_timestamp: Duration,
    blur_streak: u32,
    frames_processed: u64,
    documents_accepted: u64,
}

impl ScanEngine {
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        let session = SessionId::new();
        info!(%session, "Scan engine created");

        Ok(Self {
            session,
            preprocessor: RegionPreprocessor::new(config.preprocess.clone()),
            cascade: SegmentationCascade::new(&config),
            blur: BlurGate::new(config.blur.threshold),
            blur_enabled: config.blur.enabled,
            rectifier: PerspectiveRectifier::new(config.rectify.clone()),
            tracker: StabilityTracker::new(&config.stability),
            debouncer: FeedbackDebouncer::new(Duration::from_millis(
                config.feedback.repeat_interval_ms,
            )),
            overlay: OverlayThrottle::new(Duration::from_millis(
                config.feedback.overlay_interval_ms,
            )),
            region_request: None,
            region: None,
            region_frame: (0, 0),
            view_size: config.feedback.view_size,
            last_frame: None,
            manual_frame: None,
            last_timestamp: Duration::ZERO,
            blur_streak: 0,
            frames_processed: 0,
            documents_accepted: 0,
            config,
        })
    }

    /// Replace the segmentation cascade, e.g. with a custom strategy list.
    pub fn with_cascade(mut self, cascade: SegmentationCascade) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// The frame a manual crop will be applied to: the one offered with the
    /// pending prompt, else the latest frame.
    pub fn crop_frame(&self) -> Option<Arc<RgbImage>> {
        self.manual_frame.clone().or_else(|| self.last_frame.clone())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.tracker.state(),
            blur_streak: self.blur_streak,
            region: self.region.clone(),
            frames_processed: self.frames_processed,
            documents_accepted: self.documents_accepted,
        }
    }

    // -- Frame pipeline -------------------------------------------------------

    /// Run one admitted frame through the pipeline.
    ///
    /// Never panics and never fails: every problem is reported through
    /// `sink` and folded into the stability counters.
    #[instrument(skip_all, fields(session = %self.session, width = frame.width, height = frame.height))]
    pub fn process_frame(&mut self, frame: Frame, sink: &mut impl EventSink) -> FrameOutcome {
        self.last_timestamp = frame.timestamp;
        self.frames_processed += 1;

        let result = catch_unwind(AssertUnwindSafe(|| self.run_pipeline(frame, sink)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => self.record_failure(err, sink),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "Frame pipeline panicked");
                self.record_failure(ScanError::InternalFault(message), sink)
            }
        };

        self.emit_overlay(sink);
        outcome
    }

    fn run_pipeline(&mut self, frame: Frame, sink: &mut impl EventSink) -> Result<FrameOutcome> {
        let rotation = frame.rotation;
        let upright = Arc::new(ImageProcessor::from_frame(frame)?.rotate(rotation).into_rgb());
        let (width, height) = upright.dimensions();
        self.refresh_region(width, height);
        self.last_frame = Some(Arc::clone(&upright));

        let working = self.preprocessor.prepare(&upright, self.region.as_ref())?;
        let expected_aspect = self.expected_aspect();
        let report = self.cascade.run(&working, expected_aspect);

        let best = report
            .hit
            .as_ref()
            .map(|hit| working.corners_to_frame(&hit.corners));
        sink.emit(ScanEvent::LiveContours {
            best,
            candidates: report
                .candidates
                .iter()
                .map(|c| c.vertices.iter().map(|p| working.to_frame(*p)).collect())
                .collect(),
            frame_width: width,
            frame_height: height,
        });

        let (Some(hit), Some(corners)) = (report.hit.as_ref(), best) else {
            return Err(report.failure().unwrap_or(ScanError::SegmentationFailure));
        };
        let strategy = hit.strategy;

        let gray = image::imageops::grayscale(&*upright);
        if self.blur_enabled {
            let metric = self.blur.measure(&gray);
            if let Err(err) = metric.check() {
                self.blur_streak = (self.blur_streak + 1).min(self.config.blur.diagnostic_cap);
                self.tracker.record_soft_failure();
                debug!(error = %err, streak = self.blur_streak, "Detection discarded");
                self.feedback(feedback_for_error(&err), sink);
                return Ok(FrameOutcome::Blurry {
                    variance: metric.variance,
                });
            }
        }
        self.blur_streak = 0;

        if !self.tracker.record_hit() {
            self.feedback(FeedbackKind::HoldSteady, sink);
            return Ok(FrameOutcome::Tracking {
                hits: self.tracker.state().consecutive_hits,
            });
        }
        self.capture(&upright, &gray, corners, strategy, sink)
    }

    /// Stability reached: final sharpness check on the document itself, then
    /// rectify.
    fn capture(
        &mut self,
        upright: &RgbImage,
        gray: &GrayImage,
        corners: DocumentCorners,
        strategy: StrategyKind,
        sink: &mut impl EventSink,
    ) -> Result<FrameOutcome> {
        if self.blur_enabled {
            let metric = self.blur.measure_region(gray, corners.bounding_rect());
            if let Err(err) = metric.check() {
                self.tracker.reject_capture_blur();
                info!(error = %err, "Capture rejected");
                self.feedback(feedback_for_error(&err), sink);
                return Ok(FrameOutcome::Blurry {
                    variance: metric.variance,
                });
            }
        }

        let expected_aspect = self.expected_aspect();
        match self.rectifier.rectify(upright, &corners, expected_aspect) {
            Ok(image) => {
                self.tracker.finish_acceptance();
                self.accept(corners, upright.dimensions(), image, strategy, sink);
                Ok(FrameOutcome::Accepted(strategy))
            }
            Err(err) => {
                // Counted as an acceptance that produced nothing.
                self.tracker.finish_acceptance();
                warn!(error = %err, "Rectification failed, capture abandoned");
                self.feedback(FeedbackKind::ProcessingError, sink);
                Ok(FrameOutcome::CaptureFailed)
            }
        }
    }

    fn accept(
        &mut self,
        corners: DocumentCorners,
        (frame_width, frame_height): (u32, u32),
        image: RgbImage,
        strategy: StrategyKind,
        sink: &mut impl EventSink,
    ) {
        self.documents_accepted += 1;
        info!(
            strategy = strategy.label(),
            width = image.width(),
            height = image.height(),
            accepted = self.documents_accepted,
            "Document accepted"
        );
        sink.emit(ScanEvent::DocumentAccepted {
            corners,
            frame_width,
            frame_height,
            image,
            strategy,
            captured_at: Utc::now(),
        });
        self.feedback(FeedbackKind::Captured, sink);
    }

    fn record_failure(&mut self, err: ScanError, sink: &mut impl EventSink) -> FrameOutcome {
        let kind = err.outcome_kind();
        debug!(?kind, error = %err, "Frame without acceptable detection");

        if self.tracker.record_miss() {
            self.manual_frame = self.last_frame.clone();
            let (frame_width, frame_height) = self
                .manual_frame
                .as_ref()
                .map(|frame| frame.dimensions())
                .unwrap_or((0, 0));
            sink.emit(ScanEvent::ManualCropNeeded {
                frame_width,
                frame_height,
                snapshot: self.manual_frame.clone(),
            });
            self.feedback(FeedbackKind::ManualCropNeeded, sink);
        } else {
            self.feedback(feedback_for_error(&err), sink);
        }
        FrameOutcome::Missed(kind)
    }

    fn feedback(&mut self, kind: FeedbackKind, sink: &mut impl EventSink) {
        if self.debouncer.offer(kind, self.last_timestamp) {
            sink.emit(ScanEvent::Feedback(kind));
        }
    }

    fn emit_overlay(&mut self, sink: &mut impl EventSink) {
        let Some(region) = &self.region else {
            return;
        };
        if self.overlay.ready(self.last_timestamp) {
            let rect = to_view(region.rect, self.region_frame, self.view_size);
            sink.emit(ScanEvent::OverlayRegion(rect));
        }
    }

    // -- Scan region ----------------------------------------------------------

    fn expected_aspect(&self) -> Option<f64> {
        self.region.as_ref().map(|r| r.aspect_ratio)
    }

    /// Derive the region again whenever the upright frame size changes.
    fn refresh_region(&mut self, width: u32, height: u32) {
        if (width, height) == self.region_frame {
            return;
        }
        self.region_frame = (width, height);
        let preprocess = &self.config.preprocess;
        self.region = self.region_request.as_ref().map(|(aspect, label)| {
            derive_scan_region(
                width,
                height,
                *aspect,
                label,
                preprocess.region_coverage,
                preprocess.min_region_side as f64,
            )
        });
        if let Some(region) = &self.region {
            debug!(
                label = %region.label,
                x = region.rect.x,
                y = region.rect.y,
                w = region.rect.width,
                h = region.rect.height,
                "Scan region derived"
            );
            self.overlay.force();
        }
    }

    pub fn set_scan_region(&mut self, aspect_ratio: f64, label: impl Into<String>) -> Result<()> {
        if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
            return Err(ScanError::InvalidInput(format!(
                "aspect ratio must be positive, got {aspect_ratio}"
            )));
        }
        self.region_request = Some((aspect_ratio, label.into()));
        self.region_frame = (0, 0);
        if let Some((w, h)) = self.last_frame.as_ref().map(|f| f.dimensions()) {
            self.refresh_region(w, h);
        }
        Ok(())
    }

    pub fn clear_scan_region(&mut self) {
        self.region_request = None;
        self.region = None;
    }

    // -- Manual crop ----------------------------------------------------------

    /// Rectify the retained frame with user-placed corners.
    ///
    /// The retained frame is the one sent with `ManualCropNeeded`, or the
    /// latest frame when no prompt is pending. `points` are in a
    /// `frame_width` x `frame_height` coordinate space (typically the
    /// caller's view) and are rescaled to the retained frame.
    #[instrument(skip(self, sink))]
    pub fn submit_manual_crop(
        &mut self,
        points: [f64; 8],
        frame_width: u32,
        frame_height: u32,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let snapshot = self.crop_frame().ok_or_else(|| {
            ScanError::InvalidInput("no frame retained for manual cropping".into())
        })?;
        if frame_width == 0 || frame_height == 0 {
            return Err(ScanError::InvalidInput(
                "manual crop frame size must be positive".into(),
            ));
        }
        if points.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::InvalidInput(
                "manual crop points must be finite".into(),
            ));
        }

        let (width, height) = snapshot.dimensions();
        let sx = width as f64 / frame_width as f64;
        let sy = height as f64 / frame_height as f64;
        let quad: [Point2; 4] =
            std::array::from_fn(|i| Point2::new(points[2 * i] * sx, points[2 * i + 1] * sy));
        let corners = order_points(&quad);

        let expected_aspect = self.expected_aspect();
        let image = match self.rectifier.rectify(&snapshot, &corners, expected_aspect) {
            Ok(image) => image,
            Err(err) => {
                warn!(error = %err, "Manual crop could not be rectified");
                self.feedback(FeedbackKind::ProcessingError, sink);
                return Err(err);
            }
        };

        self.tracker.complete_manual_crop();
        self.manual_frame = None;
        self.blur_streak = 0;
        self.accept(corners, (width, height), image, StrategyKind::Manual, sink);
        Ok(())
    }

    // -- Commands -------------------------------------------------------------

    pub fn handle_command(&mut self, command: EngineCommand, sink: &mut impl EventSink) -> Result<()> {
        debug!(?command, "Engine command");
        match command {
            EngineCommand::SetScanRegion {
                aspect_ratio,
                label,
            } => self.set_scan_region(aspect_ratio, label)?,
            EngineCommand::ClearScanRegion => self.clear_scan_region(),
            EngineCommand::Reset => {
                self.tracker.reset();
                self.manual_frame = None;
                self.debouncer.reset();
                self.blur_streak = 0;
            }
            EngineCommand::SubmitManualCrop {
                points,
                frame_width,
                frame_height,
            } => self.submit_manual_crop(points, frame_width, frame_height, sink)?,
            EngineCommand::SetRequiredHits(hits) => self.tracker.set_required_hits(hits),
            EngineCommand::SetAutoCapture(enabled) => self.tracker.set_auto_capture(enabled),
            EngineCommand::SetOrientationFix(enabled) => self.rectifier.set_orientation_fix(enabled),
            EngineCommand::SetBlurEnabled(enabled) => self.blur_enabled = enabled,
            EngineCommand::SetBlurThreshold(threshold) => {
                if !threshold.is_finite() || threshold <= 0.0 {
                    return Err(ScanError::InvalidInput(format!(
                        "blur threshold must be positive, got {threshold}"
                    )));
                }
                self.blur.set_threshold(threshold);
            }
            EngineCommand::SetViewSize(size) => {
                self.view_size = size;
                self.overlay.force();
            }
        }
        Ok(())
    }
}
