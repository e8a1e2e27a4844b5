// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Segmentation cascade: an ordered list of independent strategies tried in
// priority order until one yields a candidate that scores and validates.
//
// Each strategy is a plain function. It runs under a wall-clock deadline it
// must poll, and inside `catch_unwind` so a panic in one strategy only costs
// that strategy.

pub mod adaptive;
pub mod color;
pub mod contour;
pub mod cut;
pub mod multiscale;
pub mod threshold;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use quadscan_core::config::{CascadeConfig, GeometryConfig, ScanConfig};
use quadscan_core::error::{Result, ScanError};
use quadscan_core::{Candidate, DocumentCorners, StrategyKind};
use tracing::{debug, instrument, warn};

use crate::geometry::GeometryValidator;
use crate::preprocess::WorkingImage;
use crate::score::{ContourScorer, ScoredCandidate};

/// Candidate polygons kept in a report for live visualisation.
const MAX_REPORTED_CANDIDATES: usize = 5;

// -- Strategy plumbing --------------------------------------------------------

/// Everything a strategy may read.
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput<'a> {
    pub working: &'a WorkingImage,
    pub expected_aspect: Option<f64>,
    pub cascade: &'a CascadeConfig,
    pub geometry: &'a GeometryConfig,
}

/// Signature shared by every strategy.
pub type StrategyFn = fn(&StrategyInput<'_>, &Deadline) -> Result<Vec<Candidate>>;

/// Wall-clock budget for one strategy run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
    strategy: StrategyKind,
}

impl Deadline {
    pub fn start(strategy: StrategyKind, budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
            strategy,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() > self.budget
    }

    /// Fail with `StrategyTimeout` once the budget is spent.
    pub fn check(&self) -> Result<()> {
        if self.expired() {
            return Err(ScanError::StrategyTimeout {
                strategy: self.strategy,
                budget_ms: self.budget.as_millis() as u64,
            });
        }
        Ok(())
    }
}

/// What one strategy produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Candidates(Vec<Candidate>),
    NoCandidate,
    /// The strategy errored, timed out, or panicked.
    Faulted(String),
}

/// A strategy bound to its kind and budget.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub budget: Duration,
    run: StrategyFn,
}

impl Strategy {
    pub fn new(kind: StrategyKind, budget: Duration, run: StrategyFn) -> Self {
        Self { kind, budget, run }
    }

    /// The built-in implementation of `kind`. `Manual` has none.
    pub fn for_kind(kind: StrategyKind, config: &CascadeConfig) -> Option<Self> {
        let budget = Duration::from_millis(config.strategy_budget_ms);
        let strategy = match kind {
            StrategyKind::FastThreshold => Self::new(kind, budget, threshold::fast_threshold),
            StrategyKind::AdaptiveMorphology => Self::new(kind, budget, adaptive::adaptive_morphology),
            StrategyKind::ForegroundCut => Self::new(
                kind,
                Duration::from_millis(config.cut_budget_ms),
                cut::foreground_cut,
            ),
            StrategyKind::ColorSegmentation => Self::new(kind, budget, color::color_segmentation),
            StrategyKind::MultiScaleEdges => Self::new(kind, budget, multiscale::multi_scale),
            StrategyKind::Manual => return None,
        };
        Some(strategy)
    }

    /// Run the strategy, converting errors and panics into `Faulted`.
    pub fn execute(&self, input: &StrategyInput<'_>) -> StrategyOutcome {
        let deadline = Deadline::start(self.kind, self.budget);
        match catch_unwind(AssertUnwindSafe(|| (self.run)(input, &deadline))) {
            Ok(Ok(candidates)) if candidates.is_empty() => StrategyOutcome::NoCandidate,
            Ok(Ok(candidates)) => StrategyOutcome::Candidates(candidates),
            Ok(Err(e)) => {
                warn!(strategy = self.kind.label(), error = %e, "Strategy failed");
                StrategyOutcome::Faulted(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(strategy = self.kind.label(), %message, "Strategy panicked");
                StrategyOutcome::Faulted(message)
            }
        }
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

// -- Reports ------------------------------------------------------------------

/// The candidate the cascade settled on.
#[derive(Debug, Clone)]
pub struct CascadeHit {
    pub strategy: StrategyKind,
    /// Validated corners in working-image coordinates.
    pub corners: DocumentCorners,
    pub scored: ScoredCandidate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    Hit,
    NoCandidate,
    /// Candidates were produced but none passed the scorer's hard limits.
    ScoredOut,
    /// The best candidate failed geometric validation.
    Rejected(String),
    Faulted(String),
}

#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    pub result: AttemptResult,
    pub elapsed: Duration,
}

/// Outcome of one cascade run over a working image.
#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    pub hit: Option<CascadeHit>,
    /// Scored candidates from every attempt, best first within each attempt.
    pub candidates: Vec<Candidate>,
    pub attempts: Vec<StrategyAttempt>,
}

impl CascadeReport {
    /// The error describing a run without a hit, or `None` after a hit.
    pub fn failure(&self) -> Option<ScanError> {
        if self.hit.is_some() {
            return None;
        }
        let rejection = self.attempts.iter().rev().find_map(|a| match &a.result {
            AttemptResult::Rejected(reason) => Some(reason.clone()),
            _ => None,
        });
        Some(match rejection {
            Some(reason) => ScanError::GeometryRejected(reason),
            None => ScanError::SegmentationFailure,
        })
    }
}

// -- Cascade ------------------------------------------------------------------

/// Ordered strategies plus the scorer and validator that judge their output.
#[derive(Debug, Clone)]
pub struct SegmentationCascade {
    strategies: Vec<Strategy>,
    scorer: ContourScorer,
    validator: GeometryValidator,
    cascade: CascadeConfig,
}

impl SegmentationCascade {
    pub fn new(config: &ScanConfig) -> Self {
        let strategies = config
            .cascade
            .strategies
            .iter()
            .filter_map(|kind| Strategy::for_kind(*kind, &config.cascade))
            .collect();
        Self {
            strategies,
            scorer: ContourScorer::new(config.scoring.clone()),
            validator: GeometryValidator::new(config.geometry.clone()),
            cascade: config.cascade.clone(),
        }
    }

    /// Replace the strategy list.
    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn validator(&self) -> &GeometryValidator {
        &self.validator
    }

    /// Try each strategy in order and stop at the first whose best-scoring
    /// candidate validates.
    #[instrument(skip(self, working), fields(width = working.width(), height = working.height()))]
    pub fn run(&self, working: &WorkingImage, expected_aspect: Option<f64>) -> CascadeReport {
        let input = StrategyInput {
            working,
            expected_aspect,
            cascade: &self.cascade,
            geometry: self.validator.config(),
        };
        let mut report = CascadeReport::default();

        for strategy in &self.strategies {
            let started = Instant::now();
            let outcome = strategy.execute(&input);
            let (result, hit) = self.judge(strategy.kind, outcome, &input, &mut report.candidates);
            let elapsed = started.elapsed();
            debug!(
                strategy = strategy.kind.label(),
                result = ?result,
                elapsed_ms = elapsed.as_millis() as u64,
                "Strategy attempted"
            );
            report.attempts.push(StrategyAttempt {
                strategy: strategy.kind,
                result,
                elapsed,
            });
            if hit.is_some() {
                report.hit = hit;
                break;
            }
        }

        report.candidates.truncate(MAX_REPORTED_CANDIDATES);
        report
    }

    fn judge(
        &self,
        kind: StrategyKind,
        outcome: StrategyOutcome,
        input: &StrategyInput<'_>,
        seen: &mut Vec<Candidate>,
    ) -> (AttemptResult, Option<CascadeHit>) {
        let candidates = match outcome {
            StrategyOutcome::Candidates(c) => c,
            StrategyOutcome::NoCandidate => return (AttemptResult::NoCandidate, None),
            StrategyOutcome::Faulted(reason) => return (AttemptResult::Faulted(reason), None),
        };

        let ranked = self
            .scorer
            .rank(&candidates, input.working.width(), input.working.height());
        seen.extend(ranked.iter().map(|s| s.candidate.clone()));

        let Some(best) = ranked.into_iter().next() else {
            return (AttemptResult::ScoredOut, None);
        };
        let Some(quad) = best.candidate.quad else {
            return (AttemptResult::Rejected("no four-point fit".into()), None);
        };

        match self.validator.validate(&quad, input.expected_aspect) {
            Ok(corners) => {
                debug!(strategy = kind.label(), score = best.score, "Candidate accepted");
                (
                    AttemptResult::Hit,
                    Some(CascadeHit {
                        strategy: kind,
                        corners,
                        scored: best,
                    }),
                )
            }
            Err(ScanError::GeometryRejected(reason)) => (AttemptResult::Rejected(reason), None),
            Err(other) => (AttemptResult::Rejected(other.to_string()), None),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{Rgb, RgbImage};

    use crate::preprocess::WorkingImage;

    /// A flat `fg` rectangle `[x0, x1) x [y0, y1)` on a flat `bg` frame.
    pub fn document(w: u32, h: u32, rect: (u32, u32, u32, u32), fg: [u8; 3], bg: [u8; 3]) -> RgbImage {
        let (x0, y0, x1, y1) = rect;
        RgbImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 {
                Rgb(fg)
            } else {
                Rgb(bg)
            }
        })
    }

    pub fn working(rgb: RgbImage) -> WorkingImage {
        let gray = image::imageops::grayscale(&rgb);
        WorkingImage {
            rgb,
            gray,
            ratio: 1.0,
            offset: (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::test_support::{document, working};
    use super::*;

    fn cascade() -> SegmentationCascade {
        SegmentationCascade::new(&ScanConfig::default())
    }

    fn panicking(_: &StrategyInput<'_>, _: &Deadline) -> Result<Vec<Candidate>> {
        panic!("strategy blew up")
    }

    fn slow(_: &StrategyInput<'_>, deadline: &Deadline) -> Result<Vec<Candidate>> {
        std::thread::sleep(Duration::from_millis(5));
        deadline.check()?;
        Ok(Vec::new())
    }

    #[test]
    fn default_cascade_has_five_strategies_in_order() {
        let kinds: Vec<_> = cascade().strategies().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, StrategyKind::CASCADE.to_vec());
    }

    #[test]
    fn clean_document_is_found_by_first_strategy() {
        let img = working(document(240, 200, (40, 30, 200, 170), [235, 235, 235], [25, 25, 25]));
        let report = cascade().run(&img, None);
        let hit = report.hit.as_ref().expect("document found");
        assert_eq!(hit.strategy, StrategyKind::FastThreshold);
        assert_eq!(report.attempts.len(), 1);
        let tl = hit.corners.top_left();
        assert!((tl.x - 40.0).abs() <= 2.0 && (tl.y - 30.0).abs() <= 2.0, "{tl:?}");
        assert!(report.failure().is_none());
    }

    #[test]
    fn blank_frame_exhausts_cascade() {
        let img = working(RgbImage::from_pixel(200, 160, image::Rgb([128, 128, 128])));
        let report = cascade().run(&img, None);
        assert!(report.hit.is_none());
        assert_eq!(report.attempts.len(), 5);
        assert!(matches!(report.failure(), Some(ScanError::SegmentationFailure)));
    }

    #[test]
    fn panicking_strategy_falls_through() {
        let budget = Duration::from_millis(500);
        let cascade = cascade().with_strategies(vec![
            Strategy::new(StrategyKind::AdaptiveMorphology, budget, panicking),
            Strategy::new(StrategyKind::FastThreshold, budget, threshold::fast_threshold),
        ]);
        let img = working(document(240, 200, (40, 30, 200, 170), [235, 235, 235], [25, 25, 25]));
        let report = cascade.run(&img, None);
        assert!(matches!(report.attempts[0].result, AttemptResult::Faulted(_)));
        assert_eq!(report.hit.map(|h| h.strategy), Some(StrategyKind::FastThreshold));
    }

    #[test]
    fn expired_deadline_faults_strategy() {
        let strategy = Strategy::new(StrategyKind::ForegroundCut, Duration::ZERO, slow);
        let img = working(RgbImage::new(50, 50));
        let config = CascadeConfig::default();
        let geometry = GeometryConfig::default();
        let input = StrategyInput {
            working: &img,
            expected_aspect: None,
            cascade: &config,
            geometry: &geometry,
        };
        assert!(matches!(strategy.execute(&input), StrategyOutcome::Faulted(_)));
    }

    #[test]
    fn aspect_mismatch_reports_geometry_rejection() {
        let img = working(document(240, 200, (40, 30, 200, 170), [235, 235, 235], [25, 25, 25]));
        let cascade = cascade().with_strategies(vec![Strategy::new(
            StrategyKind::FastThreshold,
            Duration::from_millis(500),
            threshold::fast_threshold,
        )]);
        let report = cascade.run(&img, Some(2.35));
        assert!(report.hit.is_none());
        assert!(matches!(report.failure(), Some(ScanError::GeometryRejected(_))));
        assert_eq!(report.candidates.len(), 1);
    }
}
