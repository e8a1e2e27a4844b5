// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour scoring: weighted shape features used to rank the candidates a
// strategy produced.

use quadscan_core::Candidate;
use quadscan_core::config::{AreaLimits, ScoringConfig};
use tracing::trace;

/// Per-feature scores of one candidate, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub area: f64,
    pub solidity: f64,
    pub rectangularity: f64,
    pub corners: f64,
    pub position: f64,
}

/// A candidate that passed the hard limits, with its composite score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Ranks candidates by a fixed weighted sum of shape features.
#[derive(Debug, Clone)]
pub struct ContourScorer {
    config: ScoringConfig,
}

impl ContourScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Closeness of a polygon's vertex count to four.
    pub fn corner_score(count: usize) -> f64 {
        match count {
            4 => 1.0,
            3..=6 => 0.8 - (count as f64 - 4.0).abs() * 0.1,
            _ => 0.3,
        }
    }

    /// Score one candidate on a `width` x `height` working frame.
    ///
    /// Returns `None` when the candidate fails a hard limit: solidity or
    /// rectangularity at or below their floors, or an area fraction outside
    /// `limits`.
    pub fn score(
        &self,
        candidate: &Candidate,
        width: u32,
        height: u32,
        limits: AreaLimits,
    ) -> Option<ScoredCandidate> {
        let frame_area = width as f64 * height as f64;
        if frame_area <= 0.0 {
            return None;
        }

        let fraction = candidate.area / frame_area;
        if !limits.contains(fraction)
            || candidate.solidity <= self.config.min_solidity
            || candidate.rectangularity <= self.config.min_rectangularity
        {
            trace!(
                fraction,
                solidity = candidate.solidity,
                rectangularity = candidate.rectangularity,
                "Candidate outside hard limits"
            );
            return None;
        }

        let expected = frame_area * self.config.expected_area_fraction;
        let area = (candidate.area / expected).min(1.0);

        let center = candidate.bounding_box.center();
        let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
        let max_distance = cx.hypot(cy);
        let position = if max_distance > 0.0 {
            (1.0 - (center.x - cx).hypot(center.y - cy) / max_distance).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let breakdown = ScoreBreakdown {
            area,
            solidity: candidate.solidity,
            rectangularity: candidate.rectangularity,
            corners: Self::corner_score(candidate.corner_count),
            position,
        };

        let score = self.config.area_weight * breakdown.area
            + self.config.solidity_weight * breakdown.solidity
            + self.config.rectangularity_weight * breakdown.rectangularity
            + self.config.corner_weight * breakdown.corners
            + self.config.position_weight * breakdown.position;

        Some(ScoredCandidate {
            candidate: candidate.clone(),
            score,
            breakdown,
        })
    }

    /// Score every candidate with the area limits of its strategy and return
    /// the survivors, best first.
    pub fn rank(&self, candidates: &[Candidate], width: u32, height: u32) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .filter_map(|c| self.score(c, width, height, self.config.area_limits(c.strategy)))
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }
}
