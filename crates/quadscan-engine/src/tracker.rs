// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Temporal stability tracking.
//
// A detection is only accepted after several consecutive good frames, and a
// run of bad frames hands over to manual cropping instead of scanning
// forever. The counters behave like a circuit breaker: misses accumulate
// until a threshold opens the manual path, and only an explicit manual-crop
// result or reset closes it again.

use quadscan_core::config::StabilityConfig;
use quadscan_core::{DetectionMode, DetectionState};
use tracing::{debug, info, warn};

/// Hits removed when the pre-capture blur check fails.
const CAPTURE_BLUR_PENALTY: u32 = 2;
/// Hits removed after a non-auto-capture acceptance.
const CONTINUOUS_HIT_DECAY: u32 = 2;

pub struct StabilityTracker {
    state: DetectionState,
    required_hits: u32,
    failure_threshold: u32,
    auto_capture: bool,
}

impl StabilityTracker {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            state: DetectionState::default(),
            required_hits: config.required_hits.max(1),
            failure_threshold: config.failure_threshold.max(1),
            auto_capture: config.auto_capture,
        }
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn required_hits(&self) -> u32 {
        self.required_hits
    }

    pub fn set_required_hits(&mut self, hits: u32) {
        self.required_hits = hits.max(1);
    }

    pub fn auto_capture(&self) -> bool {
        self.auto_capture
    }

    pub fn set_auto_capture(&mut self, enabled: bool) {
        self.auto_capture = enabled;
    }

    /// Record a validated, sharp detection.
    ///
    /// Returns `true` when enough consecutive hits have accumulated and the
    /// caller should attempt capture. The mode is then `StableAccepted` until
    /// [`finish_acceptance`](Self::finish_acceptance) or
    /// [`reject_capture_blur`](Self::reject_capture_blur) is called.
    /// While a manual crop is pending hits still count, capped at the
    /// requirement, but no capture is offered.
    pub fn record_hit(&mut self) -> bool {
        self.state.consecutive_misses = 0;

        if self.state.mode == DetectionMode::ManualCropPending {
            self.state.consecutive_hits = (self.state.consecutive_hits + 1).min(self.required_hits);
            return false;
        }

        self.state.consecutive_hits += 1;
        debug!(
            hits = self.state.consecutive_hits,
            required = self.required_hits,
            "Detection hit"
        );
        if self.state.consecutive_hits >= self.required_hits {
            self.state.mode = DetectionMode::StableAccepted;
            info!(hits = self.state.consecutive_hits, "Detection stable");
            return true;
        }
        false
    }

    /// Close an acceptance cycle, successful or not, and return to scanning.
    pub fn finish_acceptance(&mut self) {
        self.state.consecutive_hits = if self.auto_capture {
            0
        } else {
            self.state
                .consecutive_hits
                .saturating_sub(CONTINUOUS_HIT_DECAY)
                .max(1)
        };
        self.state.mode = DetectionMode::Scanning;
        debug!(hits = self.state.consecutive_hits, "Acceptance cycle finished");
    }

    /// The pre-capture blur check failed: back off harder than a miss.
    pub fn reject_capture_blur(&mut self) {
        self.state.consecutive_hits = self
            .state
            .consecutive_hits
            .saturating_sub(CAPTURE_BLUR_PENALTY);
        if self.state.mode == DetectionMode::StableAccepted {
            self.state.mode = DetectionMode::Scanning;
        }
        debug!(hits = self.state.consecutive_hits, "Capture rejected as blurry");
    }

    /// A blurry live frame: lose a hit without counting towards the manual
    /// crop threshold.
    pub fn record_soft_failure(&mut self) {
        self.state.consecutive_hits = self.state.consecutive_hits.saturating_sub(1);
    }

    /// Record a frame without a valid detection.
    ///
    /// Returns `true` exactly once per pending period: on the miss that
    /// enters `ManualCropPending`.
    pub fn record_miss(&mut self) -> bool {
        self.state.consecutive_hits = self.state.consecutive_hits.saturating_sub(1);
        self.state.consecutive_misses = self.state.consecutive_misses.saturating_add(1);

        if self.state.consecutive_misses >= self.failure_threshold
            && self.state.mode != DetectionMode::ManualCropPending
        {
            warn!(
                misses = self.state.consecutive_misses,
                "Sustained detection failure, offering manual crop"
            );
            self.state.mode = DetectionMode::ManualCropPending;
            return true;
        }
        false
    }

    /// A manual crop result arrived.
    pub fn complete_manual_crop(&mut self) {
        info!(prev_mode = ?self.state.mode, "Manual crop completed");
        self.state = DetectionState::default();
    }

    /// Explicit reset: zero both counters and return to scanning.
    pub fn reset(&mut self) {
        self.state = DetectionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(auto_capture: bool) -> StabilityTracker {
        StabilityTracker::new(&StabilityConfig {
            auto_capture,
            ..StabilityConfig::default()
        })
    }

    #[test]
    fn fifth_hit_triggers_capture() {
        let mut t = tracker(true);
        for _ in 0..4 {
            assert!(!t.record_hit());
        }
        assert!(t.record_hit());
        assert_eq!(t.state().mode, DetectionMode::StableAccepted);
    }

    #[test]
    fn auto_capture_resets_hits() {
        let mut t = tracker(true);
        for _ in 0..5 {
            t.record_hit();
        }
        t.finish_acceptance();
        assert_eq!(t.state().consecutive_hits, 0);
        assert_eq!(t.state().mode, DetectionMode::Scanning);
    }

    #[test]
    fn continuous_mode_decays_hits() {
        let mut t = tracker(false);
        for _ in 0..5 {
            t.record_hit();
        }
        t.finish_acceptance();
        assert_eq!(t.state().consecutive_hits, 3);

        t.set_required_hits(1);
        t.reset();
        assert!(t.record_hit());
        t.finish_acceptance();
        assert_eq!(t.state().consecutive_hits, 1);
    }

    #[test]
    fn miss_between_hits_delays_capture() {
        let mut t = tracker(true);
        for _ in 0..4 {
            t.record_hit();
        }
        t.record_miss();
        assert_eq!(t.state().consecutive_hits, 3);
        assert!(!t.record_hit());
        assert!(t.record_hit());
    }

    #[test]
    fn manual_crop_offered_exactly_once() {
        let mut t = tracker(true);
        let offers: Vec<bool> = (0..40).map(|_| t.record_miss()).collect();
        assert_eq!(offers.iter().filter(|o| **o).count(), 1);
        assert!(offers[14]);
        assert_eq!(t.state().mode, DetectionMode::ManualCropPending);

        t.complete_manual_crop();
        assert_eq!(t.state(), DetectionState::default());
        let again = (0..15).filter(|_| t.record_miss()).count();
        assert_eq!(again, 1);
    }

    #[test]
    fn pending_suppresses_capture() {
        let mut t = tracker(true);
        for _ in 0..15 {
            t.record_miss();
        }
        for _ in 0..10 {
            assert!(!t.record_hit());
        }
        assert_eq!(t.state().consecutive_hits, 5);
        assert_eq!(t.state().mode, DetectionMode::ManualCropPending);
    }

    #[test]
    fn capture_blur_costs_two_hits() {
        let mut t = tracker(true);
        for _ in 0..5 {
            t.record_hit();
        }
        t.reject_capture_blur();
        assert_eq!(t.state().consecutive_hits, 3);
        assert_eq!(t.state().mode, DetectionMode::Scanning);
    }

    #[test]
    fn soft_failure_leaves_misses_alone() {
        let mut t = tracker(true);
        t.record_hit();
        t.record_hit();
        t.record_soft_failure();
        assert_eq!(t.state().consecutive_hits, 1);
        assert_eq!(t.state().consecutive_misses, 0);
    }
}
