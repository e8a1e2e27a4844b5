// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanner configuration. Every section has working defaults so a partial JSON
// file only needs to mention the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::types::{RectifyMode, StrategyKind};

/// Complete tunable configuration for one scanning session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub gate: GateConfig,
    pub preprocess: PreprocessConfig,
    pub cascade: CascadeConfig,
    pub scoring: ScoringConfig,
    pub geometry: GeometryConfig,
    pub stability: StabilityConfig,
    pub blur: BlurConfig,
    pub rectify: RectifyConfig,
    pub feedback: FeedbackConfig,
}

/// Frame admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum spacing between admitted frames.
    pub min_interval_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
        }
    }
}

/// Region cropping and working-resolution downscale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Padding added around the scan region on every side before cropping.
    pub region_padding: u32,
    /// Minimum side of a scan region, and of a padded crop, for it to be used.
    pub min_region_side: u32,
    /// The shorter side of the working image is scaled down to this.
    pub working_size: u32,
    /// Below this shorter side the crop is processed at full resolution.
    pub full_resolution_floor: u32,
    /// Fraction of the frame a derived scan region may cover.
    pub region_coverage: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            region_padding: 100,
            min_region_side: 200,
            working_size: 200,
            full_resolution_floor: 150,
            region_coverage: 0.85,
        }
    }
}

/// Segmentation strategies and their budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Strategies to try, in priority order.
    pub strategies: Vec<StrategyKind>,
    /// Wall-clock budget for every strategy except the foreground cut.
    pub strategy_budget_ms: u64,
    /// Wall-clock budget for the foreground/background cut.
    pub cut_budget_ms: u64,
    /// Refinement passes of the foreground/background cut.
    pub cut_iterations: u32,
    /// Colour distance separating foreground from background pixels.
    pub color_threshold: f64,
    /// Neighbour colour distance allowed while flood-filling the foreground.
    pub flood_threshold: f64,
    /// Otsu contours below this fraction of the frame are ignored.
    pub fast_min_area_fraction: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            strategies: StrategyKind::CASCADE.to_vec(),
            strategy_budget_ms: 500,
            cut_budget_ms: 5000,
            cut_iterations: 4,
            color_threshold: 40.0,
            flood_threshold: 30.0,
            fast_min_area_fraction: 0.15,
        }
    }
}

/// Inclusive range of candidate area as a fraction of the working frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaLimits {
    pub min: f64,
    pub max: f64,
}

impl AreaLimits {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, fraction: f64) -> bool {
        fraction >= self.min && fraction <= self.max
    }
}

/// Weights and hard limits of the contour scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub area_weight: f64,
    pub solidity_weight: f64,
    pub rectangularity_weight: f64,
    pub corner_weight: f64,
    pub position_weight: f64,
    /// Area fraction at which the area score saturates at 1.
    pub expected_area_fraction: f64,
    /// Candidates at or below this solidity are dropped.
    pub min_solidity: f64,
    /// Candidates at or below this rectangularity are dropped.
    pub min_rectangularity: f64,
    pub default_area: AreaLimits,
    pub fast_threshold_area: AreaLimits,
    pub adaptive_area: AreaLimits,
    pub cut_area: AreaLimits,
    pub color_area: AreaLimits,
    pub multi_scale_area: AreaLimits,
}

impl ScoringConfig {
    /// Area limits applied to candidates from `strategy`.
    pub fn area_limits(&self, strategy: StrategyKind) -> AreaLimits {
        match strategy {
            StrategyKind::FastThreshold => self.fast_threshold_area,
            StrategyKind::AdaptiveMorphology => self.adaptive_area,
            StrategyKind::ForegroundCut => self.cut_area,
            StrategyKind::ColorSegmentation => self.color_area,
            StrategyKind::MultiScaleEdges => self.multi_scale_area,
            StrategyKind::Manual => self.default_area,
        }
    }

    pub fn weight_sum(&self) -> f64 {
        self.area_weight
            + self.solidity_weight
            + self.rectangularity_weight
            + self.corner_weight
            + self.position_weight
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            area_weight: 0.3,
            solidity_weight: 0.25,
            rectangularity_weight: 0.2,
            corner_weight: 0.15,
            position_weight: 0.1,
            expected_area_fraction: 0.5,
            min_solidity: 0.75,
            min_rectangularity: 0.5,
            default_area: AreaLimits::new(0.10, 0.90),
            fast_threshold_area: AreaLimits::new(0.15, 0.95),
            adaptive_area: AreaLimits::new(0.08, 0.80),
            cut_area: AreaLimits::new(0.01, 0.95),
            color_area: AreaLimits::new(0.08, 0.85),
            multi_scale_area: AreaLimits::new(0.10, 0.90),
        }
    }
}

/// Quadrilateral validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Minimum distance between any two corners, in working pixels.
    pub min_corner_distance: f64,
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,
    /// Shorter over longer side, for both pairs of opposite sides.
    pub min_opposite_side_ratio: f64,
    /// Cross products below this magnitude count as collinear.
    pub collinear_epsilon: f64,
    /// Relative aspect tolerance used when picking a four-point fit inside a strategy.
    pub candidate_aspect_tolerance: f64,
    /// Relative aspect tolerance of the final geometry check.
    pub validator_aspect_tolerance: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            min_corner_distance: 50.0,
            min_angle_deg: 45.0,
            max_angle_deg: 135.0,
            min_opposite_side_ratio: 0.7,
            collinear_epsilon: 1e-6,
            candidate_aspect_tolerance: 0.15,
            validator_aspect_tolerance: 0.25,
        }
    }
}

/// Temporal stability state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Consecutive valid detections required before a capture.
    pub required_hits: u32,
    /// Consecutive misses before manual cropping is offered.
    pub failure_threshold: u32,
    /// Reset hits to zero after a capture instead of keeping the lock.
    pub auto_capture: bool,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            required_hits: 5,
            failure_threshold: 15,
            auto_capture: true,
        }
    }
}

/// Sharpness gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    pub enabled: bool,
    /// Laplacian variance below this is blurry.
    pub threshold: f64,
    /// Cap of the diagnostic consecutive-blur counter.
    pub diagnostic_cap: u32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 100.0,
            diagnostic_cap: 3,
        }
    }
}

/// Perspective rectification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    pub mode: RectifyMode,
    /// Smallest output side; smaller results are rejected.
    pub min_output_side: u32,
    /// Relative deviation from the expected aspect ratio that triggers an adjustment.
    pub aspect_adjust_tolerance: f64,
    /// Flip horizontally and turn 90 degrees counter-clockwise after warping.
    pub orientation_fix: bool,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            mode: RectifyMode::Enhanced,
            min_output_side: 200,
            aspect_adjust_tolerance: 0.10,
            orientation_fix: false,
        }
    }
}

/// Outbound message pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Identical feedback text is suppressed for this long.
    pub repeat_interval_ms: u64,
    /// Minimum spacing of overlay region updates.
    pub overlay_interval_ms: u64,
    /// Caller view size used to map the overlay region; frame space when unset.
    pub view_size: Option<(u32, u32)>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            repeat_interval_ms: 2000,
            overlay_interval_ms: 50,
            view_size: None,
        }
    }
}

impl ScanConfig {
    // -- Persistence ----------------------------------------------------------

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        info!(path = %path.display(), "Scan configuration loaded");
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "Scan configuration saved");
        Ok(())
    }

    // -- Validation -----------------------------------------------------------

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(ScanError::Config(msg.to_string()));

        if self.stability.required_hits == 0 {
            return fail("stability.required_hits must be at least 1");
        }
        if self.stability.failure_threshold == 0 {
            return fail("stability.failure_threshold must be at least 1");
        }
        if self.preprocess.working_size == 0 {
            return fail("preprocess.working_size must be positive");
        }
        if !(0.0..=1.0).contains(&self.preprocess.region_coverage)
            || self.preprocess.region_coverage == 0.0
        {
            return fail("preprocess.region_coverage must be in (0, 1]");
        }
        if self.cascade.strategies.is_empty() {
            return fail("cascade.strategies must name at least one strategy");
        }
        if self.cascade.strategies.contains(&StrategyKind::Manual) {
            return fail("cascade.strategies cannot contain the manual strategy");
        }
        if (self.scoring.weight_sum() - 1.0).abs() > 1e-6 {
            return fail("scoring weights must sum to 1");
        }
        for strategy in StrategyKind::CASCADE {
            let limits = self.scoring.area_limits(strategy);
            if limits.min < 0.0 || limits.max > 1.0 || limits.min >= limits.max {
                return fail("scoring area limits must satisfy 0 <= min < max <= 1");
            }
        }
        if self.geometry.min_angle_deg >= self.geometry.max_angle_deg {
            return fail("geometry angle range is empty");
        }
        if self.blur.threshold <= 0.0 {
            return fail("blur.threshold must be positive");
        }
        if self.rectify.min_output_side == 0 {
            return fail("rectify.min_output_side must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScanConfig::default().validate().expect("defaults must validate");
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{ "stability": { "required_hits": 3 } }"#).unwrap();
        assert_eq!(config.stability.required_hits, 3);
        assert_eq!(config.stability.failure_threshold, 15);
        assert_eq!(config.gate.min_interval_ms, 100);
        assert_eq!(config.cascade.strategies.len(), 5);
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let mut config = ScanConfig::default();
        config.scoring.area_weight = 0.9;
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));
    }

    #[test]
    fn zero_required_hits_is_rejected() {
        let mut config = ScanConfig::default();
        config.stability.required_hits = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");

        let mut config = ScanConfig::default();
        config.rectify.mode = RectifyMode::Simple;
        config.feedback.view_size = Some((1080, 1920));
        config.save(&path).unwrap();

        let loaded = ScanConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn area_limits_are_inclusive() {
        let limits = AreaLimits::new(0.1, 0.9);
        assert!(limits.contains(0.1));
        assert!(limits.contains(0.9));
        assert!(!limits.contains(0.95));
    }
}
