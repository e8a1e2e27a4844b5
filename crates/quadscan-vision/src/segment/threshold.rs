// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fast threshold strategy: Otsu, largest outer contour, exact quadrilateral.

use quadscan_core::error::Result;
use quadscan_core::{Candidate, StrategyKind};
use tracing::debug;

use super::contour::{approximate, describe, external_contours, fit_quad, largest_first};
use super::{Deadline, StrategyInput};
use crate::scan::binarize::otsu_binarize;

/// Perimeter fraction used for polygon approximation.
const APPROX_FRACTION: f64 = 0.04;

/// Cheapest strategy. Only succeeds when the largest bright blob is already a
/// clean four-sided polygon.
pub fn fast_threshold(input: &StrategyInput<'_>, deadline: &Deadline) -> Result<Vec<Candidate>> {
    let (threshold, mask) = otsu_binarize(&input.working.gray);
    deadline.check()?;

    let Some((area, contour)) = largest_first(external_contours(&mask)).into_iter().next() else {
        return Ok(Vec::new());
    };
    let fraction = area / input.working.area();
    if fraction < input.cascade.fast_min_area_fraction {
        debug!(threshold, fraction, "Largest Otsu contour too small");
        return Ok(Vec::new());
    }

    let approx = approximate(&contour, APPROX_FRACTION);
    if approx.len() != 4 {
        debug!(threshold, vertices = approx.len(), "Otsu contour is not a quadrilateral");
        return Ok(Vec::new());
    }

    let quad = fit_quad(&contour, &approx, APPROX_FRACTION);
    Ok(vec![describe(&contour, &approx, quad, StrategyKind::FastThreshold)])
}
