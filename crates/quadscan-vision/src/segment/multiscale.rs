// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multi-scale edge strategy, the last resort of the cascade.

use quadscan_core::error::Result;
use quadscan_core::{Candidate, StrategyKind};
use tracing::debug;

use super::contour::candidates_from_mask;
use super::{Deadline, StrategyInput};
use crate::scan::edges::{DEFAULT_SCALES, multi_scale_edges, normalize_contrast};

const MIN_VOTE: f32 = 0.3;

pub fn multi_scale(input: &StrategyInput<'_>, deadline: &Deadline) -> Result<Vec<Candidate>> {
    let normalized = normalize_contrast(&input.working.gray);
    let edges = multi_scale_edges(&normalized, &DEFAULT_SCALES, MIN_VOTE);
    deadline.check()?;

    let candidates = candidates_from_mask(&edges, StrategyKind::MultiScaleEdges, 3, 0.10, 0.90, 0.02);
    debug!(count = candidates.len(), "Multi-scale candidates");
    Ok(candidates)
}
