// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Low-level image filters shared by the segmentation strategies:
// binarization, morphology, and edge maps.

pub mod binarize;
pub mod edges;
pub mod morphology;
