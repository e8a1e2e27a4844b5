// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory frame operations (rotate, crop, resize, flip, export).

pub mod processor;

pub use processor::ImageProcessor;
