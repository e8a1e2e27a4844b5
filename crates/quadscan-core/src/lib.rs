// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quadscan: Core types, configuration, and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod feedback;
pub mod types;

pub use config::ScanConfig;
pub use error::{Result, ScanError};
pub use feedback::FeedbackKind;
pub use types::*;
