// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quadscan-engine: stateful side of the document scanner.
//
// Frame admission, temporal stability tracking, feedback pacing, the
// per-frame orchestrator, and the worker-thread session that drives it.

pub mod debounce;
pub mod engine;
pub mod events;
pub mod gate;
pub mod region;
pub mod session;
pub mod tracker;

pub use engine::{EngineCommand, EngineSnapshot, FrameOutcome, ScanEngine};
pub use events::{EventSink, ScanEvent};
pub use gate::FrameGate;
pub use session::ScanSession;
pub use tracker::StabilityTracker;
