// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame admission. Frames are dropped, never queued: a frame is admitted
// only when no pipeline run is in flight, the gate is not paused, and the
// minimum interval since the last admitted frame has elapsed.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
struct GateState {
    busy: bool,
    paused: bool,
    last_admitted: Option<Duration>,
}

/// Single-flight admission control shared by the frame producer and the
/// worker.
#[derive(Debug)]
pub struct FrameGate {
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl FrameGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Admit a frame captured at `now` and mark the gate busy.
    ///
    /// A timestamp earlier than the last admitted one (a camera clock reset)
    /// counts as enough time elapsed.
    pub fn admit(&self, now: Duration) -> bool {
        let mut state = self.state.lock();
        if state.busy || state.paused {
            trace!(busy = state.busy, paused = state.paused, "Frame dropped");
            return false;
        }
        if let Some(last) = state.last_admitted {
            if let Some(elapsed) = now.checked_sub(last) {
                if elapsed < self.min_interval {
                    trace!(elapsed_ms = elapsed.as_millis() as u64, "Frame dropped: too soon");
                    return false;
                }
            }
        }
        state.busy = true;
        state.last_admitted = Some(now);
        true
    }

    /// Like [`FrameGate::admit`], returning a permit that releases the gate
    /// when dropped.
    pub fn try_admit(self: &Arc<Self>, now: Duration) -> Option<GatePermit> {
        self.admit(now).then(|| GatePermit {
            gate: Arc::clone(self),
        })
    }

    /// Mark the in-flight run finished.
    pub fn release(&self) {
        self.state.lock().busy = false;
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }
}

/// Proof of admission. Dropping it releases the gate, whether the run
/// finished, failed, or unwound.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<FrameGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
