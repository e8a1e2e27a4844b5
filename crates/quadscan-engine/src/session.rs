// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A running scan session: the frame gate on the producer side and a worker
// thread that owns the engine.
//
// The camera callback calls `push_frame` from whatever thread it runs on.
// Admitted frames travel to the worker together with their gate permit, so
// the gate reopens as soon as the worker is done with the frame. Commands go
// over a separate channel and are applied before the next frame.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use parking_lot::RwLock;
use quadscan_core::{DocumentKind, Frame, Result, ScanConfig, ScanError, SessionId};
use tracing::{debug, info, trace, warn};

use crate::engine::{EngineCommand, EngineSnapshot, ScanEngine};
use crate::events::ScanEvent;
use crate::gate::{FrameGate, GatePermit};

enum Control {
    Command(EngineCommand),
    Shutdown,
}

pub struct ScanSession {
    session: SessionId,
    gate: Arc<FrameGate>,
    frames: Sender<(Frame, GatePermit)>,
    control: Sender<Control>,
    events: Receiver<ScanEvent>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
    worker: Option<JoinHandle<()>>,
}

impl ScanSession {
    /// Validate `config` and start the worker thread.
    pub fn start(config: ScanConfig) -> Result<Self> {
        Self::with_engine(ScanEngine::new(config)?)
    }

    /// Start a session around an already configured engine.
    pub fn with_engine(engine: ScanEngine) -> Result<Self> {
        let session = engine.session_id();
        let gate = Arc::new(FrameGate::new(Duration::from_millis(
            engine.config().gate.min_interval_ms,
        )));
        let snapshot = Arc::new(RwLock::new(engine.snapshot()));

        // At most one frame is ever in flight, so a single slot suffices.
        let (frames, frames_rx) = bounded(1);
        let (control, control_rx) = unbounded();
        let (events_tx, events) = unbounded();

        let worker_snapshot = Arc::clone(&snapshot);
        let worker = std::thread::Builder::new()
            .name(format!("quadscan-{session}"))
            .spawn(move || {
                info!(%session, "Scan worker starting");
                run_worker(engine, frames_rx, control_rx, events_tx, worker_snapshot);
                info!(%session, "Scan worker exiting");
            })?;

        Ok(Self {
            session,
            gate,
            frames,
            control,
            events,
            snapshot,
            worker: Some(worker),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Offer a frame. Returns `false` when it was dropped: the pipeline is
    /// busy, the session is paused, the frame came too soon after the last
    /// admitted one, or the worker has stopped.
    pub fn push_frame(&self, frame: Frame) -> bool {
        let Some(permit) = self.gate.try_admit(frame.timestamp) else {
            return false;
        };
        // On failure the permit is dropped with the message, reopening the gate.
        match self.frames.try_send((frame, permit)) {
            Ok(()) => true,
            Err(_) => {
                trace!("Frame dropped: worker unavailable");
                false
            }
        }
    }

    /// Stop admitting frames. Detection state is kept.
    pub fn pause(&self) {
        self.gate.pause();
        debug!(session = %self.session, "Scan session paused");
    }

    pub fn resume(&self) {
        self.gate.resume();
        debug!(session = %self.session, "Scan session resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Whether a frame is currently being processed.
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn send_command(&self, command: EngineCommand) -> Result<()> {
        self.control
            .send(Control::Command(command))
            .map_err(|_| ScanError::SessionClosed)
    }

    pub fn set_document(&self, kind: DocumentKind) -> Result<()> {
        self.send_command(EngineCommand::for_document(kind))
    }

    pub fn submit_manual_crop(&self, points: [f64; 8], frame_width: u32, frame_height: u32) -> Result<()> {
        self.send_command(EngineCommand::SubmitManualCrop {
            points,
            frame_width,
            frame_height,
        })
    }

    /// Event stream. Disconnects once the worker has stopped and every
    /// event has been received.
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// State as of the last processed frame or command.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!(session = %self.session, "Scan worker panicked");
            }
            info!(session = %self.session, "Scan session stopped");
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
    }
}

// -- Worker -------------------------------------------------------------------

fn run_worker(
    mut engine: ScanEngine,
    frames: Receiver<(Frame, GatePermit)>,
    control: Receiver<Control>,
    mut events: Sender<ScanEvent>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
) {
    loop {
        select! {
            recv(control) -> msg => match msg {
                Ok(msg) => {
                    if !apply(&mut engine, msg, &mut events) {
                        break;
                    }
                    *snapshot.write() = engine.snapshot();
                }
                Err(_) => break,
            },
            recv(frames) -> msg => match msg {
                Ok((frame, permit)) => {
                    // Commands sent before this frame take effect first.
                    let mut running = true;
                    while let Ok(msg) = control.try_recv() {
                        running = apply(&mut engine, msg, &mut events);
                        if !running {
                            break;
                        }
                    }
                    if !running {
                        break;
                    }
                    let outcome = engine.process_frame(frame, &mut events);
                    trace!(?outcome, "Frame processed");
                    *snapshot.write() = engine.snapshot();
                    drop(permit);
                }
                Err(_) => break,
            },
        }
    }
}

/// Apply one control message. Returns `false` on shutdown.
fn apply(engine: &mut ScanEngine, msg: Control, events: &mut Sender<ScanEvent>) -> bool {
    match msg {
        Control::Command(command) => {
            if let Err(err) = engine.handle_command(command, events) {
                warn!(error = %err, "Engine command failed");
            }
            true
        }
        Control::Shutdown => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use image::{Rgb, RgbImage};
    use quadscan_core::Rotation;

    use super::*;

    fn document_frame(ms: u64) -> Frame {
        let image = RgbImage::from_fn(640, 480, |x, y| {
            let inside = (120..520).contains(&x) && (90..390).contains(&y);
            if !inside {
                Rgb([25, 25, 25])
            } else if x % 6 == 0 && y % 6 == 0 {
                Rgb([150, 150, 150])
            } else {
                Rgb([235, 235, 235])
            }
        });
        Frame::new(640, 480, image.into_raw(), Rotation::Deg0, Duration::from_millis(ms))
    }

    fn wait_idle(session: &ScanSession) {
        let start = Instant::now();
        while session.is_busy() {
            assert!(start.elapsed() < Duration::from_secs(60), "worker stuck");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn steady_frames_produce_acceptance() {
        let session = ScanSession::start(ScanConfig::default()).unwrap();
        for i in 0..5 {
            assert!(session.push_frame(document_frame(i * 100)));
            wait_idle(&session);
        }

        let accepted = session
            .events()
            .try_iter()
            .filter(|e| matches!(e, ScanEvent::DocumentAccepted { .. }))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(session.snapshot().frames_processed, 5);
        assert_eq!(session.snapshot().documents_accepted, 1);
    }

    #[test]
    fn frames_inside_interval_are_dropped() {
        let session = ScanSession::start(ScanConfig::default()).unwrap();
        assert!(session.push_frame(document_frame(1000)));
        assert!(!session.push_frame(document_frame(1000)));
        wait_idle(&session);
        assert!(!session.push_frame(document_frame(1050)));
        assert!(session.push_frame(document_frame(1100)));
    }

    #[test]
    fn paused_session_admits_nothing() {
        let session = ScanSession::start(ScanConfig::default()).unwrap();
        session.pause();
        assert!(session.is_paused());
        assert!(!session.push_frame(document_frame(0)));
        session.resume();
        assert!(session.push_frame(document_frame(0)));
    }

    #[test]
    fn commands_apply_before_next_frame() {
        let session = ScanSession::start(ScanConfig::default()).unwrap();
        session.set_document(DocumentKind::Passport).unwrap();
        assert!(session.push_frame(document_frame(0)));
        wait_idle(&session);

        let region = session.snapshot().region.unwrap();
        assert_eq!(region.label, DocumentKind::Passport.label());
    }

    #[test]
    fn shutdown_closes_event_stream() {
        let session = ScanSession::start(ScanConfig::default()).unwrap();
        assert!(session.is_running());
        let events = session.events().clone();
        session.push_frame(document_frame(0));
        session.shutdown();

        // Drains whatever was produced, then ends.
        let drained = events.iter().count();
        assert!(drained <= 3);
    }
}
