use crate::capture::domain::capture_state::{CapturePhase, FailureReason};
use crate::capture::domain::snapshot_encoder::CapturedArtifact;

/// Why the capture screen hands control back to the wizard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationReason {
    Captured,
    /// Upload failed but the user chose to continue with the local photo.
    ProceededAfterUploadFailure,
    Skipped,
}

/// Everything the pipeline reports to the screen around it.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    PhaseChanged { from: CapturePhase, to: CapturePhase },
    Guidance(String),
    CountdownStarted(u32),
    CountdownTick(u32),
    CountdownCancelled,
    Captured(CapturedArtifact),
    Uploaded,
    Failed(FailureReason),
    NavigateForward(NavigationReason),
    Timing { stage: &'static str, duration_ms: f64 },
}

/// Receives pipeline events.
///
/// Decouples the state machine from how the surrounding screen renders
/// guidance, logs, or routes navigation.
pub trait CaptureObserver: Send {
    fn on_event(&mut self, event: &CaptureEvent);

    /// Called once when the session closes. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events. Used when nobody listens and in tests.
pub struct NullCaptureObserver;

impl CaptureObserver for NullCaptureObserver {
    fn on_event(&mut self, _event: &CaptureEvent) {}
}

/// Forwards events to another thread.
impl CaptureObserver for crossbeam_channel::Sender<CaptureEvent> {
    fn on_event(&mut self, event: &CaptureEvent) {
        // The receiving side may already be gone after teardown.
        let _ = self.send(event.clone());
    }
}
