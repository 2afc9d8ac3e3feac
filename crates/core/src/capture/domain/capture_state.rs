use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapturePhase {
    /// Camera not open yet, or the session was reset.
    Idle,
    Polling,
    /// Transient: the first ready poll, immediately followed by `Countdown`.
    Aligning,
    Countdown,
    Capturing,
    Uploading,
    Done,
    Failed,
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapturePhase::Idle => "idle",
            CapturePhase::Polling => "polling",
            CapturePhase::Aligning => "aligning",
            CapturePhase::Countdown => "countdown",
            CapturePhase::Capturing => "capturing",
            CapturePhase::Uploading => "uploading",
            CapturePhase::Done => "done",
            CapturePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why the last attempt did not move the session forward.
///
/// `NoFace` and `MultipleFaces` are transient and retried every poll;
/// the others need the manual path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NoFace,
    MultipleFaces,
    ModelUnavailable,
    CaptureUnavailable,
    UploadFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::NoFace => "no_face",
            FailureReason::MultipleFaces => "multiple_faces",
            FailureReason::ModelUnavailable => "model_unavailable",
            FailureReason::CaptureUnavailable => "capture_unavailable",
            FailureReason::UploadFailed => "upload_failed",
        };
        f.write_str(name)
    }
}

/// Observable state of one capture-screen visit.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureState {
    pub phase: CapturePhase,
    pub countdown_remaining: Option<u32>,
    pub has_captured: bool,
    pub last_failure_reason: Option<FailureReason>,
    pub guidance: String,
    pub auto_capture_enabled: bool,
    pub manual_capture_enabled: bool,
}

impl CaptureState {
    pub fn new() -> Self {
        Self {
            phase: CapturePhase::Idle,
            countdown_remaining: None,
            has_captured: false,
            last_failure_reason: None,
            guidance: String::new(),
            auto_capture_enabled: true,
            manual_capture_enabled: false,
        }
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new()
    }
}
