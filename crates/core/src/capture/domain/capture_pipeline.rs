use std::sync::Arc;
use std::time::Instant;

use crate::capture::domain::camera::Camera;
use crate::capture::domain::capture_event::{CaptureEvent, CaptureObserver, NavigationReason};
use crate::capture::domain::capture_policy::CapturePolicy;
use crate::capture::domain::capture_state::{CapturePhase, CaptureState, FailureReason};
use crate::capture::domain::snapshot_encoder::{CapturedArtifact, SnapshotEncoder};
use crate::detection::domain::face_detector::FaceDetector;
use crate::positioning::domain::position_evaluator::{
    PositionEvaluator, PositionVerdict, SizeStatus,
};
use crate::shared::constants::{
    MSG_CAMERA_UNAVAILABLE, MSG_CAPTURE_FAILED, MSG_DETECTION_UNAVAILABLE, MSG_UPLOAD_FAILED,
};
use crate::upload::domain::upload_adapter::{UploadAdapter, UploadDestination, UploadError};

/// What a poll tick did, so the owner of the timers knows whether to arm or
/// disarm the countdown ticker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not polling: wrong phase, auto-capture off, or already captured.
    Skipped,
    /// Evaluated, not ready, still polling.
    Waiting,
    CountdownStarted(u32),
    /// Still ready while the countdown runs.
    Holding,
    CountdownCancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// Tick arrived outside the countdown (stale timer).
    Ignored,
    Remaining(u32),
    /// Reached zero and the snapshot was taken; an upload is pending.
    Captured,
    CaptureFailed,
}

/// Work order for the uploader, detached from the pipeline so it can run
/// on another thread.
#[derive(Clone, Debug)]
pub struct UploadJob {
    /// Identifies the capture this upload belongs to; results for an older
    /// capture are dropped.
    pub attempt: u64,
    pub blob: Arc<[u8]>,
    pub content_type: &'static str,
    pub destination: UploadDestination,
}

/// Session-scoped face auto-capture state machine.
///
/// `Idle → Polling → Aligning → Countdown → Capturing → Uploading → Done`,
/// with `Failed` reachable from `Capturing` and `Uploading`. All failures
/// are folded into [`CaptureState`]; no method returns an error.
pub struct CapturePipeline {
    camera: Box<dyn Camera>,
    detector: Option<Box<dyn FaceDetector>>,
    encoder: Box<dyn SnapshotEncoder>,
    evaluator: PositionEvaluator,
    policy: CapturePolicy,
    destination: UploadDestination,
    observers: Vec<Box<dyn CaptureObserver>>,
    state: CaptureState,
    artifact: Option<CapturedArtifact>,
    camera_open: bool,
    navigated: bool,
    attempt: u64,
}

impl CapturePipeline {
    /// `detector` is `None` when face detection could not be initialized;
    /// the session then runs in degraded, manual-only mode.
    pub fn new(
        camera: Box<dyn Camera>,
        detector: Option<Box<dyn FaceDetector>>,
        encoder: Box<dyn SnapshotEncoder>,
        destination: UploadDestination,
        policy: CapturePolicy,
    ) -> Self {
        let mut state = CaptureState::new();
        state.auto_capture_enabled = detector.is_some();
        Self {
            camera,
            detector,
            encoder,
            evaluator: PositionEvaluator::new(policy.thresholds),
            policy,
            destination,
            observers: Vec::new(),
            state,
            artifact: None,
            camera_open: false,
            navigated: false,
            attempt: 0,
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn CaptureObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn CaptureObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn phase(&self) -> CapturePhase {
        self.state.phase
    }

    pub fn artifact(&self) -> Option<&CapturedArtifact> {
        self.artifact.as_ref()
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    pub fn is_degraded(&self) -> bool {
        self.detector.is_none()
    }

    pub fn has_navigated(&self) -> bool {
        self.navigated
    }

    /// True when the user may continue even though the upload failed.
    pub fn can_proceed(&self) -> bool {
        !self.navigated
            && self.state.phase == CapturePhase::Failed
            && self.state.last_failure_reason == Some(FailureReason::UploadFailed)
            && self.artifact.is_some()
    }

    /// Opens the camera and starts polling. Returns whether the camera is open.
    pub fn open_camera(&mut self) -> bool {
        if self.state.phase != CapturePhase::Idle {
            return self.camera_open;
        }
        if !self.camera_open {
            if let Err(e) = self.camera.open() {
                log::warn!("Camera failed to open: {e}");
                self.state.last_failure_reason = Some(FailureReason::CaptureUnavailable);
                self.set_guidance(MSG_CAMERA_UNAVAILABLE);
                self.emit(CaptureEvent::Failed(FailureReason::CaptureUnavailable));
                return false;
            }
            self.camera_open = true;
        }

        self.transition(CapturePhase::Polling);
        if self.detector.is_none() {
            self.state.auto_capture_enabled = false;
            self.state.manual_capture_enabled = true;
            self.state.last_failure_reason = Some(FailureReason::ModelUnavailable);
            self.set_guidance(MSG_DETECTION_UNAVAILABLE);
            self.emit(CaptureEvent::Failed(FailureReason::ModelUnavailable));
        } else {
            self.state.last_failure_reason = None;
        }
        true
    }

    /// One poll tick: grab, detect, evaluate, advance.
    pub fn poll(&mut self) -> PollOutcome {
        let polling = matches!(
            self.state.phase,
            CapturePhase::Polling | CapturePhase::Countdown
        );
        if !polling || !self.state.auto_capture_enabled || self.state.has_captured {
            return PollOutcome::Skipped;
        }
        let verdict = match self.evaluate_current_frame() {
            Some(verdict) => verdict,
            None => return PollOutcome::Skipped,
        };
        self.apply_verdict(&verdict)
    }

    /// One countdown tick. At zero the automatic capture runs.
    pub fn countdown_tick(&mut self) -> CountdownOutcome {
        if self.state.phase != CapturePhase::Countdown {
            return CountdownOutcome::Ignored;
        }
        let remaining = self.state.countdown_remaining.unwrap_or(1).saturating_sub(1);
        self.emit(CaptureEvent::CountdownTick(remaining));
        if remaining > 0 {
            self.state.countdown_remaining = Some(remaining);
            return CountdownOutcome::Remaining(remaining);
        }

        self.state.countdown_remaining = None;
        if self.capture() {
            CountdownOutcome::Captured
        } else {
            CountdownOutcome::CaptureFailed
        }
    }

    /// User-initiated "Capture Photo". Skips position validation entirely.
    pub fn manual_capture(&mut self) -> bool {
        let busy = matches!(
            self.state.phase,
            CapturePhase::Idle | CapturePhase::Capturing | CapturePhase::Uploading | CapturePhase::Done
        );
        if !self.state.manual_capture_enabled || self.state.has_captured || busy {
            log::debug!(
                "Manual capture ignored in phase {} (enabled: {})",
                self.state.phase,
                self.state.manual_capture_enabled
            );
            return false;
        }
        log::info!("Manual capture requested");
        self.capture()
    }

    /// The pending upload, if the pipeline is waiting for one.
    pub fn begin_upload(&self) -> Option<UploadJob> {
        if self.state.phase != CapturePhase::Uploading {
            return None;
        }
        self.artifact.as_ref().map(|artifact| UploadJob {
            attempt: self.attempt,
            blob: artifact.image_blob.clone(),
            content_type: artifact.content_type,
            destination: self.destination.clone(),
        })
    }

    /// Applies an upload result. Results for an abandoned capture are ignored.
    pub fn complete_upload(&mut self, attempt: u64, result: Result<(), UploadError>) {
        if self.state.phase != CapturePhase::Uploading || attempt != self.attempt {
            log::debug!("Discarding stale upload result for capture #{attempt}");
            return;
        }
        match result {
            Ok(()) => {
                self.emit(CaptureEvent::Uploaded);
                self.transition(CapturePhase::Done);
                self.navigate(NavigationReason::Captured);
            }
            Err(e) => {
                log::warn!("Upload failed: {e}");
                self.fail(FailureReason::UploadFailed, MSG_UPLOAD_FAILED);
            }
        }
    }

    /// Runs the pending upload on the calling thread.
    pub fn upload_with(&mut self, uploader: &dyn UploadAdapter) {
        if let Some(job) = self.begin_upload() {
            let start = Instant::now();
            let result = uploader.upload(&job.blob, job.content_type, &job.destination);
            self.record_timing("upload", start.elapsed().as_secs_f64() * 1000.0);
            self.complete_upload(job.attempt, result);
        }
    }

    /// Continue with the locally kept photo after an upload failure.
    pub fn proceed(&mut self) -> bool {
        if !self.can_proceed() {
            return false;
        }
        self.navigate(NavigationReason::ProceededAfterUploadFailure)
    }

    /// Leave the screen without a photo, when the policy allows it.
    pub fn skip(&mut self) -> bool {
        if !self.policy.allow_skip || self.navigated {
            return false;
        }
        self.cancel_countdown();
        self.state.auto_capture_enabled = false;
        self.navigate(NavigationReason::Skipped)
    }

    /// Discards the photo and restarts at `Idle`. Call [`open_camera`]
    /// afterwards to resume polling.
    ///
    /// [`open_camera`]: CapturePipeline::open_camera
    pub fn recapture(&mut self) -> bool {
        if !self.policy.allow_recapture
            || self.navigated
            || self.state.phase == CapturePhase::Capturing
        {
            return false;
        }
        log::info!("Recapture requested, discarding current photo");
        self.artifact = None;
        self.state.has_captured = false;
        self.state.countdown_remaining = None;
        self.state.manual_capture_enabled = false;
        self.state.auto_capture_enabled = self.detector.is_some();
        self.state.last_failure_reason = None;
        self.state.guidance.clear();
        self.transition(CapturePhase::Idle);
        true
    }

    /// Releases the camera and flushes observers. The pipeline is unusable
    /// for automatic capture afterwards.
    pub fn close(&mut self) {
        if self.camera_open {
            self.camera.close();
            self.camera_open = false;
        }
        for observer in &self.observers {
            observer.summary();
        }
    }

    pub fn record_timing(&mut self, stage: &'static str, duration_ms: f64) {
        self.emit(CaptureEvent::Timing { stage, duration_ms });
    }

    // ── internals ───────────────────────────────────────────────────

    fn evaluate_current_frame(&mut self) -> Option<PositionVerdict> {
        let frame = match self.camera.grab_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::debug!("No camera frame available for this poll");
                return Some(not_detected());
            }
            Err(e) => {
                log::warn!("Camera frame grab failed: {e}");
                return Some(not_detected());
            }
        };

        let detector = self.detector.as_mut()?;
        let start = Instant::now();
        let faces = match detector.detect(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Face detection failed on frame {}: {e}", frame.sequence());
                Vec::new()
            }
        };
        self.record_timing("detect", start.elapsed().as_secs_f64() * 1000.0);

        let verdict =
            self.evaluator
                .evaluate(&faces, frame.width(), frame.height(), self.policy.mirrored);
        log::debug!(
            "Frame {}: {} face(s), ready={}, \"{}\"",
            frame.sequence(),
            faces.len(),
            verdict.ready_for_capture,
            verdict.message
        );
        Some(verdict)
    }

    fn apply_verdict(&mut self, verdict: &PositionVerdict) -> PollOutcome {
        self.set_guidance(&verdict.message);

        if verdict.ready_for_capture {
            self.state.last_failure_reason = None;
            return match self.state.phase {
                CapturePhase::Polling => {
                    self.transition(CapturePhase::Aligning);
                    let secs = self.policy.countdown_secs.max(1);
                    self.state.countdown_remaining = Some(secs);
                    self.transition(CapturePhase::Countdown);
                    self.emit(CaptureEvent::CountdownStarted(secs));
                    PollOutcome::CountdownStarted(secs)
                }
                _ => PollOutcome::Holding,
            };
        }

        self.state.last_failure_reason = if !verdict.detected {
            Some(FailureReason::NoFace)
        } else if verdict.size_status == Some(SizeStatus::Multiple) {
            Some(FailureReason::MultipleFaces)
        } else {
            None
        };

        if self.state.phase == CapturePhase::Countdown {
            self.cancel_countdown();
            PollOutcome::CountdownCancelled
        } else {
            PollOutcome::Waiting
        }
    }

    fn cancel_countdown(&mut self) {
        if self.state.phase != CapturePhase::Countdown {
            return;
        }
        log::info!("Face alignment lost, countdown cancelled");
        self.state.countdown_remaining = None;
        self.emit(CaptureEvent::CountdownCancelled);
        self.transition(CapturePhase::Polling);
    }

    fn capture(&mut self) -> bool {
        self.transition(CapturePhase::Capturing);

        let frame = match self.camera.grab_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::warn!("Capture failed: camera returned no frame");
                self.fail(FailureReason::CaptureUnavailable, MSG_CAPTURE_FAILED);
                return false;
            }
            Err(e) => {
                log::warn!("Capture failed: {e}");
                self.fail(FailureReason::CaptureUnavailable, MSG_CAPTURE_FAILED);
                return false;
            }
        };

        let start = Instant::now();
        let encoded = self.encoder.encode(&frame);
        self.record_timing("encode", start.elapsed().as_secs_f64() * 1000.0);
        match encoded {
            Ok(artifact) => {
                self.attempt += 1;
                log::info!(
                    "Captured frame {} ({} bytes), preview at {}",
                    frame.sequence(),
                    artifact.image_blob.len(),
                    artifact.preview_url
                );
                self.state.has_captured = true;
                self.state.manual_capture_enabled = false;
                self.state.last_failure_reason = None;
                self.emit(CaptureEvent::Captured(artifact.clone()));
                self.artifact = Some(artifact);
                self.transition(CapturePhase::Uploading);
                true
            }
            Err(e) => {
                log::warn!("Snapshot encoding failed: {e}");
                self.fail(FailureReason::CaptureUnavailable, MSG_CAPTURE_FAILED);
                false
            }
        }
    }

    fn fail(&mut self, reason: FailureReason, message: &str) {
        self.state.last_failure_reason = Some(reason);
        self.state.countdown_remaining = None;
        self.state.auto_capture_enabled = false;
        // A kept photo must not be replaced by a second one.
        self.state.manual_capture_enabled = !self.state.has_captured;
        self.set_guidance(message);
        self.emit(CaptureEvent::Failed(reason));
        self.transition(CapturePhase::Failed);
    }

    fn navigate(&mut self, reason: NavigationReason) -> bool {
        if self.navigated {
            return false;
        }
        self.navigated = true;
        log::info!("Capture screen finished: {reason:?}");
        self.emit(CaptureEvent::NavigateForward(reason));
        true
    }

    fn set_guidance(&mut self, message: &str) {
        if self.state.guidance != message {
            self.state.guidance = message.to_string();
            self.emit(CaptureEvent::Guidance(message.to_string()));
        }
    }

    fn transition(&mut self, to: CapturePhase) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        log::debug!("Capture phase: {from} -> {to}");
        self.state.phase = to;
        self.emit(CaptureEvent::PhaseChanged { from, to });
    }

    fn emit(&mut self, event: CaptureEvent) {
        for observer in self.observers.iter_mut() {
            observer.on_event(&event);
        }
    }
}

fn not_detected() -> PositionVerdict {
    PositionEvaluator::default().evaluate(&[], 0, 0, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::MSG_NO_FACE;
    use crate::shared::face_box::FaceBox;
    use crate::shared::frame::Frame;
    use std::sync::Mutex;

    const W: u32 = 64;
    const H: u32 = 48;

    // --- Stubs ---

    struct StubCamera {
        open_fails: bool,
        frames_available: Arc<Mutex<bool>>,
        grabs: usize,
    }

    impl StubCamera {
        fn new() -> Self {
            Self {
                open_fails: false,
                frames_available: Arc::new(Mutex::new(true)),
                grabs: 0,
            }
        }
    }

    impl Camera for StubCamera {
        fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            if self.open_fails {
                Err("permission denied".into())
            } else {
                Ok(())
            }
        }

        fn grab_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            if !*self.frames_available.lock().unwrap() {
                return Ok(None);
            }
            self.grabs += 1;
            Ok(Some(Frame::new(vec![90; (W * H * 3) as usize], W, H, 3, self.grabs)))
        }
    }

    /// Returns whatever face list is currently scripted.
    struct ScriptedDetector {
        faces: Arc<Mutex<Vec<FaceBox>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.faces.lock().unwrap().clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            Err("inference failed".into())
        }
    }

    struct StubEncoder {
        fail: bool,
        encoded: Arc<Mutex<usize>>,
    }

    impl SnapshotEncoder for StubEncoder {
        fn encode(&mut self, frame: &Frame) -> Result<CapturedArtifact, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("encoder broken".into());
            }
            *self.encoded.lock().unwrap() += 1;
            Ok(CapturedArtifact {
                image_blob: Arc::from(&b"jpeg"[..]),
                content_type: "image/jpeg",
                preview_url: format!("memory://frame-{}", frame.sequence()),
            })
        }
    }

    struct StubUploader {
        status: Option<u16>,
        calls: Mutex<Vec<UploadDestination>>,
    }

    impl StubUploader {
        fn ok() -> Self {
            Self {
                status: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                status: Some(status),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl UploadAdapter for StubUploader {
        fn upload(
            &self,
            _blob: &[u8],
            _content_type: &str,
            destination: &UploadDestination,
        ) -> Result<(), UploadError> {
            self.calls.lock().unwrap().push(destination.clone());
            match self.status {
                None => Ok(()),
                Some(status) => Err(UploadError::Status {
                    url: destination.url.clone(),
                    status,
                }),
            }
        }
    }

    struct RecordingObserver {
        events: Arc<Mutex<Vec<CaptureEvent>>>,
    }

    impl CaptureObserver for RecordingObserver {
        fn on_event(&mut self, event: &CaptureEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    // --- Harness ---

    struct Harness {
        pipeline: CapturePipeline,
        faces: Arc<Mutex<Vec<FaceBox>>>,
        detect_calls: Arc<Mutex<usize>>,
        frames_available: Arc<Mutex<bool>>,
        encoded: Arc<Mutex<usize>>,
        events: Arc<Mutex<Vec<CaptureEvent>>>,
    }

    impl Harness {
        fn set_faces(&self, faces: Vec<FaceBox>) {
            *self.faces.lock().unwrap() = faces;
        }

        fn navigations(&self) -> Vec<NavigationReason> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    CaptureEvent::NavigateForward(reason) => Some(*reason),
                    _ => None,
                })
                .collect()
        }

        fn phases_entered(&self) -> Vec<CapturePhase> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    CaptureEvent::PhaseChanged { to, .. } => Some(*to),
                    _ => None,
                })
                .collect()
        }
    }

    fn harness_with(policy: CapturePolicy, with_detector: bool, encoder_fails: bool) -> Harness {
        let camera = StubCamera::new();
        let frames_available = camera.frames_available.clone();
        let faces = Arc::new(Mutex::new(Vec::new()));
        let detect_calls = Arc::new(Mutex::new(0));
        let detector: Option<Box<dyn FaceDetector>> = if with_detector {
            Some(Box::new(ScriptedDetector {
                faces: faces.clone(),
                calls: detect_calls.clone(),
            }))
        } else {
            None
        };
        let encoded = Arc::new(Mutex::new(0));
        let events = Arc::new(Mutex::new(Vec::new()));
        let pipeline = CapturePipeline::new(
            Box::new(camera),
            detector,
            Box::new(StubEncoder {
                fail: encoder_fails,
                encoded: encoded.clone(),
            }),
            UploadDestination::new("https://uploads.example.com/").with_field("key", "k"),
            policy,
        )
        .with_observer(Box::new(RecordingObserver {
            events: events.clone(),
        }));
        Harness {
            pipeline,
            faces,
            detect_calls,
            frames_available,
            encoded,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(CapturePolicy::identity_check(), true, false)
    }

    fn ready_face() -> FaceBox {
        // 0.3W wide, centered.
        FaceBox::new(0.35 * W as f64, 0.35 * H as f64, 0.3 * W as f64, 0.3 * H as f64)
    }

    fn small_face() -> FaceBox {
        FaceBox::new(0.45 * W as f64, 0.45 * H as f64, 0.1 * W as f64, 0.1 * H as f64)
    }

    /// Runs the countdown to zero.
    fn finish_countdown(h: &mut Harness) -> CountdownOutcome {
        let mut outcome = CountdownOutcome::Ignored;
        for _ in 0..h.pipeline.policy().countdown_secs {
            outcome = h.pipeline.countdown_tick();
        }
        outcome
    }

    // --- Camera / Idle ---

    #[test]
    fn test_starts_idle_and_polls_after_camera_opens() {
        let mut h = harness();
        assert_eq!(h.pipeline.phase(), CapturePhase::Idle);
        assert_eq!(h.pipeline.poll(), PollOutcome::Skipped);
        assert!(h.pipeline.open_camera());
        assert_eq!(h.pipeline.phase(), CapturePhase::Polling);
    }

    #[test]
    fn test_camera_open_failure_stays_idle() {
        let mut camera = StubCamera::new();
        camera.open_fails = true;
        let mut pipeline = CapturePipeline::new(
            Box::new(camera),
            None,
            Box::new(StubEncoder {
                fail: false,
                encoded: Arc::new(Mutex::new(0)),
            }),
            UploadDestination::new("http://x"),
            CapturePolicy::default(),
        );
        assert!(!pipeline.open_camera());
        assert_eq!(pipeline.phase(), CapturePhase::Idle);
        assert_eq!(
            pipeline.state().last_failure_reason,
            Some(FailureReason::CaptureUnavailable)
        );
        assert!(!pipeline.manual_capture());
    }

    // --- Polling ---

    #[test]
    fn test_not_ready_stays_polling_with_guidance() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![small_face()]);
        for _ in 0..10 {
            assert_eq!(h.pipeline.poll(), PollOutcome::Waiting);
        }
        assert_eq!(h.pipeline.phase(), CapturePhase::Polling);
        assert_eq!(h.pipeline.state().countdown_remaining, None);
        assert!(h.pipeline.state().guidance.contains("Move closer"));
    }

    #[test]
    fn test_no_face_and_multiple_faces_are_transient_reasons() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.pipeline.poll();
        assert_eq!(h.pipeline.state().last_failure_reason, Some(FailureReason::NoFace));

        h.set_faces(vec![ready_face(), ready_face()]);
        h.pipeline.poll();
        assert_eq!(
            h.pipeline.state().last_failure_reason,
            Some(FailureReason::MultipleFaces)
        );
        assert_eq!(h.pipeline.phase(), CapturePhase::Polling);
    }

    #[test]
    fn test_detector_error_counts_as_no_face() {
        let mut pipeline = CapturePipeline::new(
            Box::new(StubCamera::new()),
            Some(Box::new(FailingDetector)),
            Box::new(StubEncoder {
                fail: false,
                encoded: Arc::new(Mutex::new(0)),
            }),
            UploadDestination::new("http://x"),
            CapturePolicy::default(),
        );
        pipeline.open_camera();
        assert_eq!(pipeline.poll(), PollOutcome::Waiting);
        assert_eq!(pipeline.state().guidance, MSG_NO_FACE);
    }

    #[test]
    fn test_ready_poll_passes_through_aligning_into_countdown() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        assert_eq!(h.pipeline.poll(), PollOutcome::CountdownStarted(3));
        assert_eq!(h.pipeline.phase(), CapturePhase::Countdown);
        assert_eq!(h.pipeline.state().countdown_remaining, Some(3));
        assert_eq!(h.pipeline.state().guidance, "Perfect!");
        let phases = h.phases_entered();
        assert_eq!(
            phases,
            vec![
                CapturePhase::Polling,
                CapturePhase::Aligning,
                CapturePhase::Countdown
            ]
        );
    }

    // --- Countdown ---

    #[test]
    fn test_countdown_reaches_capture_while_ready() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();

        assert_eq!(h.pipeline.countdown_tick(), CountdownOutcome::Remaining(2));
        assert_eq!(h.pipeline.poll(), PollOutcome::Holding);
        assert_eq!(h.pipeline.countdown_tick(), CountdownOutcome::Remaining(1));
        assert_eq!(h.pipeline.poll(), PollOutcome::Holding);
        assert_eq!(h.pipeline.countdown_tick(), CountdownOutcome::Captured);

        assert_eq!(h.pipeline.phase(), CapturePhase::Uploading);
        assert!(h.pipeline.state().has_captured);
        assert!(h.pipeline.artifact().is_some());
    }

    #[test]
    fn test_single_misaligned_poll_cancels_countdown() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        h.pipeline.countdown_tick();

        h.set_faces(vec![small_face()]);
        assert_eq!(h.pipeline.poll(), PollOutcome::CountdownCancelled);
        assert_eq!(h.pipeline.phase(), CapturePhase::Polling);
        assert_eq!(h.pipeline.state().countdown_remaining, None);

        // A late countdown tick must not resume the old countdown.
        assert_eq!(h.pipeline.countdown_tick(), CountdownOutcome::Ignored);

        // Realigning starts over from the full count.
        h.set_faces(vec![ready_face()]);
        assert_eq!(h.pipeline.poll(), PollOutcome::CountdownStarted(3));
    }

    #[test]
    fn test_missing_frame_during_countdown_cancels() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        *h.frames_available.lock().unwrap() = false;
        assert_eq!(h.pipeline.poll(), PollOutcome::CountdownCancelled);
    }

    #[test]
    fn test_custom_countdown_length() {
        let mut h = harness_with(
            CapturePolicy::identity_check().with_countdown_secs(1),
            true,
            false,
        );
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        assert_eq!(h.pipeline.poll(), PollOutcome::CountdownStarted(1));
        assert_eq!(h.pipeline.countdown_tick(), CountdownOutcome::Captured);
    }

    // --- Capture idempotence ---

    #[test]
    fn test_captured_session_ignores_further_ready_polls() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        finish_countdown(&mut h);
        let detect_calls = *h.detect_calls.lock().unwrap();

        for _ in 0..5 {
            assert_eq!(h.pipeline.poll(), PollOutcome::Skipped);
            assert_eq!(h.pipeline.countdown_tick(), CountdownOutcome::Ignored);
        }
        assert_eq!(*h.encoded.lock().unwrap(), 1);
        assert_eq!(*h.detect_calls.lock().unwrap(), detect_calls);
        assert!(!h.pipeline.manual_capture());
    }

    #[test]
    fn test_encoder_failure_enters_failed_with_manual_capture() {
        let mut h = harness_with(CapturePolicy::identity_check(), true, true);
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        assert_eq!(finish_countdown(&mut h), CountdownOutcome::CaptureFailed);

        let state = h.pipeline.state();
        assert_eq!(state.phase, CapturePhase::Failed);
        assert_eq!(state.last_failure_reason, Some(FailureReason::CaptureUnavailable));
        assert!(!state.auto_capture_enabled);
        assert!(state.manual_capture_enabled);
        assert!(!state.has_captured);
        assert_eq!(h.pipeline.poll(), PollOutcome::Skipped);
    }

    #[test]
    fn test_manual_capture_after_frame_loss_recovers() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        h.pipeline.countdown_tick();
        h.pipeline.countdown_tick();
        *h.frames_available.lock().unwrap() = false;
        assert_eq!(h.pipeline.countdown_tick(), CountdownOutcome::CaptureFailed);
        assert_eq!(h.pipeline.phase(), CapturePhase::Failed);

        *h.frames_available.lock().unwrap() = true;
        // Position no longer matters on the manual path.
        h.set_faces(vec![]);
        assert!(h.pipeline.manual_capture());
        assert_eq!(h.pipeline.phase(), CapturePhase::Uploading);
    }

    // --- Degraded mode ---

    #[test]
    fn test_degraded_mode_enables_manual_capture_immediately() {
        let mut h = harness_with(CapturePolicy::identity_check(), false, false);
        assert!(h.pipeline.is_degraded());
        h.pipeline.open_camera();

        let state = h.pipeline.state();
        assert_eq!(state.phase, CapturePhase::Polling);
        assert!(state.manual_capture_enabled);
        assert!(!state.auto_capture_enabled);
        assert_eq!(state.last_failure_reason, Some(FailureReason::ModelUnavailable));
        assert_eq!(state.guidance, "Face detection unavailable");
        assert_eq!(h.pipeline.poll(), PollOutcome::Skipped);

        assert!(h.pipeline.manual_capture());
        assert_eq!(h.pipeline.phase(), CapturePhase::Uploading);
        assert_eq!(*h.detect_calls.lock().unwrap(), 0);
    }

    // --- Upload ---

    #[test]
    fn test_upload_success_navigates_once() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        finish_countdown(&mut h);

        let uploader = StubUploader::ok();
        h.pipeline.upload_with(&uploader);
        h.pipeline.upload_with(&uploader);

        assert_eq!(h.pipeline.phase(), CapturePhase::Done);
        assert_eq!(uploader.calls.lock().unwrap().len(), 1);
        assert_eq!(
            uploader.calls.lock().unwrap()[0].fields,
            vec![("key".to_string(), "k".to_string())]
        );
        assert_eq!(h.navigations(), vec![NavigationReason::Captured]);
    }

    #[test]
    fn test_upload_failure_keeps_artifact_and_allows_proceeding() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        finish_countdown(&mut h);

        h.pipeline.upload_with(&StubUploader::failing(500));
        let state = h.pipeline.state();
        assert_eq!(state.phase, CapturePhase::Failed);
        assert_eq!(state.last_failure_reason, Some(FailureReason::UploadFailed));
        assert!(state.has_captured);
        assert!(!state.manual_capture_enabled);
        assert!(h.pipeline.artifact().is_some());
        assert!(h.navigations().is_empty());

        assert!(h.pipeline.can_proceed());
        assert!(h.pipeline.proceed());
        assert!(!h.pipeline.proceed());
        assert_eq!(
            h.navigations(),
            vec![NavigationReason::ProceededAfterUploadFailure]
        );
    }

    #[test]
    fn test_stale_upload_result_is_ignored() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        finish_countdown(&mut h);
        let job = h.pipeline.begin_upload().unwrap();

        h.pipeline.complete_upload(job.attempt + 1, Ok(()));
        assert_eq!(h.pipeline.phase(), CapturePhase::Uploading);
        h.pipeline.complete_upload(job.attempt, Ok(()));
        assert_eq!(h.pipeline.phase(), CapturePhase::Done);
    }

    // --- Recapture / skip ---

    #[test]
    fn test_recapture_resets_to_idle_and_allows_second_capture() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![ready_face()]);
        h.pipeline.poll();
        finish_countdown(&mut h);
        h.pipeline.upload_with(&StubUploader::failing(503));

        assert!(h.pipeline.recapture());
        assert_eq!(h.pipeline.phase(), CapturePhase::Idle);
        assert!(h.pipeline.artifact().is_none());
        assert!(!h.pipeline.state().has_captured);
        assert!(h.pipeline.state().auto_capture_enabled);

        h.pipeline.open_camera();
        h.pipeline.poll();
        assert_eq!(finish_countdown(&mut h), CountdownOutcome::Captured);
        assert_eq!(*h.encoded.lock().unwrap(), 2);
    }

    #[test]
    fn test_recapture_refused_by_policy() {
        let mut h = harness_with(CapturePolicy::proctoring_snapshot(), true, false);
        h.pipeline.open_camera();
        assert!(!h.pipeline.recapture());
        assert_eq!(h.pipeline.phase(), CapturePhase::Polling);
    }

    #[test]
    fn test_skip_requires_policy() {
        let mut identity = harness();
        identity.pipeline.open_camera();
        assert!(!identity.pipeline.skip());
        assert!(identity.navigations().is_empty());

        let mut proctoring = harness_with(CapturePolicy::proctoring_snapshot(), true, false);
        proctoring.pipeline.open_camera();
        proctoring.set_faces(vec![ready_face()]);
        proctoring.pipeline.poll();
        assert!(proctoring.pipeline.skip());
        assert_eq!(proctoring.pipeline.phase(), CapturePhase::Polling);
        assert_eq!(proctoring.pipeline.poll(), PollOutcome::Skipped);
        assert_eq!(proctoring.navigations(), vec![NavigationReason::Skipped]);
    }

    #[test]
    fn test_guidance_events_only_on_change() {
        let mut h = harness();
        h.pipeline.open_camera();
        h.set_faces(vec![small_face()]);
        h.pipeline.poll();
        h.pipeline.poll();
        h.pipeline.poll();
        let guidance_events = h
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, CaptureEvent::Guidance(_)))
            .count();
        assert_eq!(guidance_events, 1);
    }
}
