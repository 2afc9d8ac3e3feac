use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{never, select_biased, tick, unbounded, Receiver, Sender};

use crate::capture::domain::capture_event::CaptureEvent;
use crate::capture::domain::capture_pipeline::{
    CapturePipeline, CountdownOutcome, PollOutcome, UploadJob,
};
use crate::upload::domain::upload_adapter::{UploadAdapter, UploadError};

/// User actions forwarded from the capture screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionCommand {
    ManualCapture,
    Recapture,
    Skip,
    Proceed,
    Stop,
}

struct UploadReport {
    attempt: u64,
    result: Result<(), UploadError>,
    duration_ms: f64,
}

/// What woke the session thread up.
enum Wake {
    Command(Option<SessionCommand>),
    Poll,
    Countdown,
    Upload(Option<UploadReport>),
}

/// Drives a [`CapturePipeline`] in real time on a dedicated thread.
///
/// Layout: `poll ticker + countdown ticker + commands + upload results →
/// session thread`, uploads on short-lived worker threads.
///
/// The session thread owns both timers. The countdown ticker only exists
/// while a countdown runs and is dropped the moment alignment is lost, so
/// a cancelled countdown can never fire late.
pub struct TimedCaptureRunner {
    uploader: Arc<dyn UploadAdapter>,
}

impl TimedCaptureRunner {
    pub fn new(uploader: Arc<dyn UploadAdapter>) -> Self {
        Self { uploader }
    }

    /// Moves the pipeline onto its session thread and opens the camera.
    pub fn start(&self, mut pipeline: CapturePipeline) -> CaptureSessionHandle {
        let (command_tx, command_rx) = unbounded::<SessionCommand>();
        let (event_tx, event_rx) = unbounded::<CaptureEvent>();
        pipeline.add_observer(Box::new(event_tx));

        let uploader = self.uploader.clone();
        let worker = std::thread::spawn(move || run_session(pipeline, uploader, command_rx));

        CaptureSessionHandle {
            commands: command_tx,
            events: event_rx,
            worker: Some(worker),
        }
    }
}

/// Capture-screen side of a running session.
///
/// Dropping the handle (screen teardown) stops the session without waiting
/// for it; in-flight uploads are abandoned.
pub struct CaptureSessionHandle {
    commands: Sender<SessionCommand>,
    events: Receiver<CaptureEvent>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureSessionHandle {
    pub fn events(&self) -> &Receiver<CaptureEvent> {
        &self.events
    }

    pub fn manual_capture(&self) {
        self.send(SessionCommand::ManualCapture);
    }

    pub fn recapture(&self) {
        self.send(SessionCommand::Recapture);
    }

    pub fn skip(&self) {
        self.send(SessionCommand::Skip);
    }

    pub fn proceed(&self) {
        self.send(SessionCommand::Proceed);
    }

    /// Signals the session to stop and returns immediately.
    pub fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    /// Stops the session and waits for its thread, for callers that need
    /// the camera released before continuing.
    pub fn stop_and_wait(mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Capture session thread panicked");
            }
        }
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            log::debug!("Capture session already stopped, dropping {command:?}");
        }
    }
}

impl Drop for CaptureSessionHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(SessionCommand::Stop);
    }
}

fn run_session(
    mut pipeline: CapturePipeline,
    uploader: Arc<dyn UploadAdapter>,
    command_rx: Receiver<SessionCommand>,
) {
    let interval = pipeline.policy().poll_interval;
    let mut poll_ticker = tick(interval);
    let mut countdown_ticker: Receiver<Instant> = never();
    let (upload_tx, upload_rx) = unbounded::<UploadReport>();

    pipeline.open_camera();

    loop {
        // Commands first: a pending stop must win over a tick that became
        // ready while the previous poll was still running.
        let wake = select_biased! {
            recv(command_rx) -> msg => Wake::Command(msg.ok()),
            recv(upload_rx) -> msg => Wake::Upload(msg.ok()),
            recv(poll_ticker) -> _ => Wake::Poll,
            recv(countdown_ticker) -> _ => Wake::Countdown,
        };

        match wake {
            Wake::Command(None) | Wake::Command(Some(SessionCommand::Stop)) => break,
            Wake::Command(Some(command)) => {
                handle_command(&mut pipeline, command, &mut countdown_ticker);
                if command == SessionCommand::ManualCapture {
                    spawn_upload(&pipeline, &uploader, &upload_tx);
                }
            }
            Wake::Poll => match pipeline.poll() {
                PollOutcome::CountdownStarted(_) => countdown_ticker = tick(interval),
                PollOutcome::CountdownCancelled => countdown_ticker = never(),
                PollOutcome::Skipped | PollOutcome::Waiting | PollOutcome::Holding => {}
            },
            Wake::Countdown => match pipeline.countdown_tick() {
                CountdownOutcome::Remaining(_) => {}
                CountdownOutcome::Captured => {
                    countdown_ticker = never();
                    spawn_upload(&pipeline, &uploader, &upload_tx);
                }
                CountdownOutcome::Ignored | CountdownOutcome::CaptureFailed => {
                    countdown_ticker = never();
                }
            },
            Wake::Upload(Some(report)) => {
                pipeline.record_timing("upload", report.duration_ms);
                pipeline.complete_upload(report.attempt, report.result);
            }
            Wake::Upload(None) => {}
        }

        if pipeline.has_navigated() {
            poll_ticker = never();
            countdown_ticker = never();
        }
    }

    log::debug!("Capture session stopping");
    pipeline.close();
}

fn handle_command(
    pipeline: &mut CapturePipeline,
    command: SessionCommand,
    countdown_ticker: &mut Receiver<Instant>,
) {
    match command {
        SessionCommand::ManualCapture => {
            if pipeline.manual_capture() {
                *countdown_ticker = never();
            }
        }
        SessionCommand::Recapture => {
            if pipeline.recapture() {
                *countdown_ticker = never();
                pipeline.open_camera();
            }
        }
        SessionCommand::Skip => {
            if pipeline.skip() {
                *countdown_ticker = never();
            }
        }
        SessionCommand::Proceed => {
            pipeline.proceed();
        }
        SessionCommand::Stop => {}
    }
}

fn spawn_upload(
    pipeline: &CapturePipeline,
    uploader: &Arc<dyn UploadAdapter>,
    upload_tx: &Sender<UploadReport>,
) {
    let Some(job) = pipeline.begin_upload() else {
        return;
    };
    let uploader = uploader.clone();
    let upload_tx = upload_tx.clone();
    std::thread::spawn(move || {
        let UploadJob {
            attempt,
            blob,
            content_type,
            destination,
        } = job;
        let start = Instant::now();
        let result = uploader.upload(&blob, content_type, &destination);
        // The session may be gone by now; nobody is waiting for the result then.
        let _ = upload_tx.send(UploadReport {
            attempt,
            result,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        });
    });
}
