mod settings;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use facecapture_core::capture::domain::capture_event::{CaptureEvent, NavigationReason};
use facecapture_core::capture::domain::capture_pipeline::CapturePipeline;
use facecapture_core::capture::domain::capture_policy::CapturePolicy;
use facecapture_core::capture::domain::capture_state::{CapturePhase, FailureReason};
use facecapture_core::capture::infrastructure::image_sequence_camera::ImageSequenceCamera;
use facecapture_core::capture::infrastructure::jpeg_snapshot_encoder::JpegSnapshotEncoder;
use facecapture_core::capture::infrastructure::logging_capture_observer::LoggingCaptureObserver;
use facecapture_core::capture::infrastructure::timed_capture_runner::{
    CaptureSessionHandle, TimedCaptureRunner,
};
use facecapture_core::detection::domain::detector_loader::{load_with_retry, RetryPolicy};
use facecapture_core::detection::domain::face_detector::FaceDetector;
use facecapture_core::detection::infrastructure::model_resolver::ModelSource;
use facecapture_core::detection::infrastructure::onnx_detector_loader::OnnxDetectorLoader;
use facecapture_core::upload::domain::upload_adapter::UploadDestination;
use facecapture_core::upload::infrastructure::presigned_post_uploader::PresignedPostUploader;

use settings::Settings;

/// Manual photos attempted before giving up on a camera that keeps failing.
const MAX_MANUAL_ATTEMPTS: u32 = 3;

/// Face-position auto-capture: waits for one well-placed face, counts down,
/// takes a single photo and uploads it.
#[derive(Parser)]
#[command(name = "face-capture")]
struct Cli {
    /// Directory of still images replayed as the camera feed.
    #[arg(long)]
    frames: PathBuf,

    /// JSON upload descriptor: {"url": "...", "fields": [["name", "value"], ...]}.
    #[arg(long)]
    destination: PathBuf,

    /// Treat the feed as a mirrored selfie view (flips left/right hints).
    #[arg(long)]
    mirrored: bool,

    /// Skip loading the face model and run in manual-capture mode.
    #[arg(long)]
    no_detection: bool,

    /// Take a manual photo when automatic capture is unavailable or failed.
    #[arg(long)]
    manual: bool,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Milliseconds between position checks.
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Seconds the face must stay in position before the photo is taken.
    #[arg(long)]
    countdown: Option<u32>,

    /// Base URL the face model is downloaded from when it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Where the preview JPEG is written (default: system temp dir).
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Screen policy: identity or proctoring.
    #[arg(long, default_value = "identity")]
    policy: String,

    /// Give up if no photo has been taken and uploaded by then.
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Persist the effective settings as the new defaults.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings = merge_settings(&cli, Settings::load());
    if cli.save_settings {
        let path = settings.save()?;
        log::info!("Settings saved to {}", path.display());
    }

    let destination = load_destination(&cli.destination)?;
    let policy = settings.apply_to(parse_policy(&cli.policy));
    let detector = build_detector(&cli, &settings);
    if detector.is_none() && !cli.manual {
        eprintln!("Face detection unavailable; rerun with --manual to take the photo yourself");
    }

    let preview_dir = cli.preview_dir.clone().unwrap_or_else(std::env::temp_dir);
    let pipeline = CapturePipeline::new(
        Box::new(ImageSequenceCamera::new(&cli.frames)),
        detector,
        Box::new(JpegSnapshotEncoder::new(preview_dir)),
        destination,
        policy,
    )
    .with_observer(Box::new(LoggingCaptureObserver::new()));

    let uploader = Arc::new(PresignedPostUploader::new()?);
    let handle = TimedCaptureRunner::new(uploader).start(pipeline);
    let outcome = drive_session(&handle, cli.manual, Duration::from_secs(cli.timeout_secs));
    handle.stop_and_wait();

    match outcome? {
        NavigationReason::Captured => eprintln!("Photo captured and uploaded"),
        NavigationReason::ProceededAfterUploadFailure => {
            eprintln!("Photo kept locally; upload failed, continuing anyway")
        }
        NavigationReason::Skipped => eprintln!("Photo skipped"),
    }
    Ok(())
}

/// Relays session events to the terminal until the screen navigates away.
fn drive_session(
    handle: &CaptureSessionHandle,
    manual: bool,
    timeout: Duration,
) -> Result<NavigationReason, Box<dyn std::error::Error>> {
    let deadline = Instant::now() + timeout;
    let mut manual_attempts = 0;
    let mut camera_opened = false;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = match handle.events().recv_timeout(remaining) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                return Err(format!(
                    "No photo taken within {}s (use --timeout-secs to wait longer)",
                    timeout.as_secs()
                )
                .into())
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err("Capture session ended unexpectedly".into())
            }
        };

        match event {
            CaptureEvent::PhaseChanged {
                to: CapturePhase::Polling,
                ..
            } => camera_opened = true,
            // Nothing to retry: manual capture needs an open camera too.
            CaptureEvent::Failed(FailureReason::CaptureUnavailable) if !camera_opened => {
                return Err("Camera could not be opened; check the frames directory".into())
            }
            CaptureEvent::Guidance(message) => eprintln!("{message}"),
            CaptureEvent::CountdownStarted(secs) => eprintln!("Hold still... {secs}"),
            CaptureEvent::CountdownTick(secs) if secs > 0 => eprintln!("{secs}"),
            CaptureEvent::Captured(artifact) => {
                eprintln!("Photo taken, preview at {}", artifact.preview_url)
            }
            CaptureEvent::Failed(reason) => match reason {
                FailureReason::UploadFailed => handle.proceed(),
                FailureReason::ModelUnavailable | FailureReason::CaptureUnavailable if manual => {
                    if manual_attempts == MAX_MANUAL_ATTEMPTS {
                        return Err(format!(
                            "Giving up after {MAX_MANUAL_ATTEMPTS} manual capture attempts"
                        )
                        .into());
                    }
                    manual_attempts += 1;
                    log::info!("Automatic capture unavailable ({reason}), taking a manual photo");
                    handle.manual_capture();
                }
                _ => {}
            },
            CaptureEvent::NavigateForward(reason) => return Ok(reason),
            _ => {}
        }
    }
}

fn build_detector(cli: &Cli, settings: &Settings) -> Option<Box<dyn FaceDetector>> {
    if cli.no_detection {
        log::warn!("Face detection disabled by --no-detection");
        return None;
    }
    let mut loader = OnnxDetectorLoader::new()
        .with_confidence(settings.confidence)
        .with_model_base_url(settings.model_base_url.clone());
    let availability = load_with_retry(&mut loader, RetryPolicy::default());
    if !availability.is_available() {
        log::warn!("Continuing without face detection: {availability:?}");
    }
    availability.into_detector()
}

fn merge_settings(cli: &Cli, mut settings: Settings) -> Settings {
    if let Some(confidence) = cli.confidence {
        settings.confidence = confidence;
    }
    if let Some(poll_ms) = cli.poll_ms {
        settings.poll_ms = poll_ms;
    }
    if let Some(countdown) = cli.countdown {
        settings.countdown_secs = countdown;
    }
    if cli.mirrored {
        settings.mirrored = Some(true);
    }
    if let Some(url) = &cli.model_url {
        settings.model_base_url = url.clone();
    }
    settings
}

fn load_destination(path: &Path) -> Result<UploadDestination, Box<dyn std::error::Error>> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read upload descriptor {}: {e}", path.display()))?;
    let destination: UploadDestination = serde_json::from_str(&json)
        .map_err(|e| format!("Invalid upload descriptor {}: {e}", path.display()))?;
    if destination.url.is_empty() {
        return Err(format!("Upload descriptor {} has an empty url", path.display()).into());
    }
    Ok(destination)
}

fn parse_policy(name: &str) -> CapturePolicy {
    if name == "proctoring" {
        CapturePolicy::proctoring_snapshot()
    } else {
        CapturePolicy::identity_check()
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.frames.is_dir() {
        return Err(format!("Frames directory not found: {}", cli.frames.display()).into());
    }
    let frames = ImageSequenceCamera::scan(&cli.frames)
        .map_err(|e| format!("Cannot read frames directory {}: {e}", cli.frames.display()))?;
    if frames.is_empty() {
        return Err(format!("No images found in {}", cli.frames.display()).into());
    }
    if !cli.destination.is_file() {
        return Err(format!(
            "Upload descriptor not found: {}",
            cli.destination.display()
        )
        .into());
    }
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {confidence}"
            )
            .into());
        }
    }
    if cli.poll_ms == Some(0) {
        return Err("Poll interval must be at least 1 ms".into());
    }
    if cli.countdown == Some(0) {
        return Err("Countdown must be at least 1 second".into());
    }
    if cli.policy != "identity" && cli.policy != "proctoring" {
        return Err(format!(
            "Policy must be 'identity' or 'proctoring', got '{}'",
            cli.policy
        )
        .into());
    }
    if cli.timeout_secs == 0 {
        return Err("Timeout must be at least 1 second".into());
    }
    if let Some(url) = &cli.model_url {
        ModelSource::new(url)?;
    }
    Ok(())
}
