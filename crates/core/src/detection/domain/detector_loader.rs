use std::time::Duration;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::{MODEL_LOAD_ATTEMPTS, MODEL_LOAD_BACKOFF};

/// Initializes a face detector. May be slow (model download, session build).
pub trait DetectorLoader {
    fn load(&mut self) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>>;
}

/// Bounded retry with a fixed pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MODEL_LOAD_ATTEMPTS,
            backoff: MODEL_LOAD_BACKOFF,
        }
    }
}

/// Outcome of trying to bring up face detection for a session.
pub enum DetectorAvailability {
    Available(Box<dyn FaceDetector>),
    Unavailable { attempts: u32, last_error: String },
}

impl DetectorAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, DetectorAvailability::Available(_))
    }

    pub fn into_detector(self) -> Option<Box<dyn FaceDetector>> {
        match self {
            DetectorAvailability::Available(detector) => Some(detector),
            DetectorAvailability::Unavailable { .. } => None,
        }
    }
}

impl std::fmt::Debug for DetectorAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorAvailability::Available(_) => write!(f, "Available"),
            DetectorAvailability::Unavailable {
                attempts,
                last_error,
            } => write!(f, "Unavailable after {attempts} attempts: {last_error}"),
        }
    }
}

/// Tries `loader` up to `policy.max_attempts` times, sleeping
/// `policy.backoff` between failures. Never fails: exhaustion is reported
/// as [`DetectorAvailability::Unavailable`].
pub fn load_with_retry(loader: &mut dyn DetectorLoader, policy: RetryPolicy) -> DetectorAvailability {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match loader.load() {
            Ok(detector) => {
                if attempt > 1 {
                    log::info!("Face detector loaded on attempt {attempt}");
                }
                return DetectorAvailability::Available(detector);
            }
            Err(e) => {
                log::warn!("Face detector load attempt {attempt}/{max_attempts} failed: {e}");
                last_error = e.to_string();
                if attempt < max_attempts && !policy.backoff.is_zero() {
                    std::thread::sleep(policy.backoff);
                }
            }
        }
    }

    DetectorAvailability::Unavailable {
        attempts: max_attempts,
        last_error,
    }
}
