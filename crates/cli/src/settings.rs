use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use facecapture_core::capture::domain::capture_policy::CapturePolicy;
use facecapture_core::detection::infrastructure::onnx_yolo_detector::DEFAULT_CONFIDENCE;
use facecapture_core::positioning::domain::position_evaluator::PositionThresholds;
use facecapture_core::shared::constants::{
    COUNTDOWN_SECS, DEFAULT_MODEL_BASE_URL, POLL_INTERVAL,
};

/// Persisted capture preferences. Command-line flags win over these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub thresholds: PositionThresholds,
    pub confidence: f64,
    pub poll_ms: u64,
    pub countdown_secs: u32,
    /// `None` keeps the policy preset's choice.
    pub mirrored: Option<bool>,
    /// Where the face model is downloaded from.
    pub model_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thresholds: PositionThresholds::default(),
            confidence: DEFAULT_CONFIDENCE,
            poll_ms: POLL_INTERVAL.as_millis() as u64,
            countdown_secs: COUNTDOWN_SECS,
            mirrored: None,
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceCapture").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings at {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> io::Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    /// Layers these settings over a policy preset.
    pub fn apply_to(&self, policy: CapturePolicy) -> CapturePolicy {
        let policy = policy
            .with_thresholds(self.thresholds)
            .with_poll_interval(Duration::from_millis(self.poll_ms))
            .with_countdown_secs(self.countdown_secs);
        match self.mirrored {
            Some(mirrored) => policy.with_mirrored(mirrored),
            None => policy,
        }
    }
}
