use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::detection::domain::detector_loader::DetectorLoader;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::{DEFAULT_MODEL_BASE_URL, YOLO_MODEL_NAME};

use super::model_resolver::{
    model_cache_dir, HttpModelFetcher, ModelFetcher, ModelResolveError, ModelResolver, ModelSource,
};
use super::onnx_yolo_detector::{OnnxYoloDetector, DEFAULT_CONFIDENCE};

/// Brings up the YOLO face detector: resolves the model file (cache,
/// bundled copy, or download) and builds the ONNX session.
pub struct OnnxDetectorLoader {
    model_path: Option<PathBuf>,
    bundled_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    model_base_url: String,
    fetcher: Option<Box<dyn ModelFetcher>>,
    resolver: Option<ModelResolver>,
    confidence: f64,
}

impl OnnxDetectorLoader {
    pub fn new() -> Self {
        Self {
            model_path: None,
            bundled_dir: None,
            cache_dir: None,
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            fetcher: None,
            resolver: None,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    /// Use this model file as-is instead of resolving one.
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    /// Cache location; defaults to the platform model cache.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Base URL the model file is fetched from.
    pub fn with_model_base_url(mut self, url: impl Into<String>) -> Self {
        self.model_base_url = url.into();
        self
    }

    /// Replaces the HTTP fetcher.
    pub fn with_fetcher(mut self, fetcher: Box<dyn ModelFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    fn build_resolver(&mut self) -> Result<ModelResolver, ModelResolveError> {
        let source = ModelSource::new(&self.model_base_url)?;
        let cache_dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => model_cache_dir()?,
        };
        let fetcher = match self.fetcher.take() {
            Some(fetcher) => fetcher,
            None => Box::new(HttpModelFetcher::new()?.with_progress(log_progress())),
        };
        let resolver = ModelResolver::new(cache_dir, source, fetcher);
        Ok(match &self.bundled_dir {
            Some(dir) => resolver.with_bundled_dir(dir.clone()),
            None => resolver,
        })
    }

    fn model_file(&mut self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        if let Some(path) = &self.model_path {
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(format!("face model not found at {}", path.display()).into())
            };
        }
        // Kept across retries so the fetcher is built once.
        let resolver = match self.resolver.take() {
            Some(resolver) => resolver,
            None => self.build_resolver()?,
        };
        let resolved = resolver.resolve(YOLO_MODEL_NAME);
        self.resolver = Some(resolver);
        Ok(resolved?)
    }
}

/// Logs download progress in 10% steps.
fn log_progress() -> Box<dyn Fn(u64, u64) + Send> {
    let last_decile = AtomicU64::new(0);
    Box::new(move |received, total| {
        if total == 0 {
            return;
        }
        let decile = received * 10 / total;
        if decile > last_decile.swap(decile, Ordering::Relaxed) {
            log::info!("Downloading face model: {}%", decile * 10);
        }
    })
}

impl Default for OnnxDetectorLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorLoader for OnnxDetectorLoader {
    fn load(&mut self) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
        let path = self.model_file()?;
        log::debug!("Loading face model from {}", path.display());
        Ok(Box::new(OnnxYoloDetector::new(&path, self.confidence)?))
    }
}
