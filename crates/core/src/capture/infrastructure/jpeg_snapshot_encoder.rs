use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;

use crate::capture::domain::snapshot_encoder::{CapturedArtifact, SnapshotEncoder};
use crate::shared::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;
const PREVIEW_FILE_NAME: &str = "capture.jpg";

/// Encodes snapshots as JPEG and keeps a preview copy on disk.
///
/// The preview file is what the surrounding screen displays; its `file://`
/// URL becomes the artifact's `preview_url`.
pub struct JpegSnapshotEncoder {
    preview_dir: PathBuf,
    quality: u8,
}

impl JpegSnapshotEncoder {
    pub fn new(preview_dir: impl Into<PathBuf>) -> Self {
        Self {
            preview_dir: preview_dir.into(),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn preview_path(&self) -> PathBuf {
        self.preview_dir.join(PREVIEW_FILE_NAME)
    }
}

fn file_url(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

impl SnapshotEncoder for JpegSnapshotEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<CapturedArtifact, Box<dyn std::error::Error>> {
        let image = frame
            .to_rgb_image()
            .ok_or("Failed to create image from frame data")?;

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode_image(&image)?;

        // Ensure parent directory exists (infrastructure concern)
        std::fs::create_dir_all(&self.preview_dir)?;
        let preview_path = self.preview_path();
        std::fs::write(&preview_path, &bytes)?;

        Ok(CapturedArtifact {
            image_blob: Arc::from(bytes),
            content_type: "image/jpeg",
            preview_url: file_url(&preview_path),
        })
    }
}
