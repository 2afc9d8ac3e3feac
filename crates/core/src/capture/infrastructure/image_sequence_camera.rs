use std::path::{Path, PathBuf};

use crate::capture::domain::camera::Camera;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Plays back a directory of still images as if it were a live camera.
///
/// Frames are served in file-name order, one per grab; once the sequence is
/// exhausted the last image keeps being returned, like a camera pointed at
/// a still scene.
pub struct ImageSequenceCamera {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    next: usize,
    sequence: usize,
}

impl ImageSequenceCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            paths: Vec::new(),
            next: 0,
            sequence: 0,
        }
    }

    /// Image files in `dir`, sorted by name.
    pub fn scan(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl Camera for ImageSequenceCamera {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let paths = Self::scan(&self.dir)?;
        if paths.is_empty() {
            return Err(format!("No images found in {}", self.dir.display()).into());
        }
        log::info!(
            "Image sequence camera opened: {} frame(s) from {}",
            paths.len(),
            self.dir.display()
        );
        self.paths = paths;
        self.next = 0;
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)?.to_rgb8();
        if self.next + 1 < self.paths.len() {
            self.next += 1;
        }
        self.sequence += 1;
        Ok(Some(Frame::from_rgb_image(image, self.sequence)))
    }

    fn close(&mut self) {
        self.paths.clear();
        self.next = 0;
    }
}
