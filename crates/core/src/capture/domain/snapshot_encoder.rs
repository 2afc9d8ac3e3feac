use std::sync::Arc;

use crate::shared::frame::Frame;

/// The one photo taken during a capture session.
///
/// Shared between the uploader and whatever displays the preview; never
/// mutated after creation.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedArtifact {
    pub image_blob: Arc<[u8]>,
    pub content_type: &'static str,
    pub preview_url: String,
}

/// Turns a frame into an uploadable image.
pub trait SnapshotEncoder: Send {
    fn encode(&mut self, frame: &Frame) -> Result<CapturedArtifact, Box<dyn std::error::Error>>;
}
