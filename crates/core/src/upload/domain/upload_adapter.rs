use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pre-authorized upload target handed out by session setup.
///
/// Treated as an opaque capability: the URL and form fields are passed
/// through untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDestination {
    pub url: String,
    #[serde(default)]
    pub fields: Vec<(String, String)>,
}

impl UploadDestination {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("upload to {url} rejected with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid upload request: {0}")]
    InvalidRequest(String),
}

/// Transfers a captured image to its destination. Performs no retries;
/// the caller owns the failure policy.
pub trait UploadAdapter: Send + Sync {
    fn upload(
        &self,
        blob: &[u8],
        content_type: &str,
        destination: &UploadDestination,
    ) -> Result<(), UploadError>;
}
