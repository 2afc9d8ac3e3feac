//! Locates the face model on disk, fetching it once into the user cache.
//!
//! The model URL is built a single time from a normalized base URL and the
//! model file name; the transfer itself goes through a [`ModelFetcher`] so
//! the HTTP client can be swapped out.
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("invalid model name {0:?}")]
    InvalidName(String),
    #[error("invalid model base URL {0:?}")]
    InvalidBaseUrl(String),
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fetching {url} failed: {message}")]
    Fetch { url: String, message: String },
    #[error("failed to store model at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress callback: `(bytes_received, total_bytes)`, total 0 when unknown.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Transfers the bytes at `url` into `sink`, returning the byte count.
pub trait ModelFetcher: Send {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, ModelResolveError>;
}

/// Where models are published. The base URL is normalized on construction
/// so every request path is built the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSource {
    base_url: String,
}

impl ModelSource {
    pub fn new(base_url: &str) -> Result<Self, ModelResolveError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let has_scheme = trimmed.starts_with("https://") || trimmed.starts_with("http://");
        if !has_scheme || trimmed.len() <= "https://".len() {
            return Err(ModelResolveError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url: trimmed.to_string(),
        })
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url)
    }
}

/// Cache, then bundled copy, then one fetch into the cache.
pub struct ModelResolver {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
    source: ModelSource,
    fetcher: Box<dyn ModelFetcher>,
}

impl ModelResolver {
    pub fn new(cache_dir: PathBuf, source: ModelSource, fetcher: Box<dyn ModelFetcher>) -> Self {
        Self {
            cache_dir,
            bundled_dir: None,
            source,
            fetcher,
        }
    }

    pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, ModelResolveError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ModelResolveError::InvalidName(name.to_string()));
        }

        let cached = self.cache_dir.join(name);
        if cached.is_file() {
            return Ok(cached);
        }
        if let Some(bundled) = self.bundled_dir.as_ref().map(|d| d.join(name)) {
            if bundled.is_file() {
                log::debug!("Using bundled face model {}", bundled.display());
                return Ok(bundled);
            }
        }

        fs::create_dir_all(&self.cache_dir).map_err(|source| ModelResolveError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;
        let url = self.source.url_for(name);
        log::info!("Fetching face model {name} from {url}");

        // Written next to the target and renamed into place only when
        // complete; dropped (and deleted) on any failure.
        let store_err = |source| ModelResolveError::Store {
            path: cached.clone(),
            source,
        };
        let mut staged = tempfile::NamedTempFile::new_in(&self.cache_dir).map_err(store_err)?;
        let bytes = self.fetcher.fetch(&url, staged.as_file_mut())?;
        staged.as_file_mut().flush().map_err(store_err)?;
        staged
            .persist(&cached)
            .map_err(|e| store_err(e.error))?;
        log::info!("Stored face model ({bytes} bytes) at {}", cached.display());
        Ok(cached)
    }
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceCapture/models/`
/// - elsewhere: `$XDG_CACHE_HOME/FaceCapture/models/` or the OS equivalent
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();
    base.map(|d| d.join("FaceCapture").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

/// [`ModelFetcher`] over a blocking `reqwest` client.
pub struct HttpModelFetcher {
    client: reqwest::blocking::Client,
    progress: Option<ProgressFn>,
}

impl HttpModelFetcher {
    pub fn new() -> Result<Self, ModelResolveError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| ModelResolveError::Fetch {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl ModelFetcher for HttpModelFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, ModelResolveError> {
        let fetch_err = |message: String| ModelResolveError::Fetch {
            url: url.to_string(),
            message,
        };
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_err(e.to_string()))?;

        let total = response.content_length().unwrap_or(0);
        let mut received = 0u64;
        let mut buf = vec![0u8; 256 * 1024];
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| fetch_err(e.to_string()))?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])
                .map_err(|e| fetch_err(format!("write failed: {e}")))?;
            received += n as u64;
            if let Some(progress) = &self.progress {
                progress(received, total);
            }
        }
        if total > 0 && received != total {
            return Err(fetch_err(format!("truncated body: {received} of {total} bytes")));
        }
        Ok(received)
    }
}
