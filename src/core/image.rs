//! Image resolution
//!
//! Turns a product `image_url` (http(s) URL or local path) into raw bytes.
//! Remote images are cached under the image cache directory keyed by a
//! hash of the URL, so repeated index builds do not hit the network.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Empty image: {0}")]
    Empty(String),

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The remote side cannot be reached at all (DNS, refused connection)
    #[error("Image source unavailable: {0}")]
    Unavailable(String),

    #[error("Remote images are not supported in this build: {0}")]
    RemoteDisabled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageError {
    /// Whether this failure should abort a whole index build
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, ImageError::Unavailable(_))
    }
}

/// Raw, undecoded image bytes and the reference they were resolved from
#[derive(Debug, Clone)]
pub struct ImageData {
    pub source: String,
    pub bytes: Vec<u8>,
}

/// Resolves an image reference into bytes
pub trait ImageSource {
    fn resolve(&self, reference: &str) -> Result<ImageData, ImageError>;
}

pub fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Cache file for a remote URL: `<cache_dir>/<blake3(url)>.jpg`
pub fn url_to_cache_path(cache_dir: &Path, url: &str) -> PathBuf {
    let digest = blake3::hash(url.as_bytes());
    cache_dir.join(format!("{}.jpg", digest.to_hex()))
}

/// Filesystem image source with a download cache for remote images
pub struct FsImageSource {
    cache_dir: PathBuf,
    #[cfg_attr(not(feature = "remote"), allow(dead_code))]
    timeout: Duration,
    #[cfg(feature = "remote")]
    client: reqwest::blocking::Client,
}

impl FsImageSource {
    pub fn new(cache_dir: &Path, timeout: Duration) -> Result<Self, ImageError> {
        #[cfg(feature = "remote")]
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| ImageError::Fetch {
                url: String::new(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            timeout,
            #[cfg(feature = "remote")]
            client,
        })
    }

    fn read_local(&self, path: &Path, reference: &str) -> Result<ImageData, ImageError> {
        if !path.exists() {
            return Err(ImageError::NotFound(reference.to_string()));
        }
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(ImageError::Empty(reference.to_string()));
        }
        Ok(ImageData {
            source: reference.to_string(),
            bytes,
        })
    }

    fn resolve_remote(&self, url: &str) -> Result<ImageData, ImageError> {
        let cached = url_to_cache_path(&self.cache_dir, url);
        let cache_hit = std::fs::metadata(&cached)
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        if cache_hit {
            debug!(url, path = %cached.display(), "Image cache hit");
            return self.read_local(&cached, url);
        }

        let bytes = self.download(url)?;
        if bytes.is_empty() {
            return Err(ImageError::Empty(url.to_string()));
        }

        std::fs::create_dir_all(&self.cache_dir)?;
        write_cache_file(&cached, &bytes)?;
        debug!(url, bytes = bytes.len(), "Cached remote image");

        Ok(ImageData {
            source: url.to_string(),
            bytes,
        })
    }

    #[cfg(feature = "remote")]
    fn download(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let fetch_err = |reason: String| ImageError::Fetch {
            url: url.to_string(),
            reason,
        };

        debug!(url, timeout_secs = self.timeout.as_secs(), "Fetching remote image");
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                // Timeouts and HTTP statuses stay per-image
                if e.is_connect() {
                    ImageError::Unavailable(format!("{}: {}", url, e))
                } else {
                    fetch_err(e.to_string())
                }
            })?;

        let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "remote"))]
    fn download(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        Err(ImageError::RemoteDisabled(url.to_string()))
    }
}

/// Write a cache entry through a sibling temp file so a cut-off download
/// never shows up as a non-empty cache hit.
fn write_cache_file(path: &Path, bytes: &[u8]) -> Result<(), ImageError> {
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".tmp.{}", std::process::id()));
    let tmp_path = PathBuf::from(os);

    let written = File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| std::fs::rename(&tmp_path, path));

    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(ImageError::Io(e));
    }
    Ok(())
}

impl ImageSource for FsImageSource {
    fn resolve(&self, reference: &str) -> Result<ImageData, ImageError> {
        if is_url(reference) {
            self.resolve_remote(reference)
        } else {
            self.read_local(Path::new(reference), reference)
        }
    }
}
