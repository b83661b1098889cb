//! AssetCache - local product image cache
//!
//! One file per product in a single flat directory; the file name is the
//! product id. A cached file is never replaced once present: the first
//! successful download wins, even if the product's remote URL later changes.
//!
//! Download failures are not surfaced. The caller gets the remote URL back
//! instead and the download is attempted again the next time the product
//! shows up in a live query.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetCacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid asset id: {0}")]
    InvalidId(String),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Download failed: {0}")]
    Download(String),
}

impl From<AssetCacheError> for AppError {
    fn from(err: AssetCacheError) -> Self {
        AppError::with_message(ErrorCode::AssetCacheError, err.to_string())
    }
}

/// Fetches a remote resource into a local file
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Write the body of `url` to `dest`, returning the number of bytes written
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, AssetCacheError>;
}

/// Where a record's image can be loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "location", rename_all = "snake_case")]
pub enum ImageSource {
    /// Cached file on local storage
    Local(PathBuf),
    /// Remote download URL (cache miss or failed download)
    Remote(String),
    /// Record has no image at all
    Missing,
}

impl ImageSource {
    pub fn is_local(&self) -> bool {
        matches!(self, ImageSource::Local(_))
    }

    /// Local path rendered as a string, or the remote URL
    pub fn location(&self) -> Option<String> {
        match self {
            ImageSource::Local(path) => Some(path.to_string_lossy().to_string()),
            ImageSource::Remote(url) => Some(url.clone()),
            ImageSource::Missing => None,
        }
    }
}

/// Local product image cache
#[derive(Clone)]
pub struct AssetCache {
    root: PathBuf,
    fetcher: Arc<dyn AssetFetcher>,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache").field("root", &self.root).finish()
    }
}

impl AssetCache {
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            root: root.into(),
            fetcher,
        }
    }

    /// Create the cache directory. Called once at startup.
    pub async fn prepare(&self) -> Result<(), AssetCacheError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids become file names, so path separators and dot names are refused
    fn validate_id(id: &str) -> Result<(), AssetCacheError> {
        let invalid = id.is_empty()
            || id == "."
            || id == ".."
            || id.starts_with('.')
            || id.chars().any(|c| c == '/' || c == '\\' || c == '\0');
        if invalid {
            return Err(AssetCacheError::InvalidId(id.to_string()));
        }
        Ok(())
    }

    /// Local path of the asset for `id`. Pure: touches no files.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, AssetCacheError> {
        Self::validate_id(id)?;
        Ok(self.root.join(id))
    }

    /// Whether a cached file exists for `id`. Never fails; any error reads
    /// as "not cached".
    pub async fn exists(&self, id: &str) -> bool {
        let Ok(path) = self.path_for(id) else {
            return false;
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    /// Make sure the asset for `id` is cached, downloading it from
    /// `remote_url` on a miss.
    ///
    /// Returns the local path when the file is (now) present. On download
    /// failure the error is logged and the remote URL is returned instead.
    pub async fn ensure_local(&self, id: &str, remote_url: &str) -> ImageSource {
        let path = match self.path_for(id) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Refusing to cache asset");
                return ImageSource::Remote(remote_url.to_string());
            }
        };

        if self.exists(id).await {
            tracing::debug!(id = %id, "Asset already cached");
            return ImageSource::Local(path);
        }

        match self.download(id, remote_url, &path).await {
            Ok(()) => ImageSource::Local(path),
            Err(e) => {
                tracing::warn!(id = %id, url = %remote_url, error = %e, "Failed to cache asset");
                ImageSource::Remote(remote_url.to_string())
            }
        }
    }

    /// Image reference for a record without triggering a download
    pub async fn resolve(&self, id: &str, remote_url: Option<&str>) -> ImageSource {
        if self.exists(id).await {
            if let Ok(path) = self.path_for(id) {
                return ImageSource::Local(path);
            }
        }
        match remote_url {
            Some(url) => ImageSource::Remote(url.to_string()),
            None => ImageSource::Missing,
        }
    }

    /// Delete the cached file for `id`. Returns whether a file was removed.
    pub async fn remove(&self, id: &str) -> Result<bool, AssetCacheError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(id = %id, "Removed cached asset");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ============ Internal ============

    /// Download into a temp file, then move it into place unless another
    /// writer got there first.
    async fn download(
        &self,
        id: &str,
        remote_url: &str,
        path: &Path,
    ) -> Result<(), AssetCacheError> {
        let tmp_path = self
            .root
            .join(format!(".{}.{}.part", id, uuid::Uuid::new_v4().simple()));

        let written = match self.fetcher.fetch_to(remote_url, &tmp_path).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(e);
            }
        };

        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(id = %id, "Asset cached concurrently, discarding download");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Ok(());
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(id = %id, size = written, "Asset downloaded and cached");
        Ok(())
    }
}
