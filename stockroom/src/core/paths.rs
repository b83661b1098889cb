//! DataPaths - working directory layout
//!
//! ## Layout
//!
//! ```text
//! {work_dir}/
//! ├── cache/
//! │   └── images/              # Asset cache (flat, one file per product)
//! │       └── {product_id}
//! └── logs/
//!     ├── app/                 # app-YYYY-MM-DD.log, cleaned after 14 days
//!     └── audit/               # audit-YYYY-MM-DD.log, kept
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DataPaths {
    base: PathBuf,
}

impl DataPaths {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            base: work_dir.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Cache directory: {work_dir}/cache/
    pub fn cache_dir(&self) -> PathBuf {
        self.base.join("cache")
    }

    /// Asset cache root: {work_dir}/cache/images/
    pub fn assets_dir(&self) -> PathBuf {
        self.cache_dir().join("images")
    }

    /// Log directory: {work_dir}/logs/
    pub fn log_dir(&self) -> PathBuf {
        self.base.join("logs")
    }
}
