//! AppContext - explicit owner of every service
//!
//! Remote capabilities come in through a [`Backend`]; the context builds the
//! asset cache, the synchronizer and the product service on top of them and
//! owns the root cancellation token every subscription hangs off.

use std::path::PathBuf;
use std::sync::Arc;

use shared::error::{AppError, AppResult, ErrorCode};
use tokio_util::sync::CancellationToken;

use super::config::Config;
use crate::remote::memory::{MemoryCatalog, MemoryObjectStorage};
use crate::remote::{CatalogStore, ObjectStorage};
use crate::services::{AssetCache, AssetFetcher, CatalogSync, HttpFetcher, ProductService};

/// Remote capabilities the application runs against
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn CatalogStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub fetcher: Arc<dyn AssetFetcher>,
}

impl Backend {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        storage: Arc<dyn ObjectStorage>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Self {
        Self {
            store,
            storage,
            fetcher,
        }
    }

    /// Hosted backend; images are downloaded over HTTP
    pub fn remote(store: Arc<dyn CatalogStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self::new(store, storage, Arc::new(HttpFetcher::new()))
    }

    /// In-process backend with no external handles kept
    pub fn in_memory() -> Self {
        InMemoryBackend::new().backend()
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// In-process backend keeping typed handles for inspection and failure
/// injection
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    pub catalog: Arc<MemoryCatalog>,
    pub storage: Arc<MemoryObjectStorage>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object storage doubles as the asset fetcher for its own URLs
    pub fn backend(&self) -> Backend {
        Backend::new(
            self.catalog.clone(),
            self.storage.clone(),
            self.storage.clone(),
        )
    }
}

/// Application context
///
/// Cheap to clone; clones share the same services and shutdown token.
#[derive(Clone, Debug)]
pub struct AppContext {
    config: Config,
    assets: AssetCache,
    catalog: CatalogSync,
    products: ProductService,
    shutdown: CancellationToken,
}

impl AppContext {
    /// Build all services.
    ///
    /// Creates the asset cache directory; fails if it cannot be created.
    pub async fn initialize(config: Config, backend: Backend) -> AppResult<Self> {
        let assets_dir = config.paths().assets_dir();
        let assets = AssetCache::new(&assets_dir, backend.fetcher.clone());
        assets.prepare().await.map_err(|e| {
            AppError::with_message(
                ErrorCode::ConfigError,
                format!("Failed to create asset cache directory: {}", e),
            )
            .with_detail("path", assets_dir.to_string_lossy().to_string())
        })?;

        let shutdown = CancellationToken::new();
        let catalog = CatalogSync::new(
            backend.store.clone(),
            assets.clone(),
            shutdown.clone(),
            config.event_buffer,
        );
        let products = ProductService::new(backend.store, backend.storage, assets.clone());

        tracing::info!(
            work_dir = %config.work_dir,
            environment = %config.environment,
            "Application context initialized"
        );

        Ok(Self {
            config,
            assets,
            catalog,
            products,
            shutdown,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn assets(&self) -> &AssetCache {
        &self.assets
    }

    pub fn catalog(&self) -> &CatalogSync {
        &self.catalog
    }

    pub fn products(&self) -> &ProductService {
        &self.products
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.work_dir)
    }

    /// End every live subscription. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        tracing::info!("Application context shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
