//! Stockroom - inventory catalog synchronization
//!
//! Live product and transaction-log subscriptions over a hosted document
//! store, a local image cache, and the catalog mutation operations.
//!
//! # Modules
//!
//! - [`remote`] - remote capability traits and the in-process backend
//! - [`services`] - asset cache, synchronizer, product operations
//! - [`core`] - configuration, data paths, application context
//! - [`common`] - logging

pub mod common;
pub mod core;
pub mod remote;
pub mod services;

// Re-exports
pub use crate::core::{AppContext, Backend, Config, DataPaths, InMemoryBackend};
pub use remote::{BackendError, BackendErrorCode, CatalogStore, ObjectStorage};
pub use services::{
    AssetCache, CatalogItem, CatalogSync, CatalogView, ImageSource, ProductService, Subscription,
    TransactionEntry,
};
pub use shared::error::{AppError, AppResult, ErrorCode};
