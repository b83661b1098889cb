//! Service layer
//!
//! # Services
//!
//! - [`AssetCache`] - local product image cache
//! - [`CatalogSync`] - live product and transaction-log subscriptions
//! - [`ProductService`] - create, adjust-stock and delete operations
//! - [`HttpFetcher`] - HTTP download backing the asset cache

pub mod asset_cache;
pub mod catalog_sync;
pub mod image_download;
pub mod product_service;

pub use asset_cache::{AssetCache, AssetCacheError, AssetFetcher, ImageSource};
pub use catalog_sync::{
    CatalogItem, CatalogSync, CatalogView, Subscription, TransactionEntry, ViewRecord,
};
pub use image_download::HttpFetcher;
pub use product_service::ProductService;
