//! Remote capabilities
//!
//! The hosted document store and object storage are consumed through the
//! [`CatalogStore`] and [`ObjectStorage`] traits. Offline persistence,
//! optimistic writes and conflict resolution are the backend's job; this
//! crate only relies on the contracts below.
//!
//! [`memory`] provides an in-process implementation of both.

pub mod memory;

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::models::{ChangeBatch, Product, Transaction};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure classes reported by the backend SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorCode {
    Unauthorized,
    RetryLimitExceeded,
    Unavailable,
    Canceled,
    NotFound,
    Unknown,
}

impl BackendErrorCode {
    /// Parse an SDK error code such as `storage/unauthorized` or
    /// `permission-denied`. Unrecognized codes map to `Unknown`.
    ///
    /// Adapters wrapping a hosted SDK build their [`BackendError`]s through
    /// this, so every backend shares one classification.
    pub fn from_code(code: &str) -> Self {
        let code = code.rsplit('/').next().unwrap_or(code);
        match code {
            "unauthorized" | "unauthenticated" | "permission-denied" => Self::Unauthorized,
            "retry-limit-exceeded" | "deadline-exceeded" => Self::RetryLimitExceeded,
            "unavailable" => Self::Unavailable,
            "canceled" | "cancelled" => Self::Canceled,
            "not-found" | "object-not-found" => Self::NotFound,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RetryLimitExceeded => "retry-limit-exceeded",
            Self::Unavailable => "unavailable",
            Self::Canceled => "canceled",
            Self::NotFound => "not-found",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by a remote capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: BackendErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Unauthorized, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::NotFound, message)
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        let mapped = match err.code {
            BackendErrorCode::Unauthorized => AppError::permission_denied(
                "You are not authorized to perform this operation",
            ),
            BackendErrorCode::RetryLimitExceeded | BackendErrorCode::Unavailable => {
                AppError::network("Operation failed! Confirm you have a working network!")
            }
            BackendErrorCode::NotFound => {
                AppError::with_message(ErrorCode::NotFound, err.message.clone())
            }
            BackendErrorCode::Canceled | BackendErrorCode::Unknown => {
                AppError::backend(err.message.clone())
            }
        };
        mapped.with_detail("backend_code", err.code.as_str())
    }
}

pub type RemoteResult<T> = Result<T, BackendError>;

/// Remote collections ids can be allocated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Transactions,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Transactions => "transactions",
        }
    }
}

/// Standing live query
///
/// The first batch holds the full current result set as `Added` changes in
/// query order; later batches carry incremental changes. Dropping the query
/// releases it.
#[derive(Debug)]
pub struct LiveQuery<T> {
    rx: mpsc::UnboundedReceiver<ChangeBatch<T>>,
}

impl<T> LiveQuery<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<ChangeBatch<T>>) -> Self {
        Self { rx }
    }

    /// Next change batch, or `None` once the backend closed the query
    pub async fn next_batch(&mut self) -> Option<ChangeBatch<T>> {
        self.rx.recv().await
    }

    /// Stop receiving batches
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Paired product update and transaction-log insert, committed atomically
#[derive(Debug, Clone, PartialEq)]
pub struct StockChange {
    pub product_id: String,
    pub price: rust_decimal::Decimal,
    pub quantity: u32,
    pub updated_by: String,
    pub transaction: Transaction,
}

/// Hosted document store holding products and the transaction log
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Allocate a fresh document id in `collection` without writing anything
    fn allocate_id(&self, collection: Collection) -> String;

    /// Live query over all products ordered by name ascending
    async fn watch_products(&self) -> RemoteResult<LiveQuery<Product>>;

    /// Live query over the transaction log ordered by creation time descending
    async fn watch_transactions(&self) -> RemoteResult<LiveQuery<Transaction>>;

    /// Point query: products whose stored name equals `name`
    async fn find_products_by_name(&self, name: &str) -> RemoteResult<Vec<Product>>;

    async fn get_product(&self, id: &str) -> RemoteResult<Option<Product>>;

    /// Create or replace a product document
    async fn set_product(&self, product: &Product) -> RemoteResult<()>;

    async fn delete_product(&self, id: &str) -> RemoteResult<()>;

    /// Apply `change` as one atomic remote transaction: both the product
    /// update and the transaction insert commit, or neither does.
    async fn commit_stock_change(&self, change: &StockChange) -> RemoteResult<()>;
}

/// Handle to an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// Public download URL
    pub download_url: String,
}

/// Remote object storage for product images
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> RemoteResult<StoredObject>;

    async fn delete(&self, key: &str) -> RemoteResult<()>;
}
