//! ProductService - catalog mutations
//!
//! Three linear operations, none of which retries on its own:
//!
//! - `create_product`: validate, check name, upload image, write document.
//!   A failed document write deletes the uploaded image again.
//! - `adjust_stock`: one atomic remote commit updating the product and
//!   appending to the transaction log.
//! - `delete_product`: remote image, then document, then the cached file.
//!   A failed image delete aborts before the document is touched.
//!
//! Backend failures surface as [`AppError`] through
//! `From<BackendError> for AppError`.

use std::sync::Arc;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    Product, ProductCreate, StaffUser, StockAdjustment, Transaction, TransactionType,
    TransactionUpdate,
};
use shared::util::{normalize_name, now_millis};
use validator::Validate;

use super::asset_cache::AssetCache;
use crate::audit_log;
use crate::remote::{
    BackendError, BackendErrorCode, CatalogStore, Collection, ObjectStorage, StockChange,
};

const DUPLICATE_NAME_MESSAGE: &str =
    "Product already exists! Change the product name to continue or edit the existing product!";
const NO_CHANGES_MESSAGE: &str = "No changes were made to this product!";
const INVALID_PRICE_MESSAGE: &str = "Please provide a valid product price!";

/// Object storage key of a product's image
pub fn image_key(product_id: &str) -> String {
    format!("{}/{}", Collection::Products.as_str(), product_id)
}

/// Upload failures get their own wording; codes follow the usual mapping
fn upload_error(err: BackendError) -> AppError {
    let message = match err.code {
        BackendErrorCode::Unauthorized => Some("You are not authorized to save images"),
        BackendErrorCode::RetryLimitExceeded | BackendErrorCode::Unavailable => {
            Some("Failed to upload product! Confirm you have a working network!")
        }
        _ => None,
    };
    let mut mapped = AppError::from(err);
    if let Some(message) = message {
        mapped.message = message.to_string();
    }
    mapped
}

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn CatalogStore>,
    storage: Arc<dyn ObjectStorage>,
    assets: AssetCache,
}

impl std::fmt::Debug for ProductService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductService")
            .field("assets", &self.assets)
            .finish()
    }
}

impl ProductService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        storage: Arc<dyn ObjectStorage>,
        assets: AssetCache,
    ) -> Self {
        Self {
            store,
            storage,
            assets,
        }
    }

    /// Create a product with its image.
    ///
    /// The name is persisted trimmed and lowercase. Uniqueness is checked
    /// with a point query before anything is written; two concurrent creates
    /// with the same name can both pass it.
    pub async fn create_product(
        &self,
        actor: &StaffUser,
        input: ProductCreate,
    ) -> AppResult<Product> {
        input.validate()?;

        let name = normalize_name(&input.name);
        let existing = self.store.find_products_by_name(&name).await?;
        if !existing.is_empty() {
            tracing::debug!(name = %name, "Product name already taken");
            return Err(
                AppError::with_message(ErrorCode::ProductNameExists, DUPLICATE_NAME_MESSAGE)
                    .with_detail("name", name),
            );
        }

        let id = self.store.allocate_id(Collection::Products);
        let key = image_key(&id);
        let ProductCreate {
            description,
            price,
            quantity,
            image,
            ..
        } = input;

        let stored = self
            .storage
            .upload(&key, image.bytes, &image.content_type)
            .await
            .map_err(upload_error)?;

        let product = Product {
            id,
            name,
            description: description.trim().to_string(),
            price,
            quantity,
            date_added: now_millis(),
            cloud_photo_url: Some(stored.download_url),
            image_path: Some(stored.key),
            updated_by: Some(actor.username.clone()),
        };

        if let Err(e) = self.store.set_product(&product).await {
            // Compensate: drop the orphaned image
            if let Err(cleanup) = self.storage.delete(&key).await {
                tracing::warn!(
                    product_id = %product.id,
                    key = %key,
                    error = %cleanup,
                    "Failed to remove uploaded image after document write failure"
                );
            }
            return Err(e.into());
        }

        let resource = format!("product:{}", product.id);
        audit_log!(
            actor.username.as_str(),
            "create",
            resource.as_str(),
            product.name.as_str()
        );
        tracing::info!(product_id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    /// Record a sale or purchase that sets `product` to the given price and
    /// quantity.
    ///
    /// The returned product is `product` with the new values merged in; it
    /// is not re-read from the store.
    pub async fn adjust_stock(
        &self,
        actor: &StaffUser,
        product: &Product,
        adjustment: StockAdjustment,
        kind: TransactionType,
    ) -> AppResult<Product> {
        if adjustment.price.is_sign_negative() && !adjustment.price.is_zero() {
            return Err(
                AppError::with_message(ErrorCode::ValueOutOfRange, INVALID_PRICE_MESSAGE)
                    .with_detail("field", "price"),
            );
        }
        if adjustment.is_noop_for(product) {
            return Err(AppError::no_changes(NO_CHANGES_MESSAGE)
                .with_detail("product_id", product.id.as_str()));
        }

        let transaction = Transaction {
            id: self.store.allocate_id(Collection::Transactions),
            initiated_by: actor.username.clone(),
            created_at: now_millis(),
            updates: vec![TransactionUpdate {
                product_id: product.id.clone(),
                name: product.name.clone(),
                price: adjustment.price,
                quantity: adjustment.quantity,
            }],
            kind,
        };
        let change = StockChange {
            product_id: product.id.clone(),
            price: adjustment.price,
            quantity: adjustment.quantity,
            updated_by: actor.username.clone(),
            transaction,
        };

        self.store
            .commit_stock_change(&change)
            .await
            .map_err(|e| match e.code {
                BackendErrorCode::NotFound => {
                    AppError::new(ErrorCode::ProductNotFound)
                        .with_detail("product_id", product.id.as_str())
                }
                _ => AppError::from(e),
            })?;

        let resource = format!("product:{}", product.id);
        audit_log!(
            actor.username.as_str(),
            kind.as_str(),
            resource.as_str(),
            change.transaction.id.as_str()
        );
        tracing::info!(
            product_id = %product.id,
            transaction_id = %change.transaction.id,
            kind = %kind,
            "Stock adjusted"
        );

        Ok(Product {
            price: adjustment.price,
            quantity: adjustment.quantity,
            updated_by: Some(actor.username.clone()),
            ..product.clone()
        })
    }

    /// Delete a product, its remote image and its cached image.
    ///
    /// An image that is already gone remotely counts as deleted. Any other
    /// image delete failure leaves the document in place.
    ///
    /// The remote image goes first, so a cache download starting afterwards
    /// fails and writes nothing. A download already streaming when the cached
    /// file is removed may still land; that orphan file is left on disk.
    pub async fn delete_product(&self, actor: &StaffUser, product: &Product) -> AppResult<()> {
        if let Some(key) = product.image_path.as_deref() {
            match self.storage.delete(key).await {
                Ok(()) => {}
                Err(e) if e.code == BackendErrorCode::NotFound => {
                    tracing::debug!(product_id = %product.id, key = %key, "Remote image already absent");
                }
                Err(e) => {
                    tracing::warn!(
                        product_id = %product.id,
                        key = %key,
                        error = %e,
                        "Image delete failed, keeping product document"
                    );
                    return Err(e.into());
                }
            }
        }

        self.store.delete_product(&product.id).await?;

        match self.assets.remove(&product.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(product_id = %product.id, "No cached image to remove");
            }
            Err(e) => {
                tracing::warn!(product_id = %product.id, error = %e, "Failed to remove cached image");
            }
        }

        let resource = format!("product:{}", product.id);
        audit_log!(actor.username.as_str(), "delete", resource.as_str());
        tracing::info!(product_id = %product.id, "Product deleted");
        Ok(())
    }
}
