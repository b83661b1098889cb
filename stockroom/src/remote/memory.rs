//! In-process backend
//!
//! [`MemoryCatalog`] and [`MemoryObjectStorage`] implement the remote
//! capabilities without a network. They mirror the behaviour the
//! synchronizer depends on:
//!
//! - live queries deliver the current result set first, then incremental
//!   changes, in query order
//! - while offline, writes are applied locally and reported as `Pending`
//!   until connectivity returns; atomic transactions are refused
//! - any operation can be made to fail once via [`MemoryCatalog::fail_next`]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::models::{ChangeBatch, ChangeKind, DocumentChange, Product, Transaction, WriteStatus};
use tokio::sync::mpsc;

use super::{
    BackendError, CatalogStore, Collection, LiveQuery, ObjectStorage, RemoteResult, StockChange,
    StoredObject,
};
use crate::services::asset_cache::{AssetCacheError, AssetFetcher};

/// Operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Watch,
    Query,
    Write,
    Delete,
    Transaction,
    Upload,
    DeleteObject,
    Download,
}

#[derive(Debug, Default)]
struct FailurePlan {
    queued: HashMap<RemoteOp, VecDeque<BackendError>>,
}

impl FailurePlan {
    fn push(&mut self, op: RemoteOp, err: BackendError) {
        self.queued.entry(op).or_default().push_back(err);
    }

    fn take(&mut self, op: RemoteOp) -> RemoteResult<()> {
        match self.queued.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct Watchers<T> {
    senders: Vec<mpsc::UnboundedSender<ChangeBatch<T>>>,
}

impl<T: Clone> Watchers<T> {
    fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    fn open(&mut self, initial: ChangeBatch<T>) -> LiveQuery<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, send cannot fail
        let _ = tx.send(initial);
        self.senders.push(tx);
        LiveQuery::new(rx)
    }

    fn broadcast(&mut self, batch: ChangeBatch<T>) {
        if batch.is_empty() {
            return;
        }
        self.senders.retain(|tx| tx.send(batch.clone()).is_ok());
    }

    fn active(&mut self) -> usize {
        self.senders.retain(|tx| !tx.is_closed());
        self.senders.len()
    }
}

#[derive(Debug)]
struct ProductEntry {
    doc: Product,
    /// Last version acknowledged by the "server"
    confirmed: Option<Product>,
    status: WriteStatus,
}

#[derive(Debug)]
struct CatalogState {
    online: bool,
    products: HashMap<String, ProductEntry>,
    transactions: HashMap<String, Transaction>,
    product_watchers: Watchers<Product>,
    transaction_watchers: Watchers<Transaction>,
    failures: FailurePlan,
}

impl CatalogState {
    fn write_status(&self) -> WriteStatus {
        if self.online {
            WriteStatus::Confirmed
        } else {
            WriteStatus::Pending
        }
    }

    fn sorted_products(&self) -> Vec<&ProductEntry> {
        let mut entries: Vec<&ProductEntry> = self.products.values().collect();
        entries.sort_by(|a, b| {
            a.doc
                .name
                .cmp(&b.doc.name)
                .then_with(|| a.doc.id.cmp(&b.doc.id))
        });
        entries
    }

    fn sorted_transactions(&self) -> Vec<&Transaction> {
        let mut txs: Vec<&Transaction> = self.transactions.values().collect();
        txs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        txs
    }
}

/// In-process document store
#[derive(Debug)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    /// Create an empty, online catalog
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CatalogState {
                online: true,
                products: HashMap::new(),
                transactions: HashMap::new(),
                product_watchers: Watchers::new(),
                transaction_watchers: Watchers::new(),
                failures: FailurePlan::default(),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Switch connectivity. Going online confirms every pending write and
    /// reports each affected product as modified.
    pub fn set_online(&self, online: bool) {
        let mut state = self.state.lock();
        state.online = online;
        if !online {
            return;
        }

        let mut ids: Vec<String> = state
            .products
            .iter()
            .filter(|(_, e)| e.status.is_pending())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();

        let mut batch = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = state.products.get_mut(&id) {
                entry.status = WriteStatus::Confirmed;
                entry.confirmed = Some(entry.doc.clone());
                batch.push(DocumentChange::new(
                    ChangeKind::Modified,
                    entry.doc.clone(),
                    WriteStatus::Confirmed,
                ));
            }
        }
        tracing::debug!(confirmed = batch.len(), "Memory catalog back online");
        state.product_watchers.broadcast(batch);
    }

    /// Reject every pending product write: each is reported as `Failed`,
    /// then reverted to its last confirmed version (or removed if it never
    /// had one). Returns the number of rejected writes.
    pub fn reject_pending(&self) -> usize {
        let mut state = self.state.lock();
        let mut ids: Vec<String> = state
            .products
            .iter()
            .filter(|(_, e)| e.status.is_pending())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();

        let mut batch = Vec::new();
        for id in &ids {
            let Some(entry) = state.products.remove(id) else {
                continue;
            };
            batch.push(DocumentChange::new(
                ChangeKind::Modified,
                entry.doc.clone(),
                WriteStatus::Failed,
            ));
            match entry.confirmed {
                Some(confirmed) => {
                    batch.push(DocumentChange::new(
                        ChangeKind::Modified,
                        confirmed.clone(),
                        WriteStatus::Confirmed,
                    ));
                    state.products.insert(
                        id.clone(),
                        ProductEntry {
                            doc: confirmed.clone(),
                            confirmed: Some(confirmed),
                            status: WriteStatus::Confirmed,
                        },
                    );
                }
                None => batch.push(DocumentChange::new(
                    ChangeKind::Removed,
                    entry.doc,
                    WriteStatus::Confirmed,
                )),
            }
        }
        state.product_watchers.broadcast(batch);
        ids.len()
    }

    /// Make the next `op` fail with `err`
    pub fn fail_next(&self, op: RemoteOp, err: BackendError) {
        self.state.lock().failures.push(op, err);
    }

    pub fn product_count(&self) -> usize {
        self.state.lock().products.len()
    }

    /// Transaction log, newest first
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state
            .lock()
            .sorted_transactions()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Number of live queries still held open by a consumer
    pub fn active_watchers(&self) -> usize {
        let mut state = self.state.lock();
        state.product_watchers.active() + state.transaction_watchers.active()
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    fn allocate_id(&self, _collection: Collection) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    async fn watch_products(&self) -> RemoteResult<LiveQuery<Product>> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Watch)?;
        let initial: ChangeBatch<Product> = state
            .sorted_products()
            .into_iter()
            .map(|e| DocumentChange::new(ChangeKind::Added, e.doc.clone(), e.status))
            .collect();
        Ok(state.product_watchers.open(initial))
    }

    async fn watch_transactions(&self) -> RemoteResult<LiveQuery<Transaction>> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Watch)?;
        let initial: ChangeBatch<Transaction> = state
            .sorted_transactions()
            .into_iter()
            .map(|t| DocumentChange::new(ChangeKind::Added, t.clone(), WriteStatus::Confirmed))
            .collect();
        Ok(state.transaction_watchers.open(initial))
    }

    async fn find_products_by_name(&self, name: &str) -> RemoteResult<Vec<Product>> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Query)?;
        Ok(state
            .sorted_products()
            .into_iter()
            .filter(|e| e.doc.name == name)
            .map(|e| e.doc.clone())
            .collect())
    }

    async fn get_product(&self, id: &str) -> RemoteResult<Option<Product>> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Query)?;
        Ok(state.products.get(id).map(|e| e.doc.clone()))
    }

    async fn set_product(&self, product: &Product) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Write)?;
        let status = state.write_status();

        let previous = state.products.remove(&product.id);
        let kind = if previous.is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        let confirmed = if status == WriteStatus::Confirmed {
            Some(product.clone())
        } else {
            previous.and_then(|e| e.confirmed)
        };
        state.products.insert(
            product.id.clone(),
            ProductEntry {
                doc: product.clone(),
                confirmed,
                status,
            },
        );

        state
            .product_watchers
            .broadcast(vec![DocumentChange::new(kind, product.clone(), status)]);
        Ok(())
    }

    async fn delete_product(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Delete)?;
        let status = state.write_status();
        if let Some(entry) = state.products.remove(id) {
            state.product_watchers.broadcast(vec![DocumentChange::new(
                ChangeKind::Removed,
                entry.doc,
                status,
            )]);
        }
        Ok(())
    }

    async fn commit_stock_change(&self, change: &StockChange) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Transaction)?;
        if !state.online {
            return Err(BackendError::unavailable(
                "Transactions require a connection to the server",
            ));
        }

        let Some(entry) = state.products.get_mut(&change.product_id) else {
            return Err(BackendError::not_found(format!(
                "product {} does not exist",
                change.product_id
            )));
        };
        entry.doc.price = change.price;
        entry.doc.quantity = change.quantity;
        entry.doc.updated_by = Some(change.updated_by.clone());
        entry.confirmed = Some(entry.doc.clone());
        entry.status = WriteStatus::Confirmed;
        let updated = entry.doc.clone();

        state
            .transactions
            .insert(change.transaction.id.clone(), change.transaction.clone());

        state.product_watchers.broadcast(vec![DocumentChange::new(
            ChangeKind::Modified,
            updated,
            WriteStatus::Confirmed,
        )]);
        state.transaction_watchers.broadcast(vec![DocumentChange::new(
            ChangeKind::Added,
            change.transaction.clone(),
            WriteStatus::Confirmed,
        )]);
        Ok(())
    }
}

#[derive(Debug)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Default)]
struct StorageState {
    objects: HashMap<String, StoredBlob>,
    version: u64,
    failures: FailurePlan,
}

/// In-process object storage
///
/// Download URLs have the form `{base_url}/{key}?v={version}`; every upload
/// bumps the version. The storage also acts as an [`AssetFetcher`] for its
/// own URLs.
#[derive(Debug)]
pub struct MemoryObjectStorage {
    base_url: String,
    state: Mutex<StorageState>,
    downloads: AtomicUsize,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::with_base_url("memory://stockroom")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: Mutex::new(StorageState::default()),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Make the next `op` fail with `err`
    pub fn fail_next(&self, op: RemoteOp, err: BackendError) {
        self.state.lock().failures.push(op, err);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().objects.contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().objects.get(key).map(|b| b.bytes.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .objects
            .get(key)
            .map(|b| b.content_type.clone())
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Number of successful downloads served
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn key_for_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let rest = url.strip_prefix(self.base_url.as_str())?.strip_prefix('/')?;
        Some(rest.split('?').next().unwrap_or(rest))
    }
}

impl Default for MemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> RemoteResult<StoredObject> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::Upload)?;
        state.version += 1;
        let download_url = format!("{}/{}?v={}", self.base_url, key, state.version);
        state.objects.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(StoredObject {
            key: key.to_string(),
            download_url,
        })
    }

    async fn delete(&self, key: &str) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.failures.take(RemoteOp::DeleteObject)?;
        match state.objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(BackendError::not_found(format!("object {key} does not exist"))),
        }
    }
}

#[async_trait]
impl AssetFetcher for MemoryObjectStorage {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, AssetCacheError> {
        let bytes = {
            let mut state = self.state.lock();
            state
                .failures
                .take(RemoteOp::Download)
                .map_err(|e| AssetCacheError::Download(e.to_string()))?;
            let key = self
                .key_for_url(url)
                .ok_or_else(|| AssetCacheError::NotFound(url.to_string()))?;
            state
                .objects
                .get(key)
                .map(|b| b.bytes.clone())
                .ok_or_else(|| AssetCacheError::NotFound(url.to_string()))?
        };

        tokio::fs::write(dest, &bytes).await?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::BackendErrorCode;
    use rust_decimal::Decimal;
    use shared::models::{TransactionType, TransactionUpdate};

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            description: "A test product".to_string(),
            price: Decimal::new(10, 0),
            quantity: 5,
            date_added: 1,
            cloud_photo_url: None,
            image_path: None,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn test_initial_batch_is_name_ordered() {
        let catalog = MemoryCatalog::new();
        catalog.set_product(&product("a", "zebra")).await.unwrap();
        catalog.set_product(&product("b", "apple")).await.unwrap();
        catalog.set_product(&product("c", "mango")).await.unwrap();

        let mut query = catalog.watch_products().await.unwrap();
        let batch = query.next_batch().await.unwrap();
        let names: Vec<&str> = batch.iter().map(|c| c.document.name.as_str()).collect();
        assert_eq!(names, vec!["apple", "mango", "zebra"]);
        assert!(batch.iter().all(|c| c.kind == ChangeKind::Added));
    }

    #[tokio::test]
    async fn test_offline_writes_pending_until_online() {
        let catalog = MemoryCatalog::new();
        let mut query = catalog.watch_products().await.unwrap();
        assert!(query.next_batch().await.unwrap().is_empty());

        catalog.set_online(false);
        catalog.set_product(&product("a", "apple")).await.unwrap();
        let batch = query.next_batch().await.unwrap();
        assert_eq!(batch[0].kind, ChangeKind::Added);
        assert_eq!(batch[0].status, WriteStatus::Pending);

        catalog.set_online(true);
        let batch = query.next_batch().await.unwrap();
        assert_eq!(batch[0].kind, ChangeKind::Modified);
        assert_eq!(batch[0].status, WriteStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_reject_pending_reverts() {
        let catalog = MemoryCatalog::new();
        catalog.set_product(&product("a", "apple")).await.unwrap();
        catalog.set_online(false);
        let mut renamed = product("a", "apricot");
        renamed.quantity = 9;
        catalog.set_product(&renamed).await.unwrap();
        catalog.set_product(&product("b", "banana")).await.unwrap();

        let mut query = catalog.watch_products().await.unwrap();
        let _ = query.next_batch().await.unwrap();

        assert_eq!(catalog.reject_pending(), 2);
        let batch = query.next_batch().await.unwrap();
        let statuses: Vec<(ChangeKind, WriteStatus, &str)> = batch
            .iter()
            .map(|c| (c.kind, c.status, c.document.name.as_str()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (ChangeKind::Modified, WriteStatus::Failed, "apricot"),
                (ChangeKind::Modified, WriteStatus::Confirmed, "apple"),
                (ChangeKind::Modified, WriteStatus::Failed, "banana"),
                (ChangeKind::Removed, WriteStatus::Confirmed, "banana"),
            ]
        );
        assert_eq!(catalog.product_count(), 1);
    }

    #[tokio::test]
    async fn test_stock_change_refused_offline() {
        let catalog = MemoryCatalog::new();
        catalog.set_product(&product("a", "apple")).await.unwrap();
        catalog.set_online(false);

        let change = StockChange {
            product_id: "a".to_string(),
            price: Decimal::new(12, 0),
            quantity: 3,
            updated_by: "staff".to_string(),
            transaction: Transaction {
                id: "t1".to_string(),
                initiated_by: "staff".to_string(),
                created_at: 2,
                updates: vec![TransactionUpdate {
                    product_id: "a".to_string(),
                    name: "apple".to_string(),
                    price: Decimal::new(12, 0),
                    quantity: 3,
                }],
                kind: TransactionType::Sale,
            },
        };
        let err = catalog.commit_stock_change(&change).await.unwrap_err();
        assert_eq!(err.code, BackendErrorCode::Unavailable);
        assert!(catalog.transactions().is_empty());
        let stored = catalog.get_product("a").await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
    }

    #[tokio::test]
    async fn test_dropped_query_is_released() {
        let catalog = MemoryCatalog::new();
        let query = catalog.watch_products().await.unwrap();
        assert_eq!(catalog.active_watchers(), 1);
        drop(query);
        assert_eq!(catalog.active_watchers(), 0);
    }

    #[tokio::test]
    async fn test_storage_serves_its_urls() {
        let storage = MemoryObjectStorage::new();
        let first = storage
            .upload("products/p1", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        let second = storage
            .upload("products/p1", vec![4, 5], "image/png")
            .await
            .unwrap();
        assert_ne!(first.download_url, second.download_url);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("p1");
        let written = storage.fetch_to(&second.download_url, &dest).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![4, 5]);
        assert_eq!(storage.download_count(), 1);

        let missing = storage
            .fetch_to("memory://stockroom/products/nope", &dest)
            .await;
        assert!(matches!(missing, Err(AssetCacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let storage = MemoryObjectStorage::new();
        storage.fail_next(RemoteOp::Upload, BackendError::unauthorized("no"));
        assert!(storage.upload("k", vec![1], "image/png").await.is_err());
        assert!(storage.upload("k", vec![1], "image/png").await.is_ok());
    }
}
