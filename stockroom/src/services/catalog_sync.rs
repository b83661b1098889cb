//! CatalogSync - live catalog and transaction-log subscriptions
//!
//! Each subscription owns one remote live query and one background worker.
//! The worker turns every change batch into typed [`SyncEvent`]s and pushes
//! them through a bounded channel to the [`Subscription`] handle.
//!
//! Product events always carry a usable image reference: for added and
//! modified products the worker first runs [`AssetCache::ensure_local`], and
//! falls back to the remote URL when the download fails. Downloads run as
//! detached tasks, so a download that started before an unsubscribe still
//! lands in the cache.
//!
//! Events follow the server order for adds. A modify that changes the sort
//! key is delivered in place; [`CatalogView`] re-sorts on the subscriber
//! side.

use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use shared::error::AppResult;
use shared::models::{ChangeKind, DocumentChange, Product, SyncEvent, Transaction, WriteStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::asset_cache::{AssetCache, ImageSource};
use crate::remote::{CatalogStore, LiveQuery};

/// Default capacity of a subscription's event channel
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Product as surfaced to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub product: Product,
    pub image: ImageSource,
    pub status: WriteStatus,
}

impl CatalogItem {
    pub fn id(&self) -> &str {
        &self.product.id
    }

    /// Unconfirmed local write ("offline")
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }
}

/// Transaction-log record as surfaced to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub transaction: Transaction,
    pub status: WriteStatus,
}

impl TransactionEntry {
    pub fn id(&self) -> &str {
        &self.transaction.id
    }
}

// ========== Subscription ==========

/// Handle to a running subscription
///
/// Yields events through [`Subscription::next`] or as a [`Stream`]. After
/// [`Subscription::unsubscribe`] (or drop) no further event is delivered,
/// including events already buffered.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<SyncEvent<T>>,
    token: CancellationToken,
}

impl<T> Subscription<T> {
    fn new(rx: mpsc::Receiver<SyncEvent<T>>, token: CancellationToken) -> Self {
        Self { rx, token }
    }

    /// Next event, or `None` once the subscription has ended
    pub async fn next(&mut self) -> Option<SyncEvent<T>> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Stop delivery and release the live query. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.rx.close();
        tracing::debug!("Subscription cancelled");
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = SyncEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.token.is_cancelled() {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ========== Synchronizer ==========

/// Opens live subscriptions over the catalog and the transaction log
#[derive(Clone)]
pub struct CatalogSync {
    store: Arc<dyn CatalogStore>,
    assets: AssetCache,
    shutdown: CancellationToken,
    buffer: usize,
}

impl CatalogSync {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        assets: AssetCache,
        shutdown: CancellationToken,
        buffer: usize,
    ) -> Self {
        Self {
            store,
            assets,
            shutdown,
            buffer: buffer.max(1),
        }
    }

    /// Subscribe to the product catalog, ordered by name ascending.
    ///
    /// The first events replay the current catalog as `Added`; calling this
    /// again starts a fresh, independent subscription.
    pub async fn subscribe_products(&self) -> AppResult<Subscription<CatalogItem>> {
        let live = self.store.watch_products().await?;
        let assets = self.assets.clone();
        let sub = self.spawn_worker("products", live, move |change| {
            resolve_product(assets.clone(), change)
        });
        tracing::info!("Product subscription started");
        Ok(sub)
    }

    /// Subscribe to the transaction log, ordered by creation time descending
    pub async fn subscribe_transactions(&self) -> AppResult<Subscription<TransactionEntry>> {
        let live = self.store.watch_transactions().await?;
        let sub = self.spawn_worker(
            "transactions",
            live,
            |change: DocumentChange<Transaction>| async move {
                let entry = TransactionEntry {
                    transaction: change.document,
                    status: change.status,
                };
                SyncEvent::from_kind(change.kind, entry)
            },
        );
        tracing::info!("Transaction subscription started");
        Ok(sub)
    }

    fn spawn_worker<T, U, F, Fut>(
        &self,
        label: &'static str,
        live: LiveQuery<T>,
        resolve: F,
    ) -> Subscription<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(DocumentChange<T>) -> Fut + Send + 'static,
        Fut: Future<Output = SyncEvent<U>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.buffer);
        let token = self.shutdown.child_token();
        tokio::spawn(run_worker(label, live, tx, token.clone(), resolve));
        Subscription::new(rx, token)
    }
}

impl std::fmt::Debug for CatalogSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSync")
            .field("assets", &self.assets)
            .field("buffer", &self.buffer)
            .finish()
    }
}

async fn resolve_product(
    assets: AssetCache,
    change: DocumentChange<Product>,
) -> SyncEvent<CatalogItem> {
    let DocumentChange {
        kind,
        document,
        status,
    } = change;

    let image = match (kind, document.cloud_photo_url.as_deref()) {
        (ChangeKind::Removed, url) => assets.resolve(&document.id, url).await,
        (_, Some(url)) => assets.ensure_local(&document.id, url).await,
        (_, None) => assets.resolve(&document.id, None).await,
    };

    SyncEvent::from_kind(
        kind,
        CatalogItem {
            product: document,
            image,
            status,
        },
    )
}

/// Worker loop: one live query in, typed events out, until cancelled or
/// either side goes away.
async fn run_worker<T, U, F, Fut>(
    label: &'static str,
    mut live: LiveQuery<T>,
    tx: mpsc::Sender<SyncEvent<U>>,
    token: CancellationToken,
    resolve: F,
) where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(DocumentChange<T>) -> Fut + Send + 'static,
    Fut: Future<Output = SyncEvent<U>> + Send + 'static,
{
    'outer: loop {
        let batch = tokio::select! {
            _ = token.cancelled() => break,
            batch = live.next_batch() => match batch {
                Some(batch) => batch,
                None => {
                    tracing::debug!(query = label, "Live query closed by backend");
                    break;
                }
            },
        };

        // Resolve in parallel, deliver in batch order
        let handles: Vec<_> = batch
            .into_iter()
            .map(|change| tokio::spawn(resolve(change)))
            .collect();

        // A dropped handle leaves its download running to completion
        for handle in handles {
            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => break 'outer,
                joined = handle => joined,
            };
            let event = match joined {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(query = label, error = %e, "Change resolution task failed");
                    continue;
                }
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => break 'outer,
                sent = tx.send(event) => {
                    if sent.is_err() {
                        break 'outer;
                    }
                }
            }
        }
    }

    live.close();
    tracing::debug!(query = label, "Subscription worker stopped");
}

// ========== Subscriber-side view ==========

/// Record that can live in a [`CatalogView`]
pub trait ViewRecord: Clone {
    fn record_id(&self) -> &str;

    /// Display order of the view
    fn view_order(&self, other: &Self) -> Ordering;
}

impl ViewRecord for CatalogItem {
    fn record_id(&self) -> &str {
        self.id()
    }

    fn view_order(&self, other: &Self) -> Ordering {
        self.product
            .name
            .cmp(&other.product.name)
            .then_with(|| self.product.id.cmp(&other.product.id))
    }
}

impl ViewRecord for TransactionEntry {
    fn record_id(&self) -> &str {
        self.id()
    }

    fn view_order(&self, other: &Self) -> Ordering {
        other
            .transaction
            .created_at
            .cmp(&self.transaction.created_at)
            .then_with(|| self.transaction.id.cmp(&other.transaction.id))
    }
}

/// Subscriber-owned ordered collection
///
/// Every applied event produces a new immutable snapshot; earlier snapshots
/// are never mutated.
#[derive(Debug, Clone)]
pub struct CatalogView<T> {
    items: Vec<T>,
    snapshot: Arc<[T]>,
}

impl<T: ViewRecord> CatalogView<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            snapshot: Arc::from(Vec::new()),
        }
    }

    /// Apply one event and return the resulting snapshot
    pub fn apply(&mut self, event: SyncEvent<T>) -> Arc<[T]> {
        match event {
            SyncEvent::Added(record) => {
                self.upsert(record);
                self.items.sort_by(|a, b| a.view_order(b));
            }
            SyncEvent::Modified(record) => {
                let pos = self
                    .items
                    .iter()
                    .position(|r| r.record_id() == record.record_id());
                match pos {
                    Some(pos) => {
                        let reorder = self.items[pos].view_order(&record) != Ordering::Equal;
                        self.items[pos] = record;
                        if reorder {
                            self.items.sort_by(|a, b| a.view_order(b));
                        }
                    }
                    None => {
                        self.items.push(record);
                        self.items.sort_by(|a, b| a.view_order(b));
                    }
                }
            }
            SyncEvent::Removed(record) => {
                let id = record.record_id();
                self.items.retain(|r| r.record_id() != id);
            }
        }
        self.snapshot = Arc::from(self.items.clone());
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> Arc<[T]> {
        self.snapshot.clone()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|r| r.record_id() == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn upsert(&mut self, record: T) {
        match self
            .items
            .iter_mut()
            .find(|r| r.record_id() == record.record_id())
        {
            Some(slot) => *slot = record,
            None => self.items.push(record),
        }
    }
}

impl<T: ViewRecord> Default for CatalogView<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ObjectStorage;
    use crate::remote::memory::{MemoryCatalog, MemoryObjectStorage};
    use futures::StreamExt;
    use rust_decimal::Decimal;
    use shared::models::{TransactionType, TransactionUpdate};
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        catalog: Arc<MemoryCatalog>,
        storage: Arc<MemoryObjectStorage>,
        sync: CatalogSync,
        assets: AssetCache,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(MemoryCatalog::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let assets = AssetCache::new(dir.path().join("images"), storage.clone());
        assets.prepare().await.unwrap();
        let sync = CatalogSync::new(catalog.clone(), assets.clone(), CancellationToken::new(), 16);
        Fixture {
            _dir: dir,
            catalog,
            storage,
            sync,
            assets,
        }
    }

    fn product(id: &str, name: &str, url: Option<String>) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            description: "A test product".to_string(),
            price: Decimal::new(10, 0),
            quantity: 5,
            date_added: 1,
            cloud_photo_url: url,
            image_path: None,
            updated_by: None,
        }
    }

    async fn next<T>(sub: &mut Subscription<T>) -> SyncEvent<T> {
        tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("timed out waiting for event")
            .expect("subscription ended")
    }

    #[tokio::test]
    async fn test_initial_replay_resolves_images_locally() {
        let fx = fixture().await;
        let stored = fx
            .storage
            .upload("products/p1", b"img".to_vec(), "image/png")
            .await
            .unwrap();
        fx.catalog
            .set_product(&product("p1", "widget", Some(stored.download_url)))
            .await
            .unwrap();
        fx.catalog
            .set_product(&product("p2", "anvil", None))
            .await
            .unwrap();

        let mut sub = fx.sync.subscribe_products().await.unwrap();

        let first = next(&mut sub).await;
        let second = next(&mut sub).await;
        assert_eq!(first.kind(), ChangeKind::Added);
        assert_eq!(first.record().product.name, "anvil");
        assert_eq!(first.record().image, ImageSource::Missing);
        assert_eq!(second.record().product.name, "widget");
        assert_eq!(
            second.record().image,
            ImageSource::Local(fx.assets.path_for("p1").unwrap())
        );
        assert_eq!(fx.storage.download_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_download_falls_back_to_remote_url() {
        let fx = fixture().await;
        let url = "memory://stockroom/products/gone?v=1".to_string();
        fx.catalog
            .set_product(&product("p1", "widget", Some(url.clone())))
            .await
            .unwrap();

        let mut sub = fx.sync.subscribe_products().await.unwrap();
        let event = next(&mut sub).await;
        assert_eq!(event.record().image, ImageSource::Remote(url));
        assert!(!fx.assets.exists("p1").await);
    }

    #[tokio::test]
    async fn test_pending_status_is_exposed() {
        let fx = fixture().await;
        let mut sub = fx.sync.subscribe_products().await.unwrap();

        fx.catalog.set_online(false);
        fx.catalog
            .set_product(&product("p1", "widget", None))
            .await
            .unwrap();
        let added = next(&mut sub).await;
        assert!(added.record().is_pending());

        fx.catalog.set_online(true);
        let confirmed = next(&mut sub).await;
        assert_eq!(confirmed.kind(), ChangeKind::Modified);
        assert_eq!(confirmed.record().status, WriteStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_modify_is_not_reordered_by_synchronizer() {
        let fx = fixture().await;
        fx.catalog.set_product(&product("a", "apple", None)).await.unwrap();
        fx.catalog.set_product(&product("b", "banana", None)).await.unwrap();

        let mut sub = fx.sync.subscribe_products().await.unwrap();
        let mut view = CatalogView::new();
        view.apply(next(&mut sub).await);
        view.apply(next(&mut sub).await);

        fx.catalog.set_product(&product("a", "zucchini", None)).await.unwrap();
        let event = next(&mut sub).await;
        assert_eq!(event.kind(), ChangeKind::Modified);
        assert_eq!(event.record().product.name, "zucchini");

        let snapshot = view.apply(event);
        let names: Vec<&str> = snapshot.iter().map(|i| i.product.name.as_str()).collect();
        assert_eq!(names, vec!["banana", "zucchini"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery_and_is_idempotent() {
        let fx = fixture().await;
        let mut sub = fx.sync.subscribe_products().await.unwrap();
        assert_eq!(fx.catalog.active_watchers(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        fx.catalog.set_product(&product("a", "apple", None)).await.unwrap();
        assert!(sub.next().await.is_none());

        // Worker shuts down and releases the live query
        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.catalog.active_watchers() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("live query not released");
    }

    /// Fetcher whose downloads never finish
    struct StalledFetcher;

    #[async_trait::async_trait]
    impl crate::services::AssetFetcher for StalledFetcher {
        async fn fetch_to(
            &self,
            _url: &str,
            _dest: &std::path::Path,
        ) -> Result<u64, crate::services::AssetCacheError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_query_during_stalled_download() {
        let fx = fixture().await;
        let assets = AssetCache::new(fx.assets.root().join("stalled"), Arc::new(StalledFetcher));
        assets.prepare().await.unwrap();
        let sync = CatalogSync::new(fx.catalog.clone(), assets, CancellationToken::new(), 4);
        fx.catalog
            .set_product(&product("p1", "widget", Some("https://host/p1.png".to_string())))
            .await
            .unwrap();

        let mut sub = sync.subscribe_products().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.catalog.active_watchers(), 1);

        sub.unsubscribe();
        assert!(sub.next().await.is_none());
        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.catalog.active_watchers() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("live query held by a stalled download");
    }

    #[tokio::test]
    async fn test_shutdown_token_ends_subscriptions() {
        let fx = fixture().await;
        let root = CancellationToken::new();
        let sync = CatalogSync::new(fx.catalog.clone(), fx.assets.clone(), root.clone(), 4);
        let mut sub = sync.subscribe_transactions().await.unwrap();

        root.cancel();
        assert!(sub.next().await.is_none());
        assert!(!sub.is_active());
    }

    #[tokio::test]
    async fn test_transactions_stream_newest_first() {
        let fx = fixture().await;
        fx.catalog.set_product(&product("p1", "widget", None)).await.unwrap();

        for (id, at) in [("t1", 100), ("t2", 300), ("t3", 200)] {
            let change = crate::remote::StockChange {
                product_id: "p1".to_string(),
                price: Decimal::new(12, 0),
                quantity: 3,
                updated_by: "alice".to_string(),
                transaction: Transaction {
                    id: id.to_string(),
                    initiated_by: "alice".to_string(),
                    created_at: at,
                    updates: vec![TransactionUpdate {
                        product_id: "p1".to_string(),
                        name: "widget".to_string(),
                        price: Decimal::new(12, 0),
                        quantity: 3,
                    }],
                    kind: TransactionType::Sale,
                },
            };
            fx.catalog.commit_stock_change(&change).await.unwrap();
        }

        let sub = fx.sync.subscribe_transactions().await.unwrap();
        let ids: Vec<String> = sub
            .take(3)
            .map(|e| e.into_record().transaction.id)
            .collect()
            .await;
        assert_eq!(ids, vec!["t2", "t3", "t1"]);
    }

    #[tokio::test]
    async fn test_resubscribe_replays_current_state() {
        let fx = fixture().await;
        fx.catalog.set_product(&product("a", "apple", None)).await.unwrap();

        let mut first = fx.sync.subscribe_products().await.unwrap();
        assert_eq!(next(&mut first).await.record().id(), "a");
        drop(first);

        let mut second = fx.sync.subscribe_products().await.unwrap();
        let replay = next(&mut second).await;
        assert_eq!(replay.kind(), ChangeKind::Added);
        assert_eq!(replay.record().id(), "a");
    }

    fn item(id: &str, name: &str) -> CatalogItem {
        CatalogItem {
            product: product(id, name, None),
            image: ImageSource::Missing,
            status: WriteStatus::Confirmed,
        }
    }

    #[test]
    fn test_view_keeps_name_order_for_adds() {
        let mut view = CatalogView::new();
        for (id, name) in [("1", "pear"), ("2", "apple"), ("3", "mango"), ("4", "banana")] {
            view.apply(SyncEvent::Added(item(id, name)));
        }
        let names: Vec<String> = view
            .snapshot()
            .iter()
            .map(|i| i.product.name.clone())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_view_snapshots_are_immutable() {
        let mut view = CatalogView::new();
        let before = view.apply(SyncEvent::Added(item("1", "apple")));
        let after = view.apply(SyncEvent::Removed(item("1", "apple")));
        assert_eq!(before.len(), 1);
        assert!(after.is_empty());
        assert!(view.is_empty());
    }

    #[test]
    fn test_view_modify_in_place_when_key_unchanged() {
        let mut view = CatalogView::new();
        view.apply(SyncEvent::Added(item("1", "apple")));
        view.apply(SyncEvent::Added(item("2", "banana")));

        let mut updated = item("1", "apple");
        updated.product.quantity = 42;
        let snapshot = view.apply(SyncEvent::Modified(updated));
        assert_eq!(snapshot[0].product.quantity, 42);
        assert_eq!(view.get("1").map(|i| i.product.quantity), Some(42));
        assert_eq!(view.len(), 2);
    }
}
