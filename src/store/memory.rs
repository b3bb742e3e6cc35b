//! In-memory document store with live queries
//!
//! Used for local runs (optionally seeded from a JSON file) and as the fake
//! backend in tests. Writes re-evaluate every live query on the touched
//! collection and push a new snapshot when its result changed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{
    Document, DocumentStore, Fields, Filter, Query, Snapshot, StoreError, StoreResult,
    Subscription,
};

/// Store operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetOne,
    Subscribe,
    Count,
    Put,
    Delete,
}

struct Watcher {
    query: Query,
    tx: mpsc::UnboundedSender<StoreResult<Snapshot>>,
    last: Vec<Document>,
}

#[derive(Default)]
struct Inner {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    watchers: DashMap<u64, Watcher>,
    next_watcher: AtomicU64,
    faults: Mutex<Vec<Operation>>,
    count_override: Mutex<Option<u64>>,
}

/// Shared handle to an in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "collection": [ { "id": ..., ...fields } ] }`
    pub fn seed(&self, seed: &Value) -> StoreResult<usize> {
        let collections = seed
            .as_object()
            .ok_or_else(|| StoreError::Malformed("seed must be a JSON object".into()))?;

        let mut loaded = 0;
        for (collection, docs) in collections {
            let docs = docs.as_array().ok_or_else(|| {
                StoreError::Malformed(format!("seed collection {collection} must be an array"))
            })?;
            for raw in docs {
                let doc = document_from_row(raw)?;
                self.write(collection, doc.id.clone(), Some(doc));
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Make the next call of `operation` fail with `StoreError::Unavailable`
    pub fn fail_next(&self, operation: Operation) {
        self.inner.faults.lock().push(operation);
    }

    /// Report `count` as this value regardless of the stored documents, the
    /// way a lagging eventually-consistent count would
    pub fn override_count(&self, count: Option<u64>) {
        *self.inner.count_override.lock() = count;
    }

    /// Number of live queries currently registered
    pub fn active_subscriptions(&self) -> usize {
        self.inner.watchers.len()
    }

    fn check_fault(&self, operation: Operation) -> StoreResult<()> {
        let mut faults = self.inner.faults.lock();
        if let Some(pos) = faults.iter().position(|f| *f == operation) {
            faults.remove(pos);
            return Err(StoreError::Unavailable(format!(
                "injected failure for {operation:?}"
            )));
        }
        Ok(())
    }

    fn evaluate(&self, query: &Query) -> Vec<Document> {
        let collections = self.inner.collections.read();
        match collections.get(&query.collection) {
            Some(docs) => query.evaluate(docs.values()),
            None => Vec::new(),
        }
    }

    fn write(&self, collection: &str, id: String, doc: Option<Document>) {
        {
            let mut collections = self.inner.collections.write();
            let docs = collections.entry(collection.to_string()).or_default();
            match doc {
                Some(doc) => {
                    docs.insert(id, doc);
                }
                None => {
                    docs.remove(&id);
                }
            }
        }
        self.notify(collection);
    }

    fn notify(&self, collection: &str) {
        let mut closed = Vec::new();
        for mut entry in self.inner.watchers.iter_mut() {
            if entry.query.collection != collection {
                continue;
            }
            let docs = self.evaluate(&entry.query);
            if docs == entry.last {
                continue;
            }
            entry.last = docs.clone();
            trace!(watcher = *entry.key(), rows = docs.len(), "Pushing snapshot");
            if entry.tx.send(Ok(Snapshot::new(docs))).is_err() {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            self.inner.watchers.remove(&id);
        }
    }
}

fn document_from_row(raw: &Value) -> StoreResult<Document> {
    let mut fields = raw
        .as_object()
        .cloned()
        .ok_or_else(|| StoreError::Malformed("document must be a JSON object".into()))?;
    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(StoreError::Malformed("document is missing an id".into())),
    };
    Ok(Document::new(id, fields))
}

fn unregister(inner: &Weak<Inner>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        if inner.watchers.remove(&id).is_some() {
            debug!(watcher = id, "Live query cancelled");
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_one(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.check_fault(Operation::GetOne)?;
        let collections = self.inner.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        self.check_fault(Operation::Subscribe)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let docs = self.evaluate(&query);
        // The receiver is held below, so the initial send cannot fail
        let _ = tx.send(Ok(Snapshot::new(docs.clone())));

        let id = self.inner.next_watcher.fetch_add(1, Ordering::Relaxed);
        debug!(watcher = id, collection = %query.collection, "Live query registered");
        self.inner.watchers.insert(
            id,
            Watcher {
                query,
                tx,
                last: docs,
            },
        );

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || unregister(&inner, id)))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.check_fault(Operation::Count)?;
        if let Some(count) = *self.inner.count_override.lock() {
            return Ok(count);
        }
        let collections = self.inner.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.check_fault(Operation::Put)?;
        self.write(collection, id.to_string(), Some(Document::new(id, fields)));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check_fault(Operation::Delete)?;
        self.write(collection, id.to_string(), None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortOrder;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn by_product(product: &str) -> Query {
        Query::new("inventory", Filter::eq("product_id", product))
            .order_by("price", SortOrder::Ascending)
    }

    #[tokio::test]
    async fn subscribe_emits_initial_snapshot_then_changes() {
        let store = MemoryStore::new();
        store
            .put("inventory", "a", fields(json!({"product_id": "p1", "price": 10})))
            .await
            .unwrap();

        let mut sub = store.subscribe(by_product("p1")).await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store
            .put("inventory", "b", fields(json!({"product_id": "p1", "price": 5})))
            .await
            .unwrap();
        let second = sub.next().await.unwrap().unwrap();
        let ids: Vec<_> = second.docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn unrelated_writes_do_not_emit() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(by_product("p1")).await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store
            .put("inventory", "x", fields(json!({"product_id": "p2", "price": 1})))
            .await
            .unwrap();
        store
            .put("inventory", "y", fields(json!({"product_id": "p1", "price": 2})))
            .await
            .unwrap();

        // Only the p1 write produced a snapshot
        let next = sub.next().await.unwrap().unwrap();
        assert_eq!(next.docs[0].id, "y");
    }

    #[tokio::test]
    async fn cancel_and_drop_unregister() {
        let store = MemoryStore::new();
        let a = store.subscribe(by_product("p1")).await.unwrap();
        let b = store.subscribe(by_product("p1")).await.unwrap();
        assert_eq!(store.active_subscriptions(), 2);

        a.cancel();
        assert_eq!(store.active_subscriptions(), 1);
        drop(b);
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn injected_faults_fail_once() {
        let store = MemoryStore::new();
        store.fail_next(Operation::Put);
        assert_err!(store.put("wishlist", "w", Fields::new()).await);
        assert_ok!(store.put("wishlist", "w", Fields::new()).await);

        store.fail_next(Operation::Subscribe);
        assert!(store.subscribe(by_product("p1")).await.is_err());
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn count_matches_filter_unless_overridden() {
        let store = MemoryStore::new();
        for (id, product) in [("a", "p1"), ("b", "p1"), ("c", "p2")] {
            store
                .put("inventory", id, fields(json!({"product_id": product, "price": 1})))
                .await
                .unwrap();
        }
        let filter = Filter::eq("product_id", "p1");
        assert_eq!(store.count("inventory", &filter).await.unwrap(), 2);

        store.override_count(Some(9));
        assert_eq!(store.count("inventory", &filter).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn seed_loads_collections() {
        let store = MemoryStore::new();
        let loaded = store
            .seed(&json!({
                "products": [{"id": "p1", "name": "Widget", "description": ""}],
                "inventory": [{"id": 7, "product_id": "p1", "price": "3.50"}]
            }))
            .unwrap();
        assert_eq!(loaded, 2);
        assert!(store.get_one("inventory", "7").await.unwrap().is_some());
        assert!(store.get_one("products", "missing").await.unwrap().is_none());
        assert!(store.seed(&json!([1, 2])).is_err());
    }
}
