//! Live result synchronizer
//!
//! Keeps at most one store feed alive per logical view. Every replacement
//! cancels the previous feed first, then bumps the epoch; deliveries carry the
//! epoch they were produced under and anything older than the current epoch is
//! dropped on arrival.
//!
//! Aborting a feed task only marks it; the task (and the store subscription it
//! owns) is dropped whenever the runtime next reaches it. Live-query feeds
//! therefore hold a per-synchronizer lease for as long as their subscription
//! exists, and a replacement feed waits for that lease before it subscribes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::store::{DocumentStore, Filter, Query, Snapshot, StoreResult};

/// Identifies one subscription instance of a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Epoch(u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A store result tagged with the epoch that requested it
#[derive(Debug)]
pub struct Delivery<T> {
    pub epoch: Epoch,
    pub result: StoreResult<T>,
}

/// Single-feed synchronizer for one logical view
pub struct Synchronizer<T> {
    name: &'static str,
    epoch: Epoch,
    task: Option<JoinHandle<()>>,
    /// Held by the live-query feed while its subscription is registered
    lease: Arc<Mutex<()>>,
    tx: mpsc::UnboundedSender<Delivery<T>>,
    rx: mpsc::UnboundedReceiver<Delivery<T>>,
}

impl<T: Send + 'static> Synchronizer<T> {
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            epoch: Epoch::default(),
            task: None,
            lease: Arc::new(Mutex::new(())),
            tx,
            rx,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Cancel the current feed, including one still being established
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(feed = self.name, epoch = %self.epoch, "Feed cancelled");
        }
    }

    /// Cancel the current feed and start `feed` under a fresh epoch
    fn replace<F, Fut>(&mut self, feed: F) -> Epoch
    where
        F: FnOnce(Epoch, mpsc::UnboundedSender<Delivery<T>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.epoch = self.epoch.next();
        self.task = Some(tokio::spawn(feed(self.epoch, self.tx.clone())));
        self.epoch
    }

    /// Next delivery from any epoch; pass it through [`Self::accept`]
    pub async fn recv(&mut self) -> Delivery<T> {
        match self.rx.recv().await {
            Some(delivery) => delivery,
            // The sender half lives in `self`, so the channel never closes
            None => std::future::pending().await,
        }
    }

    /// Unwrap a delivery of the current epoch; stale ones are dropped
    pub fn accept(&self, delivery: Delivery<T>) -> Option<StoreResult<T>> {
        if delivery.epoch != self.epoch {
            trace!(
                feed = self.name,
                stale = %delivery.epoch,
                current = %self.epoch,
                "Dropping stale delivery"
            );
            return None;
        }
        Some(delivery.result)
    }
}

impl Synchronizer<Snapshot> {
    /// Replace the live query; the previous subscription is cancelled first
    pub fn resubscribe(&mut self, store: &Arc<dyn DocumentStore>, query: Query) -> Epoch {
        let store = Arc::clone(store);
        let name = self.name;
        let lease = Arc::clone(&self.lease);
        self.replace(move |epoch, tx| async move {
            // Declared before the subscription so it is released after it
            let _lease = lease.lock_owned().await;
            let mut subscription = match store.subscribe(query).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let _ = tx.send(Delivery {
                        epoch,
                        result: Err(e),
                    });
                    return;
                }
            };
            while let Some(result) = subscription.next().await {
                if tx.send(Delivery { epoch, result }).is_err() {
                    break;
                }
            }
            debug!(feed = name, epoch = %epoch, "Store closed live query");
        })
    }
}

impl Synchronizer<u64> {
    /// Request a fresh count; an older count still in flight is abandoned
    pub fn recount(
        &mut self,
        store: &Arc<dyn DocumentStore>,
        collection: &str,
        filter: &Filter,
    ) -> Epoch {
        let store = Arc::clone(store);
        let collection = collection.to_string();
        let filter = filter.clone();
        self.replace(move |epoch, tx| async move {
            let result = store.count(&collection, &filter).await;
            let _ = tx.send(Delivery { epoch, result });
        })
    }
}

impl<T> Drop for Synchronizer<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
