//! The product page view
//!
//! One `ProductView` per mounted page. It owns the cursor engine, one
//! synchronizer per feed (listing, count, history) and the wishlist toggle.
//! All mutation happens on the task that owns the view: feeds only push
//! epoch-tagged deliveries, which [`ProductView::handle`] folds in one at a
//! time.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{
    history, inventory, HistoryPoint, InventoryRow, Product, ProductStore, WishlistStore,
    INVENTORY,
};
use crate::store::{Document, DocumentStore, Snapshot, StoreError};

use super::aggregate::{Aggregates, Availability, PageRange};
use super::cursor::{PageOutcome, PageQuery, Paginator};
use super::history::{ChartPoint, PriceHistory};
use super::sync::{Delivery, Synchronizer};
use super::wishlist::{Membership, WishlistToggle};
use super::ViewError;

/// A delivery from one of the view's feeds
#[derive(Debug)]
pub enum ViewEvent {
    Inventory(Delivery<Snapshot>),
    Count(Delivery<u64>),
    History(Delivery<Snapshot>),
}

/// Everything the page renders
#[derive(Debug, Clone, Serialize)]
pub struct ViewState {
    pub product_id: String,
    /// `None` renders "product not available"
    pub product: Option<Product>,
    pub rows: Vec<InventoryRow>,
    pub page_index: usize,
    pub page_size: usize,
    pub total: Option<u64>,
    pub range: Option<PageRange>,
    pub can_page_forward: bool,
    pub can_page_backward: bool,
    pub navigating: bool,
    pub availability: Availability,
    pub wishlist: Membership,
    /// Newest first
    pub price_history: Vec<HistoryPoint>,
    /// Oldest first
    pub chart: Vec<ChartPoint>,
}

pub struct ProductView {
    store: Arc<dyn DocumentStore>,
    product_id: String,
    product: Option<Product>,
    paginator: Paginator,
    rows: Vec<InventoryRow>,
    aggregates: Aggregates,
    inventory: Synchronizer<Snapshot>,
    counts: Synchronizer<u64>,
    history_feed: Synchronizer<Snapshot>,
    history: PriceHistory,
    wishlist: WishlistToggle,
}

impl ProductView {
    /// Read the product and open the listing, count and history feeds
    ///
    /// A missing product mounts a neutral view with no feeds.
    pub async fn mount(
        store: Arc<dyn DocumentStore>,
        user_id: Uuid,
        product_id: &str,
        page_size: usize,
    ) -> Result<Self, ViewError> {
        let product = ProductStore::new(Arc::clone(&store))
            .get_product(product_id)
            .await?;

        let (paginator, first_page) = Paginator::open_first_page(
            INVENTORY,
            inventory::by_product(product_id),
            inventory::PRICE,
            page_size,
        );

        let mut view = Self {
            wishlist: WishlistToggle::new(
                WishlistStore::new(Arc::clone(&store)),
                user_id,
                product_id,
            ),
            store,
            product_id: product_id.to_string(),
            product,
            paginator,
            rows: Vec::new(),
            aggregates: Aggregates::default(),
            inventory: Synchronizer::new("inventory"),
            counts: Synchronizer::new("count"),
            history_feed: Synchronizer::new("history"),
            history: PriceHistory::new(),
        };

        if view.product.is_none() {
            info!(product_id = %product_id, "Product not found, mounting empty view");
            return Ok(view);
        }

        view.inventory.resubscribe(&view.store, first_page.query);
        view.recount();
        view.history_feed
            .resubscribe(&view.store, history::by_product(product_id));

        info!(product_id = %product_id, page_size = view.paginator.page_size(), "Product view mounted");
        Ok(view)
    }

    /// One-shot wishlist read for this mount
    pub async fn reconcile_wishlist(&mut self) -> Result<Membership, ViewError> {
        if self.product.is_none() {
            return Ok(self.wishlist.state());
        }
        Ok(self.wishlist.reconcile().await?)
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn page_index(&self) -> usize {
        self.paginator.page_index()
    }

    pub fn rows(&self) -> &[InventoryRow] {
        &self.rows
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn can_page_forward(&self) -> bool {
        self.paginator.can_page_forward(self.aggregates.total())
    }

    pub fn can_page_backward(&self) -> bool {
        self.paginator.can_page_backward()
    }

    /// Wait for the next delivery from any feed
    pub async fn next_event(&mut self) -> ViewEvent {
        tokio::select! {
            delivery = self.inventory.recv() => ViewEvent::Inventory(delivery),
            delivery = self.counts.recv() => ViewEvent::Count(delivery),
            delivery = self.history_feed.recv() => ViewEvent::History(delivery),
        }
    }

    /// Apply one delivery. Returns whether visible state changed; a store
    /// failure is returned after the view has recovered from it.
    pub fn handle(&mut self, event: ViewEvent) -> Result<bool, ViewError> {
        match event {
            ViewEvent::Inventory(delivery) => match self.inventory.accept(delivery) {
                None => Ok(false),
                Some(Ok(snapshot)) => Ok(self.on_inventory(snapshot)),
                Some(Err(e)) => Err(self.on_inventory_error(e)),
            },
            ViewEvent::Count(delivery) => match self.counts.accept(delivery) {
                None => Ok(false),
                Some(Ok(total)) => {
                    let changed = self.aggregates.total() != Some(total);
                    self.aggregates.on_count(total);
                    Ok(changed)
                }
                Some(Err(e)) => {
                    // Keep the last count; the next snapshot asks again
                    warn!(product_id = %self.product_id, error = %e, "Inventory count failed");
                    Ok(false)
                }
            },
            ViewEvent::History(delivery) => match self.history_feed.accept(delivery) {
                None => Ok(false),
                Some(Ok(snapshot)) => {
                    self.history.replace(&snapshot);
                    Ok(true)
                }
                Some(Err(e)) => {
                    warn!(product_id = %self.product_id, error = %e, "Price history feed failed");
                    Err(e.into())
                }
            },
        }
    }

    /// Wait for and apply the next delivery
    pub async fn process_next(&mut self) -> Result<bool, ViewError> {
        let event = self.next_event().await;
        self.handle(event)
    }

    pub fn page_forward(&mut self) -> Result<(), ViewError> {
        let query = self
            .paginator
            .page_forward(self.aggregates.total())
            .inspect_err(|e| self.log_rejected(e))?;
        self.navigate(query);
        Ok(())
    }

    pub fn page_backward(&mut self) -> Result<(), ViewError> {
        let query = self
            .paginator
            .page_backward()
            .inspect_err(|e| self.log_rejected(e))?;
        self.navigate(query);
        Ok(())
    }

    pub async fn toggle_wishlist(&mut self) -> Result<Membership, ViewError> {
        Ok(self.wishlist.toggle().await?)
    }

    /// Cancel every feed, including ones still being established
    pub fn teardown(&mut self) {
        self.inventory.cancel();
        self.counts.cancel();
        self.history_feed.cancel();
        debug!(product_id = %self.product_id, "Product view torn down");
    }

    pub fn state(&self) -> ViewState {
        let discontinued = self.product.as_ref().is_some_and(|p| p.discontinued);
        let page_index = self.paginator.page_index();
        let page_size = self.paginator.page_size();

        ViewState {
            product_id: self.product_id.clone(),
            product: self.product.clone(),
            rows: self.rows.clone(),
            page_index,
            page_size,
            total: self.aggregates.total(),
            range: self.aggregates.range(page_index, page_size),
            can_page_forward: self.can_page_forward(),
            can_page_backward: self.can_page_backward(),
            navigating: self.paginator.is_pending(),
            availability: self.aggregates.availability(discontinued),
            wishlist: self.wishlist.state(),
            price_history: self.history.newest_first().cloned().collect(),
            chart: self.history.chart_series(),
        }
    }

    fn navigate(&mut self, query: PageQuery) {
        let epoch = self.inventory.resubscribe(&self.store, query.query);
        debug!(
            product_id = %self.product_id,
            page_index = self.paginator.page_index(),
            epoch = %epoch,
            "Page navigation issued"
        );
    }

    fn recount(&mut self) {
        let collection = self.paginator.collection().to_string();
        let filter = self.paginator.filter().clone();
        self.counts.recount(&self.store, &collection, &filter);
    }

    fn on_inventory(&mut self, snapshot: Snapshot) -> bool {
        let changed = match self.paginator.apply(snapshot.docs) {
            PageOutcome::Updated(docs) => {
                self.show(&docs);
                true
            }
            PageOutcome::Moved { direction, docs } => {
                info!(
                    product_id = %self.product_id,
                    page_index = self.paginator.page_index(),
                    %direction,
                    "Page changed"
                );
                self.show(&docs);
                true
            }
            PageOutcome::Realigned { docs, query } => {
                info!(product_id = %self.product_id, "Back on page 1, following the first page");
                self.show(&docs);
                self.inventory.resubscribe(&self.store, query.query);
                true
            }
            PageOutcome::Reverted(query) => {
                debug!(product_id = %self.product_id, "Navigation found an empty page, staying put");
                self.inventory.resubscribe(&self.store, query.query);
                true
            }
            PageOutcome::Reset(query) => {
                info!(product_id = %self.product_id, "Current page emptied, returning to page 1");
                self.inventory.resubscribe(&self.store, query.query);
                true
            }
        };
        self.recount();
        changed
    }

    fn on_inventory_error(&mut self, e: StoreError) -> ViewError {
        warn!(product_id = %self.product_id, error = %e, "Inventory feed failed");
        if let Some(committed) = self.paginator.abandon_pending() {
            // Previous page stays on screen; bring its feed back
            self.inventory.resubscribe(&self.store, committed.query);
        }
        e.into()
    }

    fn show(&mut self, docs: &[Document]) {
        self.rows = docs
            .iter()
            .filter_map(|doc| match doc.decode::<InventoryRow>() {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(doc_id = %doc.id, error = %e, "Skipping malformed inventory row");
                    None
                }
            })
            .collect();
        self.aggregates
            .on_page(self.paginator.page_index(), &self.rows);
    }

    fn log_rejected(&self, e: &ViewError) {
        match e {
            ViewError::NavigationBounds { .. } => error!(
                product_id = %self.product_id,
                error = %e,
                "Navigation past listing bounds ignored"
            ),
            _ => debug!(product_id = %self.product_id, error = %e, "Navigation rejected"),
        }
    }
}

impl Drop for ProductView {
    fn drop(&mut self) {
        self.teardown();
    }
}
