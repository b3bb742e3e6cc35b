//! Catalog card: a product with its cheapest current offer

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::catalog::{inventory, InventoryRow, Product, ProductStore};
use crate::store::{DocumentStore, Snapshot, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCard {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    /// Price of the cheapest offer
    pub price: Option<Decimal>,
    /// Quantity held by the store with the cheapest offer
    pub quantity: Option<u32>,
    pub out_of_stock: bool,
}

impl ProductCard {
    /// Build from a snapshot of [`inventory::cheapest`]
    pub fn from_snapshot(product: Product, snapshot: &Snapshot) -> Result<Self, StoreError> {
        let cheapest: Option<InventoryRow> = match snapshot.docs.first() {
            Some(doc) => Some(doc.decode()?),
            None => None,
        };
        Ok(Self {
            id: product.id,
            name: product.name,
            image: product.image,
            price: cheapest.as_ref().map(|row| row.price),
            quantity: cheapest.as_ref().map(|row| row.quantity),
            out_of_stock: cheapest.is_none(),
        })
    }

    /// One-shot card read; `None` when the product does not exist
    pub async fn load(
        store: &Arc<dyn DocumentStore>,
        product_id: &str,
    ) -> Result<Option<Self>, StoreError> {
        let Some(product) = ProductStore::new(Arc::clone(store))
            .get_product(product_id)
            .await?
        else {
            return Ok(None);
        };

        let mut subscription = store.subscribe(inventory::cheapest(product_id)).await?;
        let first = subscription.next().await;
        subscription.cancel();

        let snapshot = first.unwrap_or_else(|| {
            Err(StoreError::Unavailable("live query closed before first snapshot".into()))
        })?;
        Self::from_snapshot(product, &snapshot).map(Some)
    }
}
