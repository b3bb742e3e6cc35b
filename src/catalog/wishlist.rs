//! Wishlist membership records, keyed by (user, product)

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::{DocumentStore, Fields, StoreError};

use super::{PRODUCT_REF, WISHLIST};

/// Presence of this record means the product is on the user's wishlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub user_id: Uuid,
    pub product_id: String,
}

impl WishlistEntry {
    pub fn new(user_id: Uuid, product_id: &str) -> Self {
        Self {
            user_id,
            product_id: product_id.to_string(),
        }
    }

    pub fn document_id(&self) -> String {
        format!("{}_{}", self.user_id, self.product_id)
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("user_id".into(), Value::String(self.user_id.to_string()));
        fields.insert(PRODUCT_REF.into(), Value::String(self.product_id.clone()));
        fields
    }
}

/// Wishlist store operations
#[derive(Clone)]
pub struct WishlistStore {
    store: Arc<dyn DocumentStore>,
}

impl WishlistStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Check if the entry exists
    pub async fn contains(&self, entry: &WishlistEntry) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get_one(WISHLIST, &entry.document_id())
            .await?
            .is_some())
    }

    pub async fn add(&self, entry: &WishlistEntry) -> Result<(), StoreError> {
        self.store
            .put(WISHLIST, &entry.document_id(), entry.fields())
            .await
    }

    pub async fn remove(&self, entry: &WishlistEntry) -> Result<(), StoreError> {
        self.store.delete(WISHLIST, &entry.document_id()).await
    }
}
