//! Products

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{DocumentStore, StoreError};

use super::PRODUCTS;

/// Product as shown on its page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub discontinued: bool,
}

/// Product store operations
#[derive(Clone)]
pub struct ProductStore {
    store: Arc<dyn DocumentStore>,
}

impl ProductStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Get a product by ID
    pub async fn get_product(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
        match self.store.get_one(PRODUCTS, product_id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }
}
