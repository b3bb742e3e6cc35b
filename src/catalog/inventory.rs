//! Inventory rows: one per store carrying a product

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{Filter, Query, SortOrder};

use super::{INVENTORY, PRODUCT_REF};

/// Sort key of the availability listing
pub const PRICE: &str = "price";

/// A store's offer for a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub id: String,
    pub product_id: String,
    pub store_id: String,
    #[serde(default)]
    pub store_name: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: u32,
}

/// All inventory rows of a product
pub fn by_product(product_id: &str) -> Filter {
    Filter::eq(PRODUCT_REF, product_id)
}

/// The cheapest offer for a product
pub fn cheapest(product_id: &str) -> Query {
    Query::new(INVENTORY, by_product(product_id))
        .order_by(PRICE, SortOrder::Ascending)
        .limit(1)
}
