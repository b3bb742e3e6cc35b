//! Historical prices

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{Filter, Query};

use super::{HISTORICAL_INVENTORY, PRODUCT_REF};

/// A recorded price of a product at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub id: String,
    pub product_id: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

// Chronological, ties broken by id
impl Ord for HistoryPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HistoryPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Full price history of a product (not paginated)
pub fn by_product(product_id: &str) -> Query {
    Query::new(HISTORICAL_INVENTORY, Filter::eq(PRODUCT_REF, product_id))
}
