//! Price history of a product, kept in timestamp order

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sorted_vec::SortedVec;
use tracing::warn;

use crate::catalog::HistoryPoint;
use crate::store::Snapshot;

/// One point of the price chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct PriceHistory {
    points: SortedVec<HistoryPoint>,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceHistory {
    pub fn new() -> Self {
        Self {
            points: SortedVec::new(),
        }
    }

    /// Replace the history with a new snapshot of the feed
    pub fn replace(&mut self, snapshot: &Snapshot) {
        let points = snapshot
            .docs
            .iter()
            .filter_map(|doc| match doc.decode::<HistoryPoint>() {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!(doc_id = %doc.id, error = %e, "Skipping malformed history point");
                    None
                }
            })
            .collect();
        self.points = SortedVec::from_unsorted(points);
    }

    /// Listing order: most recent first
    pub fn newest_first(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter().rev()
    }

    /// Chart order: oldest first
    pub fn chart_series(&self) -> Vec<ChartPoint> {
        self.points
            .iter()
            .map(|p| ChartPoint {
                timestamp: p.timestamp,
                price: p.price,
            })
            .collect()
    }
}
