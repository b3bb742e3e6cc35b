//! Aggregates derived from the listing: result count, lowest price and
//! availability

use rust_decimal::Decimal;
use serde::Serialize;

use crate::catalog::InventoryRow;

use super::ViewError;

/// Lowest price among the rows of page 1
///
/// Pages are ordered by ascending price, so only page 1 is guaranteed to hold
/// the global minimum. Asking for it on any other page is a misuse and is
/// rejected rather than answered with a page-local minimum.
pub fn lowest_price(page_index: usize, rows: &[InventoryRow]) -> Result<Option<Decimal>, ViewError> {
    if page_index != 1 {
        return Err(ViewError::LowestPriceOffFirstPage { page_index });
    }
    Ok(rows.iter().map(|row| row.price).min())
}

/// What the product header shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    /// Nothing received yet
    Loading,
    Discontinued,
    OutOfStock,
    InStock { lowest_price: Decimal },
}

/// "Showing `from` to `to` of `total` results"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    pub from: u64,
    pub to: u64,
    pub total: u64,
}

/// Derived values, refreshed as snapshots and counts arrive
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    total: Option<u64>,
    lowest_price: Option<Decimal>,
    first_page_seen: bool,
    out_of_stock: bool,
}

impl Aggregates {
    /// Total rows matching the listing filter, once counted
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn lowest_price(&self) -> Option<Decimal> {
        self.lowest_price
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.out_of_stock
    }

    /// Fold in the rows of the visible page
    ///
    /// Lowest price and out-of-stock only change on page 1; other pages keep
    /// the values of the last page-1 snapshot.
    pub fn on_page(&mut self, page_index: usize, rows: &[InventoryRow]) {
        if page_index != 1 {
            return;
        }
        // page_index is 1 here, so this cannot fail
        self.lowest_price = lowest_price(page_index, rows).unwrap_or_default();
        self.out_of_stock = rows.is_empty();
        self.first_page_seen = true;
    }

    pub fn on_count(&mut self, total: u64) {
        self.total = Some(total);
    }

    pub fn availability(&self, discontinued: bool) -> Availability {
        if discontinued {
            return Availability::Discontinued;
        }
        match (self.first_page_seen, self.lowest_price) {
            (false, _) => Availability::Loading,
            (true, Some(lowest_price)) => Availability::InStock { lowest_price },
            (true, None) => Availability::OutOfStock,
        }
    }

    /// Rows shown on `page_index`, once the total is known
    pub fn range(&self, page_index: usize, page_size: usize) -> Option<PageRange> {
        let total = self.total?;
        if total == 0 {
            return None;
        }
        let page_size = page_size as u64;
        let page_index = page_index as u64;
        Some(PageRange {
            from: (page_index - 1) * page_size + 1,
            to: (page_index * page_size).min(total),
            total,
        })
    }
}
