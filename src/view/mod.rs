//! Live product page view
//!
//! A mounted [`ProductView`] owns everything the page shows: the paginated
//! availability listing, its aggregates, the price history and the wishlist
//! toggle. Store deliveries reach it as explicit events tagged with the epoch
//! of the subscription that produced them.

pub mod aggregate;
pub mod card;
pub mod cursor;
pub mod history;
pub mod product;
pub mod sync;
pub mod wishlist;

use std::fmt;

use serde::Serialize;

use crate::store::StoreError;

pub use aggregate::{Aggregates, Availability, PageRange};
pub use card::ProductCard;
pub use cursor::{PageCursor, PageDirection, Paginator, DEFAULT_PAGE_SIZE};
pub use history::PriceHistory;
pub use product::{ProductView, ViewEvent, ViewState};
pub use sync::{Delivery, Epoch, Synchronizer};
pub use wishlist::{Membership, WishlistToggle};

/// View errors
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// Paging past either end. Controls are disabled before this can happen,
    /// so reaching it is a bug in the caller.
    #[error("Cannot page {direction} from page {page_index}")]
    NavigationBounds {
        direction: PageDirection,
        page_index: usize,
    },

    #[error("A page navigation is already in flight")]
    NavigationInFlight,

    #[error("Lowest price is only defined on page 1 (current page {page_index})")]
    LowestPriceOffFirstPage { page_index: usize },

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl ViewError {
    /// Errors the user should see as a dismissible notification
    pub fn notification(&self) -> Option<Notification> {
        match self {
            ViewError::Store(e) => Some(Notification::transient(e.to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Transient,
}

/// Dismissible message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Transient,
            message: message.into(),
        }
    }
}

impl fmt::Display for PageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageDirection::Forward => write!(f, "forward"),
            PageDirection::Backward => write!(f, "backward"),
        }
    }
}
