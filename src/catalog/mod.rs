//! Typed catalog records and the collections they live in

pub mod history;
pub mod inventory;
pub mod products;
pub mod wishlist;

pub use history::HistoryPoint;
pub use inventory::InventoryRow;
pub use products::{Product, ProductStore};
pub use wishlist::{WishlistEntry, WishlistStore};

pub const PRODUCTS: &str = "products";
pub const INVENTORY: &str = "inventory";
pub const HISTORICAL_INVENTORY: &str = "historical_inventory";
pub const WISHLIST: &str = "wishlist";

/// Foreign key field shared by inventory, history and wishlist records
pub const PRODUCT_REF: &str = "product_id";
