//! Live product inventory view
//!
//! A product page lists the stores stocking a product, cheapest first, one
//! page at a time. Every visible page is a live query against the document
//! store, and the page's aggregates (lowest price, total offers) follow it.

pub mod app;
pub mod catalog;
pub mod config;
pub mod http;
pub mod store;
pub mod util;
pub mod view;
pub mod ws;
