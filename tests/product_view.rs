//! End-to-end behaviour of the product page against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use inventory_tracker::catalog::{INVENTORY, WISHLIST};
use inventory_tracker::store::memory::Operation;
use inventory_tracker::store::{DocumentStore, Fields, MemoryStore};
use inventory_tracker::view::{Availability, Membership, ProductView, ViewError};

const PAGE_SIZE: usize = 4;

/// Product `p1` with `prices.len()` offers, store ids `s01`, `s02`, ...
fn seeded(prices: &[&str]) -> MemoryStore {
    let inventory: Vec<Value> = prices
        .iter()
        .enumerate()
        .map(|(i, price)| {
            json!({
                "id": format!("s{:02}", i + 1),
                "product_id": "p1",
                "store_id": format!("store-{}", i + 1),
                "store_name": format!("Store {}", i + 1),
                "price": price,
                "quantity": 5,
            })
        })
        .collect();

    let memory = MemoryStore::new();
    memory
        .seed(&json!({
            "products": [
                {"id": "p1", "name": "Espresso Machine", "description": "15 bar pump"},
                {"id": "old", "name": "Film Camera", "discontinued": true}
            ],
            "inventory": inventory,
            "historical_inventory": [
                {"id": "h1", "product_id": "p1", "price": "199.00", "timestamp": "2024-01-01T00:00:00Z"},
                {"id": "h3", "product_id": "p1", "price": "179.00", "timestamp": "2024-03-01T00:00:00Z"},
                {"id": "h2", "product_id": "p1", "price": "189.00", "timestamp": "2024-02-01T00:00:00Z"}
            ]
        }))
        .unwrap();
    memory
}

fn ten_offers() -> MemoryStore {
    seeded(&["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"])
}

async fn mount(memory: &MemoryStore, product_id: &str) -> ProductView {
    let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());
    let mut view = ProductView::mount(store, Uuid::new_v4(), product_id, PAGE_SIZE)
        .await
        .unwrap();
    settle(&mut view).await;
    view
}

/// Apply deliveries until the feeds go quiet; returns the surfaced errors
async fn settle(view: &mut ProductView) -> Vec<ViewError> {
    let mut errors = Vec::new();
    while let Ok(result) = timeout(Duration::from_millis(50), view.process_next()).await {
        if let Err(e) = result {
            errors.push(e);
        }
    }
    errors
}

fn prices(view: &ProductView) -> Vec<Decimal> {
    view.rows().iter().map(|row| row.price).collect()
}

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn first_page_lists_cheapest_offers() {
    let memory = ten_offers();
    let view = mount(&memory, "p1").await;

    assert_eq!(view.page_index(), 1);
    assert_eq!(prices(&view), vec![dec!(1), dec!(2), dec!(3), dec!(4)]);
    assert_eq!(view.aggregates().total(), Some(10));
    assert!(view.can_page_forward());
    assert!(!view.can_page_backward());

    let state = view.state();
    assert_eq!(state.availability, Availability::InStock { lowest_price: dec!(1) });
    let range = state.range.unwrap();
    assert_eq!((range.from, range.to, range.total), (1, 4, 10));
}

#[tokio::test]
async fn page_index_tracks_net_displacement() {
    let memory = ten_offers();
    let mut view = mount(&memory, "p1").await;

    view.page_forward().unwrap();
    settle(&mut view).await;
    view.page_forward().unwrap();
    settle(&mut view).await;
    view.page_backward().unwrap();
    settle(&mut view).await;
    view.page_forward().unwrap();
    settle(&mut view).await;

    assert_eq!(view.page_index(), 3);
    assert_eq!(prices(&view), vec![dec!(9), dec!(10)]);
    let range = view.state().range.unwrap();
    assert_eq!((range.from, range.to), (9, 10));
}

#[tokio::test]
async fn forward_then_backward_restores_rows_with_price_ties() {
    // Ties straddle the page boundary; ids keep the order total
    let memory = seeded(&["3", "5", "5", "5", "5", "5", "8"]);
    let mut view = mount(&memory, "p1").await;
    let first: Vec<String> = view.rows().iter().map(|r| r.id.clone()).collect();
    assert_eq!(first, vec!["s01", "s02", "s03", "s04"]);

    view.page_forward().unwrap();
    settle(&mut view).await;
    let second: Vec<String> = view.rows().iter().map(|r| r.id.clone()).collect();
    assert_eq!(second, vec!["s05", "s06", "s07"]);

    view.page_backward().unwrap();
    settle(&mut view).await;
    let back: Vec<String> = view.rows().iter().map(|r| r.id.clone()).collect();
    assert_eq!(back, first);
    assert_eq!(view.page_index(), 1);
}

#[tokio::test]
async fn cheaper_offer_after_paging_back_lands_on_first_page() {
    let memory = seeded(&["1", "2", "3", "4", "5", "6", "7", "8"]);
    let mut view = mount(&memory, "p1").await;

    view.page_forward().unwrap();
    settle(&mut view).await;
    view.page_backward().unwrap();
    settle(&mut view).await;
    assert_eq!(view.page_index(), 1);

    memory
        .put(
            INVENTORY,
            "cheap",
            fields(json!({"product_id": "p1", "store_id": "x", "price": "0.50", "quantity": 1})),
        )
        .await
        .unwrap();
    settle(&mut view).await;

    assert_eq!(prices(&view), vec![dec!(0.50), dec!(1), dec!(2), dec!(3)]);
    assert_eq!(view.aggregates().lowest_price(), Some(dec!(0.50)));
    assert_eq!(
        view.state().availability,
        Availability::InStock { lowest_price: dec!(0.50) }
    );
    assert_eq!(view.aggregates().total(), Some(9));
    assert!(view.can_page_forward());
}

#[tokio::test]
async fn page_reached_backward_stays_live() {
    let memory = seeded(&["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12"]);
    let mut view = mount(&memory, "p1").await;
    for _ in 0..2 {
        view.page_forward().unwrap();
        settle(&mut view).await;
    }
    view.page_backward().unwrap();
    settle(&mut view).await;
    assert_eq!(view.page_index(), 2);
    assert_eq!(prices(&view), vec![dec!(5), dec!(6), dec!(7), dec!(8)]);

    // Repricing a row that stays on this page
    memory
        .put(
            INVENTORY,
            "s06",
            fields(json!({"product_id": "p1", "store_id": "store-6", "price": "6.50", "quantity": 5})),
        )
        .await
        .unwrap();
    settle(&mut view).await;

    assert_eq!(view.page_index(), 2);
    assert_eq!(prices(&view), vec![dec!(5), dec!(6.50), dec!(7), dec!(8)]);
    assert_eq!(view.aggregates().lowest_price(), Some(dec!(1)));

    view.page_backward().unwrap();
    settle(&mut view).await;
    assert_eq!(prices(&view), vec![dec!(1), dec!(2), dec!(3), dec!(4)]);
}

#[tokio::test]
async fn navigation_is_refused_past_either_end() {
    let memory = ten_offers();
    let mut view = mount(&memory, "p1").await;

    assert!(matches!(
        view.page_backward(),
        Err(ViewError::NavigationBounds { page_index: 1, .. })
    ));

    view.page_forward().unwrap();
    settle(&mut view).await;
    view.page_forward().unwrap();
    settle(&mut view).await;

    // 3 * 4 >= 10
    assert!(!view.can_page_forward());
    assert_err!(view.page_forward());
    assert_eq!(view.page_index(), 3);
}

#[tokio::test]
async fn second_navigation_waits_for_the_first() {
    let memory = ten_offers();
    let mut view = mount(&memory, "p1").await;

    view.page_forward().unwrap();
    assert!(!view.can_page_forward());
    assert!(matches!(view.page_forward(), Err(ViewError::NavigationInFlight)));

    settle(&mut view).await;
    assert_eq!(view.page_index(), 2);
    assert!(view.can_page_forward());
}

#[tokio::test]
async fn lowest_price_comes_from_first_page_only() {
    let memory = ten_offers();
    let mut view = mount(&memory, "p1").await;

    view.page_forward().unwrap();
    settle(&mut view).await;
    assert_eq!(view.page_index(), 2);
    assert_eq!(view.aggregates().lowest_price(), Some(dec!(1)));
    assert!(matches!(
        inventory_tracker::view::aggregate::lowest_price(2, view.rows()),
        Err(ViewError::LowestPriceOffFirstPage { page_index: 2 })
    ));
}

#[tokio::test]
async fn no_offers_means_out_of_stock() {
    let memory = seeded(&[]);
    let view = mount(&memory, "p1").await;

    assert!(view.rows().is_empty());
    assert_eq!(view.aggregates().total(), Some(0));
    assert!(view.aggregates().is_out_of_stock());
    assert!(!view.can_page_forward());
    assert!(!view.can_page_backward());

    let state = view.state();
    assert_eq!(state.availability, Availability::OutOfStock);
    assert!(state.range.is_none());
}

#[tokio::test]
async fn empty_navigation_result_leaves_page_in_place() {
    let memory = seeded(&["1", "2", "3", "4"]);
    // Count lags behind and claims more rows than exist
    memory.override_count(Some(10));
    let mut view = mount(&memory, "p1").await;
    assert!(view.can_page_forward());

    view.page_forward().unwrap();
    settle(&mut view).await;

    assert_eq!(view.page_index(), 1);
    assert_eq!(prices(&view), vec![dec!(1), dec!(2), dec!(3), dec!(4)]);
    assert!(!view.state().navigating);

    // The page is still live after the revert
    memory
        .put(
            INVENTORY,
            "cheap",
            fields(json!({"product_id": "p1", "store_id": "x", "price": "0.50", "quantity": 1})),
        )
        .await
        .unwrap();
    settle(&mut view).await;
    assert_eq!(view.rows()[0].price, dec!(0.50));
}

#[tokio::test]
async fn failed_navigation_keeps_rows_and_reports() {
    let memory = ten_offers();
    let mut view = mount(&memory, "p1").await;

    memory.fail_next(Operation::Subscribe);
    view.page_forward().unwrap();
    let errors = settle(&mut view).await;

    assert_eq!(errors.len(), 1);
    assert!(errors[0].notification().is_some());
    assert_eq!(view.page_index(), 1);
    assert_eq!(prices(&view), vec![dec!(1), dec!(2), dec!(3), dec!(4)]);
    assert!(view.can_page_forward());

    // Retry succeeds
    view.page_forward().unwrap();
    settle(&mut view).await;
    assert_eq!(view.page_index(), 2);
}

#[tokio::test]
async fn live_update_refreshes_first_page_and_aggregates() {
    let memory = ten_offers();
    let mut view = mount(&memory, "p1").await;

    memory
        .put(
            INVENTORY,
            "new",
            fields(json!({"product_id": "p1", "store_id": "x", "price": "0.99", "quantity": 2})),
        )
        .await
        .unwrap();
    settle(&mut view).await;

    assert_eq!(prices(&view), vec![dec!(0.99), dec!(1), dec!(2), dec!(3)]);
    assert_eq!(view.aggregates().lowest_price(), Some(dec!(0.99)));
    assert_eq!(view.aggregates().total(), Some(11));
}

#[tokio::test]
async fn emptied_page_returns_to_first() {
    let memory = seeded(&["1", "2", "3", "4", "5", "6"]);
    let mut view = mount(&memory, "p1").await;
    view.page_forward().unwrap();
    settle(&mut view).await;
    assert_eq!(prices(&view), vec![dec!(5), dec!(6)]);

    memory.delete(INVENTORY, "s05").await.unwrap();
    memory.delete(INVENTORY, "s06").await.unwrap();
    settle(&mut view).await;

    assert_eq!(view.page_index(), 1);
    assert_eq!(prices(&view), vec![dec!(1), dec!(2), dec!(3), dec!(4)]);
    assert_eq!(view.aggregates().total(), Some(4));
    assert!(!view.can_page_forward());
}

#[tokio::test]
async fn teardown_releases_every_live_query() {
    let memory = ten_offers();
    let mut view = mount(&memory, "p1").await;
    // Listing and price history
    assert_eq!(memory.active_subscriptions(), 2);

    view.page_forward().unwrap();
    settle(&mut view).await;
    assert_eq!(memory.active_subscriptions(), 2);

    view.teardown();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(memory.active_subscriptions(), 0);
}

#[tokio::test]
async fn dropping_the_view_releases_live_queries() {
    let memory = ten_offers();
    let view = mount(&memory, "p1").await;
    drop(view);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(memory.active_subscriptions(), 0);
}

#[tokio::test]
async fn missing_product_mounts_neutral_view() {
    let memory = ten_offers();
    let view = mount(&memory, "ghost").await;

    let state = view.state();
    assert!(state.product.is_none());
    assert!(state.rows.is_empty());
    assert!(!state.can_page_forward);
    assert_eq!(memory.active_subscriptions(), 0);
}

#[tokio::test]
async fn discontinued_product_hides_price() {
    let memory = ten_offers();
    let view = mount(&memory, "old").await;
    assert_eq!(view.state().availability, Availability::Discontinued);
}

#[tokio::test]
async fn price_history_is_listed_newest_first() {
    let memory = ten_offers();
    let view = mount(&memory, "p1").await;

    let state = view.state();
    let listed: Vec<&str> = state.price_history.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(listed, vec!["h3", "h2", "h1"]);
    let chart: Vec<Decimal> = state.chart.iter().map(|p| p.price).collect();
    assert_eq!(chart, vec![dec!(199.00), dec!(189.00), dec!(179.00)]);
}

#[tokio::test]
async fn wishlist_toggle_flips_after_write() {
    let memory = ten_offers();
    let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());
    let user = Uuid::new_v4();

    let mut view = ProductView::mount(Arc::clone(&store), user, "p1", PAGE_SIZE)
        .await
        .unwrap();
    assert_eq!(assert_ok!(view.reconcile_wishlist().await), Membership::NotMember);
    assert_eq!(assert_ok!(view.toggle_wishlist().await), Membership::Member);

    let doc_id = format!("{user}_p1");
    assert!(memory.get_one(WISHLIST, &doc_id).await.unwrap().is_some());

    // A failed delete leaves the item on the wishlist
    memory.fail_next(Operation::Delete);
    assert_err!(view.toggle_wishlist().await);
    assert_eq!(view.state().wishlist, Membership::Member);
    drop(view);

    let mut remounted = ProductView::mount(store, user, "p1", PAGE_SIZE).await.unwrap();
    assert_eq!(assert_ok!(remounted.reconcile_wishlist().await), Membership::Member);
    assert_eq!(assert_ok!(remounted.toggle_wishlist().await), Membership::NotMember);
    assert!(memory.get_one(WISHLIST, &doc_id).await.unwrap().is_none());
}
