//! Concurrent scenario tests: racing writers against one product must never
//! drive stock negative, lose a rating update, or double-apply anything.
//! Optimistic revision checks abort the losing transaction, which retries
//! against fresh state.

use commercecore::{
    commerce_indexes, CoreConfig, CoreError, DocumentStore, InventoryService, Money,
    NewOrderItem, NewProduct, NullAuditLog, OrderService, OrderStatus, ProductName, Quantity,
    RetryConfig, ReviewComment, ReviewRating, ReviewService, StaticAuthContext, StockLevel,
    UserId,
};
use commercecore_memory::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

struct Harness {
    orders: Arc<OrderService>,
    inventory: Arc<InventoryService>,
    reviews: Arc<ReviewService>,
}

/// Plenty of attempts with short delays: conflicts are expected here, and
/// a task must only fail for a real reason (insufficient stock, duplicate).
fn harness() -> Harness {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::with_indexes(commerce_indexes()));
    let audit = Arc::new(NullAuditLog);
    let auth = Arc::new(StaticAuthContext::new(UserId::generate()));
    let config = CoreConfig::new().with_retry(RetryConfig {
        max_attempts: 20,
        base_delay: Duration::from_millis(2),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
    });
    Harness {
        orders: Arc::new(OrderService::new(
            Arc::clone(&store),
            audit.clone(),
            auth.clone(),
            config.clone(),
        )),
        inventory: Arc::new(InventoryService::new(
            Arc::clone(&store),
            audit.clone(),
            auth.clone(),
            config.clone(),
        )),
        reviews: Arc::new(ReviewService::new(store, audit, auth, config)),
    }
}

async fn seed_product(harness: &Harness, stock: u32) -> commercecore::Product {
    harness
        .inventory
        .create_product(NewProduct {
            name: ProductName::try_new("Contended").unwrap(),
            description: None,
            price: Money::from_cents(500).unwrap(),
            initial_stock: StockLevel::new(stock),
        })
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() {
    let harness = harness();
    let product = seed_product(&harness, 10).await;

    let tasks = 8;
    let per_order = 3u32;
    let barrier = Arc::new(Barrier::new(tasks));

    let mut handles = Vec::new();
    for _ in 0..tasks {
        let orders = Arc::clone(&harness.orders);
        let barrier = Arc::clone(&barrier);
        let product_id = product.id.clone();
        handles.push(tokio::spawn(async move {
            let user = UserId::generate();
            barrier.wait().await;
            orders
                .create_order(
                    &user,
                    &[NewOrderItem::new(product_id, Quantity::new(per_order).unwrap())],
                )
                .await
        }));
    }

    let mut successes = 0u32;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CoreError::InsufficientStock { .. }) => {}
            Err(CoreError::ConcurrencyConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let final_stock = harness
        .inventory
        .get_product(&product.id)
        .await
        .unwrap()
        .stock
        .value();

    // Stock never goes negative and exactly accounts for every success.
    assert_eq!(final_stock, 10 - per_order * successes);
    assert!(successes >= 1);
    assert!(successes <= 3, "10 units cannot cover {successes} orders of 3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adjustments_all_apply_exactly_once() {
    let harness = harness();
    // 8 units: even if every -2 lands before any +2, the floor is not hit.
    let product = seed_product(&harness, 8).await;

    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for index in 0..8 {
        let inventory = Arc::clone(&harness.inventory);
        let barrier = Arc::clone(&barrier);
        let product_id = product.id.clone();
        let delta = if index % 2 == 0 { 2 } else { -2 };
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            inventory.adjust_stock(&product_id, delta).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Four +2 and four -2 adjustments cancel out.
    let final_stock = harness
        .inventory
        .get_product(&product.id)
        .await
        .unwrap()
        .stock
        .value();
    assert_eq!(final_stock, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_races_a_new_order_without_losing_stock() {
    let harness = harness();
    let product = seed_product(&harness, 5).await;
    let buyer = UserId::generate();
    let other = UserId::generate();

    let order = harness
        .orders
        .create_order(
            &buyer,
            &[NewOrderItem::new(product.id.clone(), Quantity::new(3).unwrap())],
        )
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));

    let cancel = {
        let orders = Arc::clone(&harness.orders);
        let barrier = Arc::clone(&barrier);
        let order_id = order.id.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            orders.cancel_order(&order_id).await
        })
    };
    let buy = {
        let orders = Arc::clone(&harness.orders);
        let barrier = Arc::clone(&barrier);
        let product_id = product.id.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            orders
                .create_order(
                    &other,
                    &[NewOrderItem::new(product_id, Quantity::new(2).unwrap())],
                )
                .await
        })
    };

    let cancelled = cancel.await.unwrap().unwrap();
    let bought = buy.await.unwrap().unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(bought.status, OrderStatus::Pending);

    // 5 - 3 (order) + 3 (cancel) - 2 (new order) = 3.
    let final_stock = harness
        .inventory
        .get_product(&product.id)
        .await
        .unwrap()
        .stock
        .value();
    assert_eq!(final_stock, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_duplicate_reviews_admit_exactly_one() {
    let harness = harness();
    let product = seed_product(&harness, 5).await;
    let user = UserId::generate();

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for value in [5u8, 1u8] {
        let reviews = Arc::clone(&harness.reviews);
        let barrier = Arc::clone(&barrier);
        let product_id = product.id.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            reviews
                .create_review(
                    &product_id,
                    &user,
                    ReviewRating::try_new(value).unwrap(),
                    ReviewComment::try_new("race").unwrap(),
                )
                .await
        }));
    }

    let mut successes = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CoreError::Duplicate { .. }) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(duplicates, 1);

    let current = harness.inventory.get_product(&product.id).await.unwrap();
    assert_eq!(current.review_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reviews_from_distinct_users_all_count() {
    let harness = harness();
    let product = seed_product(&harness, 5).await;

    let values = [1u8, 2, 3, 4, 5];
    let barrier = Arc::new(Barrier::new(values.len()));
    let mut handles = Vec::new();
    for value in values {
        let reviews = Arc::clone(&harness.reviews);
        let barrier = Arc::clone(&barrier);
        let product_id = product.id.clone();
        handles.push(tokio::spawn(async move {
            let user = UserId::generate();
            barrier.wait().await;
            reviews
                .create_review(
                    &product_id,
                    &user,
                    ReviewRating::try_new(value).unwrap(),
                    ReviewComment::try_new("").unwrap(),
                )
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let current = harness.inventory.get_product(&product.id).await.unwrap();
    assert_eq!(current.review_count, 5);
    assert!((current.rating - 3.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_retries_surface_a_retryable_conflict() {
    // With a single attempt, one of two perfectly aligned writers gets the
    // conflict passed through instead of a silent inconsistency.
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::with_indexes(commerce_indexes()));
    let auth = Arc::new(StaticAuthContext::new(UserId::generate()));
    let config = CoreConfig::new().with_retry(RetryConfig {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
        ..RetryConfig::default()
    });
    let inventory = Arc::new(InventoryService::new(
        Arc::clone(&store),
        Arc::new(NullAuditLog),
        auth,
        config,
    ));

    let product = inventory
        .create_product(NewProduct {
            name: ProductName::try_new("Contended").unwrap(),
            description: None,
            price: Money::from_cents(500).unwrap(),
            initial_stock: StockLevel::new(100),
        })
        .await
        .unwrap();

    // Hammer the same product; with no retries some attempts should lose.
    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let inventory = Arc::clone(&inventory);
        let barrier = Arc::clone(&barrier);
        let product_id = product.id.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            inventory.adjust_stock(&product_id, 1).await
        }));
    }

    let mut successes = 0u32;
    let mut conflicts = 0u32;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err @ CoreError::ConcurrencyConflict { .. }) => {
                assert!(err.is_retryable());
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // Every success applied exactly once; every conflict applied nothing.
    let final_stock = inventory
        .get_product(&product.id)
        .await
        .unwrap()
        .stock
        .value();
    assert_eq!(final_stock, 100 + successes);
    assert_eq!(successes + conflicts, 8);
}
