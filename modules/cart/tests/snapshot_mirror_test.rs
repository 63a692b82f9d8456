//! The snapshot mirror applied through the product events consumer, and
//! cart clearing on checkout.
//!
//! Requires Postgres. Run with:
//!   DATABASE_URL=postgres://... cargo test -p cart-rs \
//!     --test snapshot_mirror_test -- --ignored

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::get_test_pool;
use serial_test::serial;

use cart_rs::repos::{cart_repo, snapshot_repo};
use cart_rs::{
    OrderEventsConsumer, ProductEventsConsumer, ORDER_EVENTS_QUEUE, PRODUCT_EVENTS_QUEUE,
};
use event_broker::{Broker, MemoryBroker};
use event_contracts::{
    exchange, keys, Envelope, OrderCreated, ProductEvent, ProductRecord, SagaEvent,
};

async fn setup(pool: sqlx::PgPool) -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.declare_topic_exchange(exchange::ORDER).await.unwrap();
    broker.declare_topic_exchange(exchange::PRODUCT).await.unwrap();

    broker.declare_queue(PRODUCT_EVENTS_QUEUE).await.unwrap();
    broker
        .bind_queue(PRODUCT_EVENTS_QUEUE, exchange::PRODUCT, &["product.*"])
        .await
        .unwrap();
    broker
        .consume(
            PRODUCT_EVENTS_QUEUE,
            Arc::new(ProductEventsConsumer::new(pool.clone())),
        )
        .await
        .unwrap();

    broker.declare_queue(ORDER_EVENTS_QUEUE).await.unwrap();
    broker
        .bind_queue(
            ORDER_EVENTS_QUEUE,
            exchange::ORDER,
            &[keys::ORDER_CREATED, keys::ORDER_REQUESTED],
        )
        .await
        .unwrap();
    broker
        .consume(
            ORDER_EVENTS_QUEUE,
            Arc::new(OrderEventsConsumer::new(pool.clone())),
        )
        .await
        .unwrap();

    broker
}

async fn wait_for<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition never held: {}", what);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn product_lifecycle_flows_into_the_mirror() {
    let pool = get_test_pool().await;
    let broker = setup(pool.clone()).await;

    let record = ProductRecord {
        id: 9001,
        name: "widget".to_string(),
        price: 150,
        stock: 20,
    };

    let created = ProductEvent::Created(record.clone());
    broker
        .publish(exchange::PRODUCT, created.routing_key(), created.to_bytes().unwrap())
        .await
        .unwrap();

    wait_for("snapshot created", || async {
        snapshot_repo::get(&pool, 9001).await.unwrap().is_some()
    })
    .await;

    let updated = ProductEvent::Updated(ProductRecord {
        stock: 7,
        ..record.clone()
    });
    broker
        .publish(exchange::PRODUCT, updated.routing_key(), updated.to_bytes().unwrap())
        .await
        .unwrap();

    wait_for("snapshot updated", || async {
        snapshot_repo::get(&pool, 9001)
            .await
            .unwrap()
            .map(|s| s.stock == 7)
            .unwrap_or(false)
    })
    .await;

    let deleted = ProductEvent::Deleted { product_id: 9001 };
    broker
        .publish(exchange::PRODUCT, deleted.routing_key(), deleted.to_bytes().unwrap())
        .await
        .unwrap();

    wait_for("snapshot deleted", || async {
        snapshot_repo::get(&pool, 9001).await.unwrap().is_none()
    })
    .await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn checkout_clears_the_cart() {
    let pool = get_test_pool().await;
    let broker = setup(pool.clone()).await;

    let user_id = 77;
    cart_repo::add_item(&pool, user_id, 1, 2, 100).await.unwrap();
    cart_repo::add_item(&pool, user_id, 2, 1, 200).await.unwrap();
    assert_eq!(cart_repo::list(&pool, user_id).await.unwrap().len(), 2);

    let event = SagaEvent::OrderCreated(Envelope::new(
        "00000000-0000-0000-0000-00000000cafe",
        OrderCreated {
            user_id,
            total: 400,
            currency: "USD".to_string(),
            items: vec![],
        },
    ));
    broker
        .publish(exchange::ORDER, event.routing_key(), event.to_bytes().unwrap())
        .await
        .unwrap();

    wait_for("cart cleared", || async {
        cart_repo::list(&pool, user_id).await.unwrap().is_empty()
    })
    .await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn adding_the_same_product_accumulates_quantity() {
    let pool = get_test_pool().await;

    let user_id = 78;
    cart_repo::clear(&pool, user_id).await.unwrap();
    cart_repo::add_item(&pool, user_id, 5, 1, 100).await.unwrap();
    let item = cart_repo::add_item(&pool, user_id, 5, 2, 100).await.unwrap();

    assert_eq!(item.quantity, 3);
    assert_eq!(item.subtotal, 300);
}
