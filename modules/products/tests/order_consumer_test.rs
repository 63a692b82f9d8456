//! Consumer-level behavior over the in-memory broker: reservation events,
//! compensation on shortage, malformed-message policy.
//!
//! Requires Postgres. Run with:
//!   DATABASE_URL=postgres://... cargo test -p products-rs \
//!     --test order_consumer_test -- --ignored

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{get_test_pool, seed_product, stock_of};
use serial_test::serial;
use tokio::sync::Mutex;
use uuid::Uuid;

use event_broker::{Broker, EventHandler, HandlerOutcome, MemoryBroker};
use event_contracts::{exchange, keys, Envelope, OrderCreated, OrderLine, SagaEvent};
use products_rs::cache::ProductCache;
use products_rs::{OrderEventsConsumer, ORDER_EVENTS_QUEUE};

struct Capture {
    seen: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

#[async_trait]
impl EventHandler for Capture {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> HandlerOutcome {
        self.seen
            .lock()
            .await
            .push((routing_key.to_string(), body.to_vec()));
        HandlerOutcome::Done
    }
}

async fn setup(pool: sqlx::PgPool) -> (MemoryBroker, Arc<Mutex<Vec<(String, Vec<u8>)>>>) {
    let broker = MemoryBroker::new();
    broker.declare_topic_exchange(exchange::ORDER).await.unwrap();

    broker.declare_queue(ORDER_EVENTS_QUEUE).await.unwrap();
    broker
        .bind_queue(
            ORDER_EVENTS_QUEUE,
            exchange::ORDER,
            &[keys::ORDER_CREATED, keys::ORDER_REQUESTED, keys::ORDER_CANCELLED],
        )
        .await
        .unwrap();

    let consumer = OrderEventsConsumer::new(
        pool,
        ProductCache::disabled(),
        Arc::new(broker.clone()) as Arc<dyn Broker>,
    );
    broker
        .consume(ORDER_EVENTS_QUEUE, Arc::new(consumer))
        .await
        .unwrap();

    // Capture everything the inventory side emits.
    let seen = Arc::new(Mutex::new(Vec::new()));
    broker.declare_queue("test.capture").await.unwrap();
    broker
        .bind_queue("test.capture", exchange::ORDER, &["inventory.#"])
        .await
        .unwrap();
    broker
        .consume("test.capture", Arc::new(Capture { seen: seen.clone() }))
        .await
        .unwrap();

    (broker, seen)
}

async fn publish_order_created(
    broker: &MemoryBroker,
    order_uuid: &str,
    items: Vec<OrderLine>,
    total: i64,
) {
    let event = SagaEvent::OrderCreated(Envelope::new(
        order_uuid.to_string(),
        OrderCreated {
            user_id: 1,
            total,
            currency: "USD".to_string(),
            items,
        },
    ));
    broker
        .publish(exchange::ORDER, event.routing_key(), event.to_bytes().unwrap())
        .await
        .unwrap();
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
async fn order_created_reserves_and_emits() {
    let pool = get_test_pool().await;
    let p = seed_product(&pool, "consumer-happy", 100, 10).await;
    let (broker, seen) = setup(pool.clone()).await;

    let order_uuid = Uuid::new_v4().to_string();
    publish_order_created(
        &broker,
        &order_uuid,
        vec![OrderLine {
            product_id: p,
            quantity: 2,
        }],
        200,
    )
    .await;

    wait_for("inventory.reserved emitted", || async {
        seen.lock()
            .await
            .iter()
            .any(|(k, _)| k == keys::INVENTORY_RESERVED)
    })
    .await;

    assert_eq!(stock_of(&pool, p).await, 8);

    let seen = seen.lock().await;
    let (key, body) = &seen[0];
    let event = SagaEvent::decode(key, body).unwrap().unwrap();
    assert_eq!(event.order_uuid(), order_uuid);
    assert_eq!(event.correlation_id(), order_uuid);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn shortage_emits_reservation_failed_without_deducting() {
    let pool = get_test_pool().await;
    let p = seed_product(&pool, "consumer-short", 100, 1).await;
    let (broker, seen) = setup(pool.clone()).await;

    publish_order_created(
        &broker,
        &Uuid::new_v4().to_string(),
        vec![OrderLine {
            product_id: p,
            quantity: 5,
        }],
        500,
    )
    .await;

    wait_for("inventory.reservation.failed emitted", || async {
        seen.lock()
            .await
            .iter()
            .any(|(k, _)| k == keys::INVENTORY_RESERVATION_FAILED)
    })
    .await;

    assert_eq!(stock_of(&pool, p).await, 1, "failed reservation must not deduct");
    assert!(broker.dead_letters().await.is_empty());
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn triple_redelivery_deducts_once_and_emits_once() {
    let pool = get_test_pool().await;
    let p = seed_product(&pool, "consumer-dedupe", 100, 9).await;
    let (broker, seen) = setup(pool.clone()).await;

    let order_uuid = Uuid::new_v4().to_string();
    for _ in 0..3 {
        publish_order_created(
            &broker,
            &order_uuid,
            vec![OrderLine {
                product_id: p,
                quantity: 3,
            }],
            300,
        )
        .await;
    }

    wait_for("stock deducted", || async { stock_of(&pool, p).await == 6 }).await;
    // Give the redeliveries time to be (not) processed.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(stock_of(&pool, p).await, 6, "stock must be deducted exactly once");
    let reserved = seen
        .lock()
        .await
        .iter()
        .filter(|(k, _)| k == keys::INVENTORY_RESERVED)
        .count();
    assert_eq!(reserved, 1, "inventory.reserved must be emitted at most once");
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn malformed_message_is_dropped_not_dead_lettered() {
    let pool = get_test_pool().await;
    let (broker, seen) = setup(pool.clone()).await;

    broker
        .publish(exchange::ORDER, keys::ORDER_CREATED, b"not json at all".to_vec())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(broker.dead_letters().await.is_empty());
    assert!(seen.lock().await.is_empty());
}
