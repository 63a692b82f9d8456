//! Consumer-level idempotency: a redelivered `inventory.reserved` must not
//! create a second intent or a second settlement event.
//!
//! Requires Postgres. Run with:
//!   DATABASE_URL=postgres://... cargo test -p payments-rs \
//!     --test reservation_consumer_test -- --ignored

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::get_test_pool;
use serial_test::serial;
use tokio::sync::Mutex;
use uuid::Uuid;

use event_broker::{Broker, EventHandler, HandlerOutcome, MemoryBroker};
use event_contracts::{exchange, keys, Envelope, InventoryReserved, SagaEvent};
use payments_rs::repos::payment_repo::{self, PaymentStatus};
use payments_rs::{ReservationConsumer, ORDER_EVENTS_QUEUE};

struct Capture {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventHandler for Capture {
    async fn handle(&self, routing_key: &str, _body: &[u8]) -> HandlerOutcome {
        self.seen.lock().await.push(routing_key.to_string());
        HandlerOutcome::Done
    }
}

async fn setup(pool: sqlx::PgPool) -> (MemoryBroker, Arc<Mutex<Vec<String>>>) {
    let broker = MemoryBroker::new();
    broker.declare_topic_exchange(exchange::ORDER).await.unwrap();

    broker.declare_queue(ORDER_EVENTS_QUEUE).await.unwrap();
    broker
        .bind_queue(ORDER_EVENTS_QUEUE, exchange::ORDER, &[keys::INVENTORY_RESERVED])
        .await
        .unwrap();

    let consumer = ReservationConsumer::new(pool, Arc::new(broker.clone()) as Arc<dyn Broker>);
    broker
        .consume(ORDER_EVENTS_QUEUE, Arc::new(consumer))
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    broker.declare_queue("test.capture").await.unwrap();
    broker
        .bind_queue("test.capture", exchange::ORDER, &["payment.*"])
        .await
        .unwrap();
    broker
        .consume("test.capture", Arc::new(Capture { seen: seen.clone() }))
        .await
        .unwrap();

    (broker, seen)
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn reservation_settles_exactly_once_under_redelivery() {
    let pool = get_test_pool().await;
    let (broker, seen) = setup(pool.clone()).await;

    let order_uuid = Uuid::new_v4().to_string();
    let event = SagaEvent::InventoryReserved(Envelope::new(
        order_uuid.clone(),
        InventoryReserved {
            user_id: 1,
            total: 400,
            currency: "USD".to_string(),
        },
    ));

    // Deliver the same reservation twice.
    for _ in 0..2 {
        broker
            .publish(exchange::ORDER, event.routing_key(), event.to_bytes().unwrap())
            .await
            .unwrap();
    }

    // Authorization takes 150 ms; give both deliveries room to finish.
    for _ in 0..200 {
        if !seen.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    let payment = payment_repo::get_by_order_uuid(&pool, &order_uuid)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.amount, 400);

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payments WHERE order_uuid = $1",
    )
    .bind(&order_uuid)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1, "exactly one payment row");

    let seen = seen.lock().await;
    let succeeded = seen.iter().filter(|k| *k == keys::PAYMENT_SUCCEEDED).count();
    assert_eq!(succeeded, 1, "exactly one payment.succeeded");
    assert!(broker.dead_letters().await.is_empty());
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn malformed_reservation_is_dropped() {
    let pool = get_test_pool().await;
    let (broker, seen) = setup(pool.clone()).await;

    broker
        .publish(exchange::ORDER, keys::INVENTORY_RESERVED, b"garbage".to_vec())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(broker.dead_letters().await.is_empty());
    assert!(seen.lock().await.is_empty());
}
