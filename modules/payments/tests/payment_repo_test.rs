//! Payment store invariants: one row per order, duplicate detection, and
//! terminal-state transitions.
//!
//! Requires Postgres. Run with:
//!   DATABASE_URL=postgres://... cargo test -p payments-rs \
//!     --test payment_repo_test -- --ignored

mod common;

use common::get_test_pool;
use payments_rs::repos::payment_repo::{self, PaymentError, PaymentStatus};
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn second_create_for_same_order_is_a_duplicate() {
    let pool = get_test_pool().await;
    let order_uuid = Uuid::new_v4().to_string();

    let payment = payment_repo::create_pending(&pool, &order_uuid, 400, "USD")
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.provider, "mock");

    let err = payment_repo::create_pending(&pool, &order_uuid, 400, "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Duplicate(_)));

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payments WHERE order_uuid = $1",
    )
    .bind(&order_uuid)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1, "at most one payment row per order");
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn mark_succeeded_is_idempotent() {
    let pool = get_test_pool().await;
    let order_uuid = Uuid::new_v4().to_string();

    payment_repo::create_pending(&pool, &order_uuid, 100, "USD")
        .await
        .unwrap();

    payment_repo::mark_succeeded(&pool, &order_uuid).await.unwrap();
    payment_repo::mark_succeeded(&pool, &order_uuid).await.unwrap();

    let payment = payment_repo::get_by_order_uuid(&pool, &order_uuid)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn succeeded_payment_cannot_become_failed() {
    let pool = get_test_pool().await;
    let order_uuid = Uuid::new_v4().to_string();

    payment_repo::create_pending(&pool, &order_uuid, 100, "USD")
        .await
        .unwrap();
    payment_repo::mark_succeeded(&pool, &order_uuid).await.unwrap();

    // Ignored, not an error: terminal states never move.
    payment_repo::mark_failed(&pool, &order_uuid, "too late")
        .await
        .unwrap();

    let payment = payment_repo::get_by_order_uuid(&pool, &order_uuid)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert!(payment.failure_reason.is_none());
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn transitions_on_missing_rows_report_not_found() {
    let pool = get_test_pool().await;
    let order_uuid = Uuid::new_v4().to_string();

    let err = payment_repo::mark_succeeded(&pool, &order_uuid).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));

    let err = payment_repo::get_by_order_uuid(&pool, &order_uuid)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn mark_failed_records_the_reason() {
    let pool = get_test_pool().await;
    let order_uuid = Uuid::new_v4().to_string();

    payment_repo::create_pending(&pool, &order_uuid, 100, "USD")
        .await
        .unwrap();
    payment_repo::mark_failed(&pool, &order_uuid, "update_status_failed")
        .await
        .unwrap();

    let payment = payment_repo::get_by_order_uuid(&pool, &order_uuid)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_reason.as_deref(), Some("update_status_failed"));
}
