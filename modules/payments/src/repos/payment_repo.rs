//! Payment intent persistence. One row per order; the unique index on
//! `order_uuid` is the idempotency anchor for redelivered reservation
//! events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    pub order_uuid: String,
    pub amount: i64,
    pub currency: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment already exists for order {0}")]
    Duplicate(String),

    #[error("payment not found for order {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const PAYMENT_COLUMNS: &str = "id, order_uuid, amount, currency, provider, status, \
                               failure_reason, created_at, updated_at";

/// Insert a new PENDING intent. A second insert for the same order fails
/// with [`PaymentError::Duplicate`] — the consumer treats that as success.
pub async fn create_pending(
    pool: &PgPool,
    order_uuid: &str,
    amount: i64,
    currency: &str,
) -> Result<Payment, PaymentError> {
    let result = sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO payments (order_uuid, amount, currency, provider, status) \
         VALUES ($1, $2, $3, 'mock', 'PENDING') \
         RETURNING {}",
        PAYMENT_COLUMNS
    ))
    .bind(order_uuid)
    .bind(amount)
    .bind(currency)
    .fetch_one(pool)
    .await;

    match result {
        Ok(payment) => Ok(payment),
        Err(e) => {
            if e.as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false)
            {
                Err(PaymentError::Duplicate(order_uuid.to_string()))
            } else {
                Err(e.into())
            }
        }
    }
}

/// PENDING → SUCCEEDED. Re-applying to a SUCCEEDED row is a no-op success;
/// a terminal FAILED row is left untouched.
pub async fn mark_succeeded(pool: &PgPool, order_uuid: &str) -> Result<(), PaymentError> {
    transition(pool, order_uuid, PaymentStatus::Succeeded, None).await
}

/// PENDING → FAILED, recording the reason.
pub async fn mark_failed(
    pool: &PgPool,
    order_uuid: &str,
    reason: &str,
) -> Result<(), PaymentError> {
    transition(pool, order_uuid, PaymentStatus::Failed, Some(reason)).await
}

async fn transition(
    pool: &PgPool,
    order_uuid: &str,
    target: PaymentStatus,
    reason: Option<&str>,
) -> Result<(), PaymentError> {
    let result = sqlx::query(
        "UPDATE payments \
         SET status = $2, failure_reason = $3, updated_at = now() \
         WHERE order_uuid = $1 AND status = 'PENDING'",
    )
    .bind(order_uuid)
    .bind(target)
    .bind(reason)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let current = sqlx::query_scalar::<_, PaymentStatus>(
        "SELECT status FROM payments WHERE order_uuid = $1",
    )
    .bind(order_uuid)
    .fetch_optional(pool)
    .await?;

    match current {
        None => Err(PaymentError::NotFound(order_uuid.to_string())),
        Some(status) if status == target => Ok(()),
        Some(status) => {
            // Terminal states never move; at-least-once delivery makes
            // this reachable and harmless.
            tracing::warn!(
                order_uuid = %order_uuid,
                current = ?status,
                target = ?target,
                "Ignoring transition out of terminal payment state"
            );
            Ok(())
        }
    }
}

pub async fn get_by_order_uuid(pool: &PgPool, order_uuid: &str) -> Result<Payment, PaymentError> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE order_uuid = $1",
        PAYMENT_COLUMNS
    ))
    .bind(order_uuid)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| PaymentError::NotFound(order_uuid.to_string()))
}
