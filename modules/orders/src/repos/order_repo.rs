//! Order persistence and the guarded status transitions the saga relies on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Shipped,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Paid => "Paid",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub total: i64,
    pub status: OrderStatus,
    pub shipping_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

/// One line of a new order; subtotal and total are computed server-side.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid order: {0}")]
    Invalid(String),

    #[error("order not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a conditional status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Updated(Order),
    /// Current status is in the forbidden set; nothing was written.
    Skipped,
    NotFound,
}

/// Result of a compensation; both arms carry the items so the caller can
/// emit `order.cancelled` with them.
#[derive(Debug, Clone, PartialEq)]
pub enum CompensationOutcome {
    Cancelled(Order),
    /// Re-applied to an already-Cancelled order; a no-op success.
    AlreadyCancelled(Order),
}

const ORDER_COLUMNS: &str =
    "id, uuid, user_id, total, status, shipping_address, created_at, updated_at";

async fn load_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as::<_, OrderItem>(
        "SELECT id, order_id, product_id, quantity, price, subtotal \
         FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
}

/// Persist an order and its items in one transaction, status Pending.
pub async fn create_order(
    pool: &PgPool,
    user_id: i64,
    shipping_address: Option<String>,
    items: &[NewOrderItem],
) -> Result<Order, OrderError> {
    if items.is_empty() {
        return Err(OrderError::Invalid("order has no items".to_string()));
    }
    for item in items {
        if item.quantity < 1 {
            return Err(OrderError::Invalid(format!(
                "quantity must be positive for product {}",
                item.product_id
            )));
        }
        if item.price < 0 {
            return Err(OrderError::Invalid(format!(
                "price cannot be negative for product {}",
                item.product_id
            )));
        }
    }

    let total: i64 = items
        .iter()
        .map(|i| i.price * i.quantity as i64)
        .sum();
    let uuid = Uuid::new_v4().to_string();

    let mut tx = pool.begin().await?;

    let mut order = sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (uuid, user_id, total, status, shipping_address) \
         VALUES ($1, $2, $3, 'Pending', $4) \
         RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(&uuid)
    .bind(user_id)
    .bind(total)
    .bind(&shipping_address)
    .fetch_one(&mut *tx)
    .await?;

    for item in items {
        let row = sqlx::query_as::<_, OrderItem>(
            "INSERT INTO order_items (order_id, product_id, quantity, price, subtotal) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, order_id, product_id, quantity, price, subtotal",
        )
        .bind(order.id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .bind(item.price * item.quantity as i64)
        .fetch_one(&mut *tx)
        .await?;
        order.items.push(row);
    }

    tx.commit().await?;

    Ok(order)
}

/// Fetch one order, scoped to its owner.
pub async fn get_by_id(pool: &PgPool, user_id: i64, order_id: i64) -> Result<Order, OrderError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE id = $1 AND user_id = $2",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match order {
        Some(mut order) => {
            order.items = load_items(pool, order.id).await?;
            Ok(order)
        }
        None => Err(OrderError::NotFound),
    }
}

/// All of a user's orders, items preloaded.
pub async fn list_by_user(pool: &PgPool, user_id: i64) -> Result<Vec<Order>, OrderError> {
    let mut orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE user_id = $1 ORDER BY id DESC",
        ORDER_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    for order in &mut orders {
        order.items = load_items(pool, order.id).await?;
    }

    Ok(orders)
}

/// Unconditional transition on the admin path, scoped to the owner.
pub async fn update_status(
    pool: &PgPool,
    user_id: i64,
    order_id: i64,
    status: OrderStatus,
) -> Result<Order, OrderError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $3, updated_at = now() \
         WHERE id = $1 AND user_id = $2 \
         RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(user_id)
    .bind(status)
    .fetch_optional(pool)
    .await?;

    match order {
        Some(mut order) => {
            order.items = load_items(pool, order.id).await?;
            Ok(order)
        }
        None => Err(OrderError::NotFound),
    }
}

/// Saga-path transition, keyed by uuid (the consumer doesn't know the user).
pub async fn update_status_by_uuid(
    pool: &PgPool,
    uuid: &str,
    status: OrderStatus,
) -> Result<Order, OrderError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $2, updated_at = now() \
         WHERE uuid = $1 \
         RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(uuid)
    .bind(status)
    .fetch_optional(pool)
    .await?;

    match order {
        Some(mut order) => {
            order.items = load_items(pool, order.id).await?;
            Ok(order)
        }
        None => Err(OrderError::NotFound),
    }
}

/// Conditional transition: applied only when the current status is not in
/// the forbidden set. This is the guard that keeps a late
/// `payment.succeeded` from resurrecting a Cancelled order.
pub async fn update_status_if_not(
    pool: &PgPool,
    uuid: &str,
    status: OrderStatus,
    forbidden: &[OrderStatus],
) -> Result<TransitionOutcome, OrderError> {
    let forbidden_text: Vec<String> = forbidden.iter().map(|s| s.as_str().to_string()).collect();

    let order = sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $2, updated_at = now() \
         WHERE uuid = $1 AND NOT (status::text = ANY($3)) \
         RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(uuid)
    .bind(status)
    .bind(&forbidden_text)
    .fetch_optional(pool)
    .await?;

    match order {
        Some(mut order) => {
            order.items = load_items(pool, order.id).await?;
            Ok(TransitionOutcome::Updated(order))
        }
        None => {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM orders WHERE uuid = $1)",
            )
            .bind(uuid)
            .fetch_one(pool)
            .await?;

            if exists {
                Ok(TransitionOutcome::Skipped)
            } else {
                Ok(TransitionOutcome::NotFound)
            }
        }
    }
}

/// Cancel an order as saga compensation. Idempotent: cancelling an
/// already-Cancelled order succeeds without writing.
pub async fn compensate_order(
    pool: &PgPool,
    uuid: &str,
    reason: &str,
) -> Result<CompensationOutcome, OrderError> {
    match update_status_if_not(pool, uuid, OrderStatus::Cancelled, &[OrderStatus::Cancelled])
        .await?
    {
        TransitionOutcome::Updated(order) => {
            tracing::info!(order_uuid = %uuid, reason = %reason, "Order cancelled");
            Ok(CompensationOutcome::Cancelled(order))
        }
        TransitionOutcome::Skipped => {
            let order = get_by_uuid(pool, uuid).await?;
            Ok(CompensationOutcome::AlreadyCancelled(order))
        }
        TransitionOutcome::NotFound => Err(OrderError::NotFound),
    }
}

/// Internal read by uuid, items preloaded.
pub async fn get_by_uuid(pool: &PgPool, uuid: &str) -> Result<Order, OrderError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE uuid = $1",
        ORDER_COLUMNS
    ))
    .bind(uuid)
    .fetch_optional(pool)
    .await?;

    match order {
        Some(mut order) => {
            order.items = load_items(pool, order.id).await?;
            Ok(order)
        }
        None => Err(OrderError::NotFound),
    }
}
