use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// One cart line. `subtotal` is maintained as `quantity * price` on every
/// write.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct CartItem {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
    pub subtotal: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Add to the cart; a second add of the same product accumulates quantity
/// and takes the latest price.
pub async fn add_item(
    pool: &PgPool,
    user_id: i64,
    product_id: i64,
    quantity: i32,
    price: i64,
) -> Result<CartItem, sqlx::Error> {
    sqlx::query_as::<_, CartItem>(
        r#"
        INSERT INTO cart_items (user_id, product_id, quantity, price, subtotal)
        VALUES ($1, $2, $3, $4, $3 * $4)
        ON CONFLICT (user_id, product_id) DO UPDATE
        SET quantity = cart_items.quantity + EXCLUDED.quantity,
            price = EXCLUDED.price,
            subtotal = (cart_items.quantity + EXCLUDED.quantity) * EXCLUDED.price,
            updated_at = now()
        RETURNING id, user_id, product_id, quantity, price, subtotal, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .bind(price)
    .fetch_one(pool)
    .await
}

pub async fn list(pool: &PgPool, user_id: i64) -> Result<Vec<CartItem>, sqlx::Error> {
    sqlx::query_as::<_, CartItem>(
        "SELECT id, user_id, product_id, quantity, price, subtotal, created_at, updated_at \
         FROM cart_items WHERE user_id = $1 ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn clear(pool: &PgPool, user_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
