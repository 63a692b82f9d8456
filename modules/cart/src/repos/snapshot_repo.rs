//! The cart-side product read model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use event_contracts::ProductRecord;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ProductSnapshot {
    pub product_id: i64,
    pub name: String,
    pub price: i64,
    pub stock: i64,
    pub updated_at: DateTime<Utc>,
}

/// Apply a created/updated product event.
pub async fn upsert(pool: &PgPool, record: &ProductRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO product_snapshots (product_id, name, price, stock, updated_at)
        VALUES ($1, $2, $3, $4, now())
        ON CONFLICT (product_id) DO UPDATE
        SET name = EXCLUDED.name,
            price = EXCLUDED.price,
            stock = EXCLUDED.stock,
            updated_at = now()
        "#,
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(record.price)
    .bind(record.stock)
    .execute(pool)
    .await?;

    Ok(())
}

/// Apply a deleted product event. Missing rows are fine.
pub async fn delete(pool: &PgPool, product_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM product_snapshots WHERE product_id = $1")
        .bind(product_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get(pool: &PgPool, product_id: i64) -> Result<Option<ProductSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, ProductSnapshot>(
        "SELECT product_id, name, price, stock, updated_at \
         FROM product_snapshots WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await
}
