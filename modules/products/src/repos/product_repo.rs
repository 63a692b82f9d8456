use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;

/// Product row, the single source of truth for stock.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted from the admin surface.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub price: i64,
    pub stock: i64,
}

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("product not found: {0}")]
    NotFound(i64),

    #[error("invalid product: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn validate(input: &ProductInput) -> Result<(), ProductError> {
    if input.name.trim().is_empty() {
        return Err(ProductError::Invalid("name cannot be empty".to_string()));
    }
    if input.price < 0 {
        return Err(ProductError::Invalid("price cannot be negative".to_string()));
    }
    if input.stock < 0 {
        return Err(ProductError::Invalid("stock cannot be negative".to_string()));
    }
    Ok(())
}

pub async fn create(pool: &PgPool, input: &ProductInput) -> Result<Product, ProductError> {
    validate(input)?;

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (name, price, stock)
        VALUES ($1, $2, $3)
        RETURNING id, name, price, stock, created_at, updated_at
        "#,
    )
    .bind(&input.name)
    .bind(input.price)
    .bind(input.stock)
    .fetch_one(pool)
    .await?;

    Ok(product)
}

pub async fn list(pool: &PgPool) -> Result<Vec<Product>, ProductError> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT id, name, price, stock, created_at, updated_at FROM products ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(products)
}

pub async fn get(pool: &PgPool, id: i64) -> Result<Product, ProductError> {
    sqlx::query_as::<_, Product>(
        "SELECT id, name, price, stock, created_at, updated_at FROM products WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(ProductError::NotFound(id))
}

pub async fn update(pool: &PgPool, id: i64, input: &ProductInput) -> Result<Product, ProductError> {
    validate(input)?;

    sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET name = $2, price = $3, stock = $4, updated_at = now()
        WHERE id = $1
        RETURNING id, name, price, stock, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(&input.name)
    .bind(input.price)
    .bind(input.stock)
    .fetch_optional(pool)
    .await?
    .ok_or(ProductError::NotFound(id))
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<(), ProductError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ProductError::NotFound(id));
    }
    Ok(())
}
