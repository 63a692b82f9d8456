//! Atomic conditional stock movements.
//!
//! Every batch runs inside one transaction: either every line moves or none
//! does. The conditional UPDATE takes a row-level write lock, so two batches
//! touching the same product serialize and can never double-spend stock.

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use event_contracts::OrderLine;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: i64 },

    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Deduct every line or none. A zero-row conditional update aborts the
/// whole transaction, restoring any lines already deducted in this batch.
pub async fn deduct_batch(pool: &PgPool, items: &[OrderLine]) -> Result<(), StockError> {
    let mut tx = pool.begin().await?;
    deduct_batch_tx(&mut tx, items).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn deduct_batch_tx(
    tx: &mut Transaction<'_, Postgres>,
    items: &[OrderLine],
) -> Result<(), StockError> {
    for line in items {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $2, updated_at = now() \
             WHERE id = $1 AND stock >= $2",
        )
        .bind(line.product_id)
        .bind(line.quantity as i64)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                    .bind(line.product_id)
                    .fetch_one(&mut **tx)
                    .await?;

            return Err(if exists {
                StockError::InsufficientStock {
                    product_id: line.product_id,
                }
            } else {
                StockError::ProductNotFound {
                    product_id: line.product_id,
                }
            });
        }
    }

    Ok(())
}

/// Unconditional restock, transactional. Fails only on I/O.
pub async fn restock_batch(pool: &PgPool, items: &[OrderLine]) -> Result<(), StockError> {
    let mut tx = pool.begin().await?;
    restock_batch_tx(&mut tx, items).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn restock_batch_tx(
    tx: &mut Transaction<'_, Postgres>,
    items: &[OrderLine],
) -> Result<(), StockError> {
    for line in items {
        sqlx::query(
            "UPDATE products SET stock = stock + $2, updated_at = now() WHERE id = $1",
        )
        .bind(line.product_id)
        .bind(line.quantity as i64)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
