//! Reservation and restock with saga-level idempotency.
//!
//! The idempotency marker is inserted in the same transaction as the stock
//! mutation, so a redelivered `order.created` or `order.cancelled` finds the
//! marker committed exactly when the stock movement is committed.

use sqlx::PgPool;

use event_contracts::OrderLine;

use crate::repos::processed_repo::{self, ACTION_DEDUCT, ACTION_RESTOCK};
use crate::repos::stock_repo::{self, StockError};

#[derive(Debug, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    /// This order's deduction already committed; the redelivery is a no-op.
    AlreadyProcessed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RestockOutcome {
    Restocked,
    AlreadyProcessed,
}

/// Deduct the whole batch for an order, exactly once per correlation id.
pub async fn reserve_for_order(
    pool: &PgPool,
    correlation_id: &str,
    items: &[OrderLine],
) -> Result<ReserveOutcome, StockError> {
    let mut tx = pool.begin().await?;

    if !processed_repo::try_mark(&mut tx, correlation_id, ACTION_DEDUCT).await? {
        // Marker insert rolls back with the open transaction; nothing held.
        return Ok(ReserveOutcome::AlreadyProcessed);
    }

    stock_repo::deduct_batch_tx(&mut tx, items).await?;
    tx.commit().await?;

    Ok(ReserveOutcome::Reserved)
}

/// Restock the batch for a cancelled order, exactly once per correlation id.
///
/// Never fails on business grounds: the quantities come from the
/// cancellation payload and are applied unconditionally.
pub async fn restock_for_cancellation(
    pool: &PgPool,
    correlation_id: &str,
    items: &[OrderLine],
) -> Result<RestockOutcome, StockError> {
    let mut tx = pool.begin().await?;

    if !processed_repo::try_mark(&mut tx, correlation_id, ACTION_RESTOCK).await? {
        return Ok(RestockOutcome::AlreadyProcessed);
    }

    stock_repo::restock_batch_tx(&mut tx, items).await?;
    tx.commit().await?;

    Ok(RestockOutcome::Restocked)
}
