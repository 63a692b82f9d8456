use sqlx::{Postgres, Transaction};

/// Saga actions recorded in the marker table.
pub const ACTION_DEDUCT: &str = "deduct";
pub const ACTION_RESTOCK: &str = "restock";

/// Record that this saga instance performed the given action.
///
/// Returns `false` when the marker already exists — the caller must skip
/// the stock mutation. Runs inside the caller's transaction so marker and
/// mutation commit or roll back together.
pub async fn try_mark(
    tx: &mut Transaction<'_, Postgres>,
    correlation_id: &str,
    action: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_saga_events (correlation_id, action)
        VALUES ($1, $2)
        ON CONFLICT (correlation_id, action) DO NOTHING
        "#,
    )
    .bind(correlation_id)
    .bind(action)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}
