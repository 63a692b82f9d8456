use std::sync::Arc;

use event_broker::{Broker, BrokerError};
use event_contracts::{exchange, SagaEvent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Publish a saga event on the order exchange.
pub async fn publish_saga_event(
    broker: &Arc<dyn Broker>,
    event: &SagaEvent,
) -> Result<(), PublishError> {
    let payload = event.to_bytes()?;
    broker
        .publish(exchange::ORDER, event.routing_key(), payload)
        .await?;

    tracing::info!(
        routing_key = %event.routing_key(),
        order_uuid = %event.order_uuid(),
        "Published saga event"
    );
    Ok(())
}
