//! Clears a user's cart once their order is created.
//!
//! Fire-and-forget: a failed clear is logged and acknowledged — a stale
//! cart is a nuisance, not a saga participant.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use event_broker::{EventHandler, HandlerOutcome};
use event_contracts::SagaEvent;

use crate::repos::cart_repo;

/// Queue this service binds to the order exchange.
pub const ORDER_EVENTS_QUEUE: &str = "cart-service.order-events";

pub struct OrderEventsConsumer {
    pool: PgPool,
}

impl OrderEventsConsumer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventHandler for OrderEventsConsumer {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> HandlerOutcome {
        let event = match SagaEvent::decode(routing_key, body) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(routing_key = %routing_key, "Ignoring unrelated routing key");
                return HandlerOutcome::Done;
            }
            Err(e) => {
                warn!(routing_key = %routing_key, error = %e, "Malformed message dropped");
                return HandlerOutcome::Done;
            }
        };

        if let SagaEvent::OrderCreated(envelope) = event {
            let user_id = envelope.payload.user_id;
            match cart_repo::clear(&self.pool, user_id).await {
                Ok(removed) => {
                    info!(
                        user_id = user_id,
                        order_uuid = %envelope.order_uuid,
                        removed = removed,
                        "Cart cleared after checkout"
                    );
                }
                Err(e) => {
                    warn!(user_id = user_id, error = %e, "Cart clear failed, ignoring");
                }
            }
        }

        HandlerOutcome::Done
    }
}
