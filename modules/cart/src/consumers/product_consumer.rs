//! Keeps the product snapshot mirror in step with the catalog.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use event_broker::{EventHandler, HandlerOutcome};
use event_contracts::ProductEvent;

use crate::repos::snapshot_repo;

/// Queue this service binds to the product exchange.
pub const PRODUCT_EVENTS_QUEUE: &str = "cart-service.product-events";

pub struct ProductEventsConsumer {
    pool: PgPool,
}

impl ProductEventsConsumer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventHandler for ProductEventsConsumer {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> HandlerOutcome {
        let event = match ProductEvent::decode(routing_key, body) {
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

        let result = match &event {
            ProductEvent::Created(record) | ProductEvent::Updated(record) => {
                snapshot_repo::upsert(&self.pool, record).await.map(|_| {
                    info!(product_id = record.id, "Snapshot upserted");
                })
            }
            ProductEvent::Deleted { product_id } => {
                snapshot_repo::delete(&self.pool, *product_id).await.map(|_| {
                    info!(product_id = product_id, "Snapshot deleted");
                })
            }
        };

        match result {
            Ok(()) => HandlerOutcome::Done,
            Err(e) => HandlerOutcome::Poison(format!("snapshot write: {}", e)),
        }
    }
}
