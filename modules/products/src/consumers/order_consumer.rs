//! Saga edge of the inventory engine.
//!
//! Consumes `order.created` (reserve stock) and `order.cancelled` (restock).
//! Business failures turn into `inventory.reservation.failed` and an ack;
//! transient I/O failures dead-letter the delivery.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use event_broker::{Broker, EventHandler, HandlerOutcome};
use event_contracts::{
    Envelope, InventoryReservationFailed, InventoryReserved, OrderCancelled, OrderCreated,
    SagaEvent,
};

use crate::cache::ProductCache;
use crate::events::publisher::publish_saga_event;
use crate::repos::stock_repo::StockError;
use crate::services::inventory_service::{
    self, ReserveOutcome, RestockOutcome,
};

/// Queue this service binds to the order exchange.
pub const ORDER_EVENTS_QUEUE: &str = "product-service.order-events";

pub struct OrderEventsConsumer {
    pool: PgPool,
    cache: ProductCache,
    broker: Arc<dyn Broker>,
}

impl OrderEventsConsumer {
    pub fn new(pool: PgPool, cache: ProductCache, broker: Arc<dyn Broker>) -> Self {
        Self {
            pool,
            cache,
            broker,
        }
    }

    async fn on_order_created(&self, envelope: Envelope<OrderCreated>) -> HandlerOutcome {
        let correlation_id = envelope.correlation_id.clone();
        let order_uuid = envelope.order_uuid.clone();
        let items = envelope.payload.items;

        info!(
            correlation_id = %correlation_id,
            order_uuid = %order_uuid,
            item_count = items.len(),
            "Reserving stock for order"
        );

        match inventory_service::reserve_for_order(&self.pool, &correlation_id, &items).await {
            Ok(ReserveOutcome::AlreadyProcessed) => {
                info!(
                    correlation_id = %correlation_id,
                    "Duplicate order.created ignored (already reserved)"
                );
                HandlerOutcome::Done
            }
            Ok(ReserveOutcome::Reserved) => {
                for line in &items {
                    self.cache.invalidate(line.product_id).await;
                }

                let reserved = SagaEvent::InventoryReserved(Envelope::new(
                    order_uuid.clone(),
                    InventoryReserved {
                        user_id: envelope.payload.user_id,
                        total: envelope.payload.total,
                        currency: envelope.payload.currency,
                    },
                ));

                match publish_saga_event(&self.broker, &reserved).await {
                    Ok(()) => {
                        info!(order_uuid = %order_uuid, "Stock reserved");
                        HandlerOutcome::Done
                    }
                    Err(e) => HandlerOutcome::Poison(format!("publish inventory.reserved: {}", e)),
                }
            }
            Err(StockError::InsufficientStock { product_id }) => {
                self.emit_reservation_failed(
                    &order_uuid,
                    format!("insufficient stock for product {}", product_id),
                )
                .await
            }
            Err(StockError::ProductNotFound { product_id }) => {
                self.emit_reservation_failed(&order_uuid, format!("product {} not found", product_id))
                    .await
            }
            Err(StockError::Database(e)) => {
                HandlerOutcome::Poison(format!("stock deduction: {}", e))
            }
        }
    }

    async fn emit_reservation_failed(&self, order_uuid: &str, reason: String) -> HandlerOutcome {
        warn!(order_uuid = %order_uuid, reason = %reason, "Reservation failed, compensating");

        let failed = SagaEvent::InventoryReservationFailed(Envelope::new(
            order_uuid.to_string(),
            InventoryReservationFailed { reason },
        ));

        match publish_saga_event(&self.broker, &failed).await {
            Ok(()) => HandlerOutcome::Compensated,
            Err(e) => HandlerOutcome::Poison(format!("publish inventory.reservation.failed: {}", e)),
        }
    }

    async fn on_order_cancelled(&self, envelope: Envelope<OrderCancelled>) -> HandlerOutcome {
        let correlation_id = &envelope.correlation_id;

        match inventory_service::restock_for_cancellation(
            &self.pool,
            correlation_id,
            &envelope.payload.items,
        )
        .await
        {
            Ok(RestockOutcome::Restocked) => {
                for line in &envelope.payload.items {
                    self.cache.invalidate(line.product_id).await;
                }
                info!(
                    correlation_id = %correlation_id,
                    reason = %envelope.payload.reason,
                    "Stock restored for cancelled order"
                );
                HandlerOutcome::Done
            }
            Ok(RestockOutcome::AlreadyProcessed) => {
                info!(
                    correlation_id = %correlation_id,
                    "Duplicate order.cancelled ignored (already restocked)"
                );
                HandlerOutcome::Done
            }
            Err(e) => HandlerOutcome::Poison(format!("restock: {}", e)),
        }
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
                // The message will never parse; drop it rather than DLQ it.
                warn!(routing_key = %routing_key, error = %e, "Malformed message dropped");
                return HandlerOutcome::Done;
            }
        };

        match event {
            SagaEvent::OrderCreated(envelope) => self.on_order_created(envelope).await,
            SagaEvent::OrderCancelled(envelope) => self.on_order_cancelled(envelope).await,
            _ => HandlerOutcome::Done,
        }
    }
}
