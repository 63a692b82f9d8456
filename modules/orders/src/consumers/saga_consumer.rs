//! Order-side saga handlers.
//!
//! One queue, three routing keys:
//! - `payment.succeeded` → Pending→Paid through the conditional transition
//!   (a Cancelled order wins the race and the late success is dropped)
//! - `payment.failed` → cancel and emit `order.cancelled{items}` so the
//!   inventory service restocks
//! - `inventory.reservation.failed` → cancel without emitting a
//!   cancellation event (nothing was deducted, nothing to restock)

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use event_broker::{Broker, EventHandler, HandlerOutcome};
use event_contracts::{Envelope, OrderCancelled, OrderLine, SagaEvent};

use crate::events::publisher::publish_saga_event;
use crate::repos::order_repo::{
    self, CompensationOutcome, Order, OrderError, OrderStatus, TransitionOutcome,
};

/// Queue this service binds to the order exchange.
pub const SAGA_EVENTS_QUEUE: &str = "order-service.saga-events";

pub struct SagaEventsConsumer {
    pool: PgPool,
    broker: Arc<dyn Broker>,
}

impl SagaEventsConsumer {
    pub fn new(pool: PgPool, broker: Arc<dyn Broker>) -> Self {
        Self { pool, broker }
    }

    async fn on_payment_succeeded(&self, order_uuid: &str) -> HandlerOutcome {
        match order_repo::update_status_if_not(
            &self.pool,
            order_uuid,
            OrderStatus::Paid,
            &[OrderStatus::Cancelled],
        )
        .await
        {
            Ok(TransitionOutcome::Updated(order)) => {
                info!(order_uuid = %order_uuid, order_id = order.id, "Order marked Paid");
                HandlerOutcome::Done
            }
            Ok(TransitionOutcome::Skipped) => {
                // The reservation failure got here first; the late success
                // must not resurrect the order.
                info!(
                    order_uuid = %order_uuid,
                    "Late payment.succeeded ignored (order already Cancelled)"
                );
                HandlerOutcome::Done
            }
            Ok(TransitionOutcome::NotFound) => {
                warn!(order_uuid = %order_uuid, "payment.succeeded for unknown order");
                HandlerOutcome::Done
            }
            Err(e) => HandlerOutcome::Poison(format!("mark paid: {}", e)),
        }
    }

    async fn on_payment_failed(&self, order_uuid: &str, reason: &str) -> HandlerOutcome {
        match order_repo::compensate_order(&self.pool, order_uuid, reason).await {
            Ok(CompensationOutcome::Cancelled(order)) => {
                // Stock was deducted before payment ran; hand the items to
                // the inventory service so it can restock.
                self.emit_cancellation(&order, reason).await
            }
            Ok(CompensationOutcome::AlreadyCancelled(_)) => {
                info!(order_uuid = %order_uuid, "Duplicate payment.failed ignored");
                HandlerOutcome::Done
            }
            Err(OrderError::NotFound) => {
                warn!(order_uuid = %order_uuid, "payment.failed for unknown order");
                HandlerOutcome::Done
            }
            Err(e) => HandlerOutcome::Poison(format!("cancel order: {}", e)),
        }
    }

    async fn emit_cancellation(&self, order: &Order, reason: &str) -> HandlerOutcome {
        let items: Vec<OrderLine> = order
            .items
            .iter()
            .map(|item| OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();

        let cancelled = SagaEvent::OrderCancelled(Envelope::new(
            order.uuid.clone(),
            OrderCancelled {
                reason: reason.to_string(),
                items,
            },
        ));

        match publish_saga_event(&self.broker, &cancelled).await {
            Ok(()) => HandlerOutcome::Compensated,
            Err(e) => HandlerOutcome::Poison(format!("publish order.cancelled: {}", e)),
        }
    }

    async fn on_reservation_failed(&self, order_uuid: &str, reason: &str) -> HandlerOutcome {
        match order_repo::compensate_order(&self.pool, order_uuid, reason).await {
            Ok(CompensationOutcome::Cancelled(_)) => {
                info!(
                    order_uuid = %order_uuid,
                    reason = %reason,
                    "Order cancelled after failed reservation"
                );
                HandlerOutcome::Compensated
            }
            Ok(CompensationOutcome::AlreadyCancelled(_)) => HandlerOutcome::Done,
            Err(OrderError::NotFound) => {
                warn!(order_uuid = %order_uuid, "reservation failure for unknown order");
                HandlerOutcome::Done
            }
            Err(e) => HandlerOutcome::Poison(format!("cancel order: {}", e)),
        }
    }
}

#[async_trait]
impl EventHandler for SagaEventsConsumer {
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

        match event {
            SagaEvent::PaymentSucceeded(envelope) => {
                self.on_payment_succeeded(&envelope.order_uuid).await
            }
            SagaEvent::PaymentFailed(envelope) => {
                self.on_payment_failed(&envelope.order_uuid, &envelope.payload.reason)
                    .await
            }
            SagaEvent::InventoryReservationFailed(envelope) => {
                self.on_reservation_failed(&envelope.order_uuid, &envelope.payload.reason)
                    .await
            }
            _ => HandlerOutcome::Done,
        }
    }
}
