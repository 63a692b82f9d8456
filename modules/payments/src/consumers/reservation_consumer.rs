//! Payment-side saga handler.
//!
//! `inventory.reserved` creates a PENDING intent, runs the (simulated)
//! authorization, and settles with `payment.succeeded` or `payment.failed`.
//! A redelivered reservation hits the unique index, is swallowed, and emits
//! nothing — the first delivery already settled the saga.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use event_broker::{Broker, EventHandler, HandlerOutcome};
use event_contracts::{Envelope, PaymentFailed, PaymentSucceeded, SagaEvent};

use crate::events::publisher::publish_saga_event;
use crate::repos::payment_repo::{self, PaymentError};

/// Queue this service binds to the order exchange.
pub const ORDER_EVENTS_QUEUE: &str = "payment-service.order-events";

/// The mock provider answers after a short delay and always authorizes.
const AUTHORIZATION_DELAY: Duration = Duration::from_millis(150);

pub struct ReservationConsumer {
    pool: PgPool,
    broker: Arc<dyn Broker>,
}

impl ReservationConsumer {
    pub fn new(pool: PgPool, broker: Arc<dyn Broker>) -> Self {
        Self { pool, broker }
    }

    async fn on_inventory_reserved(
        &self,
        order_uuid: &str,
        total: i64,
        currency: &str,
    ) -> HandlerOutcome {
        info!(
            order_uuid = %order_uuid,
            amount = total,
            "Processing reservation, creating payment intent"
        );

        match payment_repo::create_pending(&self.pool, order_uuid, total, currency).await {
            Ok(_) => {}
            Err(PaymentError::Duplicate(_)) => {
                // The first delivery already settled this saga; emitting
                // again would double-publish the settlement.
                info!(
                    order_uuid = %order_uuid,
                    "Duplicate inventory.reserved ignored (payment already exists)"
                );
                return HandlerOutcome::Done;
            }
            Err(e) => return HandlerOutcome::Poison(format!("create payment intent: {}", e)),
        }

        // Simulated provider authorization.
        tokio::time::sleep(AUTHORIZATION_DELAY).await;

        if let Err(e) = payment_repo::mark_succeeded(&self.pool, order_uuid).await {
            warn!(order_uuid = %order_uuid, error = %e, "Authorization bookkeeping failed");
            return self
                .emit_payment_failed(order_uuid, "update_status_failed")
                .await;
        }

        let succeeded = SagaEvent::PaymentSucceeded(Envelope::new(
            order_uuid.to_string(),
            PaymentSucceeded {
                amount: total,
                currency: currency.to_string(),
            },
        ));

        match publish_saga_event(&self.broker, &succeeded).await {
            Ok(()) => {
                info!(order_uuid = %order_uuid, amount = total, "Payment succeeded");
                HandlerOutcome::Done
            }
            Err(e) => HandlerOutcome::Poison(format!("publish payment.succeeded: {}", e)),
        }
    }

    async fn emit_payment_failed(&self, order_uuid: &str, reason: &str) -> HandlerOutcome {
        if let Err(e) = payment_repo::mark_failed(&self.pool, order_uuid, reason).await {
            warn!(order_uuid = %order_uuid, error = %e, "Failed to record payment failure");
        }

        let failed = SagaEvent::PaymentFailed(Envelope::new(
            order_uuid.to_string(),
            PaymentFailed {
                reason: reason.to_string(),
            },
        ));

        match publish_saga_event(&self.broker, &failed).await {
            Ok(()) => HandlerOutcome::Compensated,
            Err(e) => HandlerOutcome::Poison(format!("publish payment.failed: {}", e)),
        }
    }
}

#[async_trait]
impl EventHandler for ReservationConsumer {
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
            SagaEvent::InventoryReserved(envelope) => {
                self.on_inventory_reserved(
                    &envelope.order_uuid,
                    envelope.payload.total,
                    &envelope.payload.currency,
                )
                .await
            }
            _ => HandlerOutcome::Done,
        }
    }
}
