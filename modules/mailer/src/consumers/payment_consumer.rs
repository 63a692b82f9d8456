//! Sends the confirmation mail when a payment settles.
//!
//! Strictly downstream of the saga: a failed send is logged and the
//! delivery acknowledged, never retried through the broker and never fed
//! back into order state.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use event_broker::{EventHandler, HandlerOutcome};
use event_contracts::SagaEvent;

use crate::mailer::Mailer;

/// Queue this service binds to the order exchange.
pub const PAYMENT_EVENTS_QUEUE: &str = "mailer-service.payment-events";

pub struct PaymentEventsConsumer {
    mailer: Mailer,
}

impl PaymentEventsConsumer {
    pub fn new(mailer: Mailer) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl EventHandler for PaymentEventsConsumer {
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

        if let SagaEvent::PaymentSucceeded(envelope) = event {
            match self
                .mailer
                .send_order_confirmation(
                    &envelope.order_uuid,
                    envelope.payload.amount,
                    &envelope.payload.currency,
                )
                .await
            {
                Ok(()) => {
                    info!(order_uuid = %envelope.order_uuid, "Confirmation mail sent");
                }
                Err(e) => {
                    warn!(
                        order_uuid = %envelope.order_uuid,
                        error = %e,
                        "Failed to send confirmation mail, ignoring"
                    );
                }
            }
        }

        HandlerOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_contracts::{Envelope, PaymentSucceeded};

    /// Mail delivery is fire-and-forget: even with no SMTP server in reach
    /// the delivery is acknowledged.
    #[tokio::test]
    async fn unreachable_smtp_still_acks() {
        let mailer = Mailer::new(
            "127.0.0.1",
            1, // nothing listens here
            "noreply@example.com".to_string(),
            "customer@example.com".to_string(),
        );
        let consumer = PaymentEventsConsumer::new(mailer);

        let event = SagaEvent::PaymentSucceeded(Envelope::new(
            "u-1",
            PaymentSucceeded {
                amount: 400,
                currency: "USD".to_string(),
            },
        ));

        let outcome = consumer
            .handle(event.routing_key(), &event.to_bytes().unwrap())
            .await;
        assert_eq!(outcome, HandlerOutcome::Done);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let mailer = Mailer::new(
            "127.0.0.1",
            1,
            "noreply@example.com".to_string(),
            "customer@example.com".to_string(),
        );
        let consumer = PaymentEventsConsumer::new(mailer);

        let outcome = consumer
            .handle("payment.succeeded", b"not json")
            .await;
        assert_eq!(outcome, HandlerOutcome::Done);
    }
}
