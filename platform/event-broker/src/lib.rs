//! # Broker Abstraction
//!
//! A platform-level abstraction over the durable topic-exchange message bus
//! that every module publishes to and consumes from.
//!
//! ## Why This Lives in Tier 1
//!
//! The broker is a **shared runtime capability**: modules depend on this
//! crate instead of on each other, and swap the AMQP implementation for the
//! in-memory one in tests without touching handler code.
//!
//! ## Implementations
//!
//! - **AmqpBroker**: production implementation on RabbitMQ (lapin). One
//!   connection per process, a mutex-guarded shared publisher channel, a
//!   dedicated channel per subscription, and a reconnect supervisor.
//! - **MemoryBroker**: in-process implementation with the same routing
//!   semantics and an inspectable dead-letter store, for tests and local dev.
//!
//! ## Delivery contract
//!
//! Delivery is at-least-once. Handlers return a three-valued
//! [`HandlerOutcome`]; the adapter maps `Done` and `Compensated` to an ack
//! and `Poison` to a nack without requeue, which routes the message to the
//! shared dead-letter queue. Retrying is a saga-level concern (re-emitted
//! events), never broker-level redelivery.

mod amqp;
mod memory;
pub mod retry;

pub use amqp::AmqpBroker;
pub use memory::{DeadLetter, MemoryBroker};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Name of the shared dead-letter exchange every work queue routes to.
pub const DLX_EXCHANGE: &str = "dlx";
/// Name of the queue bound to [`DLX_EXCHANGE`], and its routing key.
pub const DLQ_QUEUE: &str = "dlq";

/// Errors that can occur when using the broker
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker used before a connection was established")]
    NotInitialized,

    #[error("failed to publish after retries: {0}")]
    PublishFailed(String),

    #[error("failed to declare broker topology: {0}")]
    Declare(String),

    #[error("failed to start consumer: {0}")]
    Subscribe(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// What a consumer handler did with a delivery.
///
/// `Done` and `Compensated` both acknowledge the message; `Compensated`
/// signals that a business failure was absorbed by emitting a saga-level
/// compensation event. `Poison` rejects without requeue so the message
/// dead-letters for operator inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Done,
    Compensated,
    Poison(String),
}

impl HandlerOutcome {
    /// Whether the adapter should acknowledge the delivery.
    pub fn is_ack(&self) -> bool {
        !matches!(self, HandlerOutcome::Poison(_))
    }
}

/// A consumer callback invoked once per delivery.
///
/// Handlers must be safe to call concurrently and must tolerate reordering
/// of deliveries across queues; only per-queue order is guaranteed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> HandlerOutcome;
}

/// Durable topic-exchange publish/subscribe substrate.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a durable topic exchange. Idempotent.
    async fn declare_topic_exchange(&self, name: &str) -> BrokerResult<()>;

    /// Declare a durable queue routed to the shared DLX on rejection.
    /// Idempotent.
    async fn declare_queue(&self, name: &str) -> BrokerResult<()>;

    /// Bind a queue to an exchange under one or more topic patterns
    /// (`*` matches one segment, `#` matches zero or more). Idempotent.
    async fn bind_queue(&self, queue: &str, exchange: &str, keys: &[&str]) -> BrokerResult<()>;

    /// Publish a JSON payload. Retries transient channel failures up to
    /// 3 attempts with 100–200 ms backoff, then fails with
    /// [`BrokerError::PublishFailed`]. Never waits on consumer acks.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>)
        -> BrokerResult<()>;

    /// Register a handler on a queue. The subscription gets a dedicated
    /// channel with prefetch 10 and manual acknowledgement, and survives
    /// reconnection (the adapter re-registers it automatically).
    async fn consume(&self, queue: &str, handler: Arc<dyn EventHandler>) -> BrokerResult<()>;

    /// Stop the reconnect supervisor and close the underlying connection.
    async fn close(&self);
}

impl fmt::Debug for dyn Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Broker")
    }
}
