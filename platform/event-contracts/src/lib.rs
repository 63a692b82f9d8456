//! # Event Contracts
//!
//! Wire contracts for everything that crosses a service boundary on the
//! message bus: the saga envelope, typed event payloads, and the exchange
//! and routing-key names.
//!
//! Consumers decode deliveries through the tagged enums
//! ([`SagaEvent`], [`ProductEvent`]) and dispatch with a single `match`;
//! unknown routing keys decode to `None` and are acknowledged by the caller.

mod envelope;
mod events;

pub use envelope::{validate_envelope_fields, Envelope};
pub use events::{
    InventoryReservationFailed, InventoryReserved, OrderCancelled, OrderCreated, OrderLine,
    PaymentFailed, PaymentSucceeded, ProductEvent, ProductRecord, SagaEvent,
};

/// Exchange names. One durable topic exchange per domain.
pub mod exchange {
    pub const ORDER: &str = "order_exchange";
    pub const PRODUCT: &str = "product_exchange";
}

/// Routing keys on the domain exchanges.
pub mod keys {
    // order domain (order_exchange)
    pub const ORDER_CREATED: &str = "order.created";
    /// Legacy alias for [`ORDER_CREATED`]; accepted on decode, never published.
    pub const ORDER_REQUESTED: &str = "order.requested";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const INVENTORY_RESERVED: &str = "inventory.reserved";
    pub const INVENTORY_RESERVATION_FAILED: &str = "inventory.reservation.failed";
    pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";
    pub const PAYMENT_FAILED: &str = "payment.failed";

    // product domain (product_exchange)
    pub const PRODUCT_CREATED: &str = "product.created";
    pub const PRODUCT_UPDATED: &str = "product.updated";
    pub const PRODUCT_DELETED: &str = "product.deleted";
}
