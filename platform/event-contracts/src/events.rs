//! Typed event payloads and the tagged decode enums.

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::keys;

/// One order line as carried on the bus. Quantity is always >= 1; prices
/// travel separately (payment works from the envelope total).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: i64,
    pub quantity: i32,
}

/// `order.created` — emitted by the order service after the Pending row and
/// its items are committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub user_id: i64,
    pub total: i64,
    pub currency: String,
    pub items: Vec<OrderLine>,
}

/// `inventory.reserved` — stock was deducted for the whole order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReserved {
    pub user_id: i64,
    pub total: i64,
    pub currency: String,
}

/// `inventory.reservation.failed` — nothing was committed; the order must
/// cancel without restocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReservationFailed {
    pub reason: String,
}

/// `payment.succeeded`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    pub amount: i64,
    pub currency: String,
}

/// `payment.failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub reason: String,
}

/// `order.cancelled` — carries the order lines so the inventory service can
/// restock without reaching into another service's database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub reason: String,
    pub items: Vec<OrderLine>,
}

/// Every coordinating event of the fulfillment saga, tagged by routing key.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaEvent {
    OrderCreated(Envelope<OrderCreated>),
    InventoryReserved(Envelope<InventoryReserved>),
    InventoryReservationFailed(Envelope<InventoryReservationFailed>),
    PaymentSucceeded(Envelope<PaymentSucceeded>),
    PaymentFailed(Envelope<PaymentFailed>),
    OrderCancelled(Envelope<OrderCancelled>),
}

impl SagaEvent {
    /// The routing key this event is published under.
    pub fn routing_key(&self) -> &'static str {
        match self {
            SagaEvent::OrderCreated(_) => keys::ORDER_CREATED,
            SagaEvent::InventoryReserved(_) => keys::INVENTORY_RESERVED,
            SagaEvent::InventoryReservationFailed(_) => keys::INVENTORY_RESERVATION_FAILED,
            SagaEvent::PaymentSucceeded(_) => keys::PAYMENT_SUCCEEDED,
            SagaEvent::PaymentFailed(_) => keys::PAYMENT_FAILED,
            SagaEvent::OrderCancelled(_) => keys::ORDER_CANCELLED,
        }
    }

    /// Decode a delivery.
    ///
    /// Returns `Ok(None)` for routing keys that are not saga events — the
    /// consumer logs and acknowledges those. A decode error means the
    /// message will never parse and must be dropped, not dead-lettered.
    pub fn decode(routing_key: &str, body: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let event = match routing_key {
            // order.requested survives from an earlier revision of the wire
            // format; treated as order.created.
            keys::ORDER_CREATED | keys::ORDER_REQUESTED => {
                SagaEvent::OrderCreated(serde_json::from_slice(body)?)
            }
            keys::INVENTORY_RESERVED => SagaEvent::InventoryReserved(serde_json::from_slice(body)?),
            keys::INVENTORY_RESERVATION_FAILED => {
                SagaEvent::InventoryReservationFailed(serde_json::from_slice(body)?)
            }
            keys::PAYMENT_SUCCEEDED => SagaEvent::PaymentSucceeded(serde_json::from_slice(body)?),
            keys::PAYMENT_FAILED => SagaEvent::PaymentFailed(serde_json::from_slice(body)?),
            keys::ORDER_CANCELLED => SagaEvent::OrderCancelled(serde_json::from_slice(body)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Serialize for publishing.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            SagaEvent::OrderCreated(e) => serde_json::to_vec(e),
            SagaEvent::InventoryReserved(e) => serde_json::to_vec(e),
            SagaEvent::InventoryReservationFailed(e) => serde_json::to_vec(e),
            SagaEvent::PaymentSucceeded(e) => serde_json::to_vec(e),
            SagaEvent::PaymentFailed(e) => serde_json::to_vec(e),
            SagaEvent::OrderCancelled(e) => serde_json::to_vec(e),
        }
    }

    pub fn order_uuid(&self) -> &str {
        match self {
            SagaEvent::OrderCreated(e) => &e.order_uuid,
            SagaEvent::InventoryReserved(e) => &e.order_uuid,
            SagaEvent::InventoryReservationFailed(e) => &e.order_uuid,
            SagaEvent::PaymentSucceeded(e) => &e.order_uuid,
            SagaEvent::PaymentFailed(e) => &e.order_uuid,
            SagaEvent::OrderCancelled(e) => &e.order_uuid,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            SagaEvent::OrderCreated(e) => &e.correlation_id,
            SagaEvent::InventoryReserved(e) => &e.correlation_id,
            SagaEvent::InventoryReservationFailed(e) => &e.correlation_id,
            SagaEvent::PaymentSucceeded(e) => &e.correlation_id,
            SagaEvent::PaymentFailed(e) => &e.correlation_id,
            SagaEvent::OrderCancelled(e) => &e.correlation_id,
        }
    }
}

/// A product row as mirrored to the cart-side read model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub stock: i64,
}

/// `product.{created,updated,deleted}` on the product exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductEvent {
    Created(ProductRecord),
    Updated(ProductRecord),
    Deleted { product_id: i64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct ProductDeleted {
    product_id: i64,
}

impl ProductEvent {
    pub fn routing_key(&self) -> &'static str {
        match self {
            ProductEvent::Created(_) => keys::PRODUCT_CREATED,
            ProductEvent::Updated(_) => keys::PRODUCT_UPDATED,
            ProductEvent::Deleted { .. } => keys::PRODUCT_DELETED,
        }
    }

    /// Decode a delivery; unknown keys decode to `None`.
    pub fn decode(routing_key: &str, body: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let event = match routing_key {
            keys::PRODUCT_CREATED => ProductEvent::Created(serde_json::from_slice(body)?),
            keys::PRODUCT_UPDATED => ProductEvent::Updated(serde_json::from_slice(body)?),
            keys::PRODUCT_DELETED => {
                let deleted: ProductDeleted = serde_json::from_slice(body)?;
                ProductEvent::Deleted {
                    product_id: deleted.product_id,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            ProductEvent::Created(record) | ProductEvent::Updated(record) => {
                serde_json::to_vec(record)
            }
            ProductEvent::Deleted { product_id } => serde_json::to_vec(&ProductDeleted {
                product_id: *product_id,
            }),
        }
    }
}
