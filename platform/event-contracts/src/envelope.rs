//! Saga event envelope.
//!
//! Every coordinating event carries the same three fields: a
//! `correlation_id` that is stable across the whole saga instance (equal to
//! the order's uuid), the `order_uuid` itself, and an RFC 3339 UTC
//! `timestamp`. Event-specific fields sit flat alongside them on the wire,
//! so the JSON for `payment.succeeded` looks like:
//!
//! ```json
//! { "correlation_id": "…", "order_uuid": "…",
//!   "timestamp": "2026-01-01T00:00:00Z", "amount": 400, "currency": "USD" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Stable across every event of one saga instance; equals the order uuid.
    pub correlation_id: String,

    /// The order this event belongs to.
    pub order_uuid: String,

    /// When the event was emitted (RFC 3339, UTC).
    pub timestamp: DateTime<Utc>,

    /// Event-specific fields, flattened into the same JSON object.
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wrap a payload for the given order; the correlation id is the order
    /// uuid by definition.
    pub fn new(order_uuid: impl Into<String>, payload: T) -> Self {
        let order_uuid = order_uuid.into();
        Self {
            correlation_id: order_uuid.clone(),
            order_uuid,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Validate the envelope fields on a raw JSON value.
///
/// # Validation Rules
///
/// - `correlation_id`: non-empty string
/// - `order_uuid`: non-empty string
/// - `timestamp`: present, RFC 3339 parseable
pub fn validate_envelope_fields(value: &serde_json::Value) -> Result<(), String> {
    let correlation_id = value
        .get("correlation_id")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid correlation_id")?;
    if correlation_id.is_empty() {
        return Err("correlation_id cannot be empty".to_string());
    }

    let order_uuid = value
        .get("order_uuid")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid order_uuid")?;
    if order_uuid.is_empty() {
        return Err("order_uuid cannot be empty".to_string());
    }

    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid timestamp")?;
    DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| format!("timestamp is not RFC 3339: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Paid {
        amount: i64,
        currency: String,
    }

    #[test]
    fn correlation_id_equals_order_uuid() {
        let envelope = Envelope::new(
            "0b8a6c0e-9f1d-4f65-9a40-2f6f6c0f1a11",
            Paid {
                amount: 400,
                currency: "USD".to_string(),
            },
        );

        assert_eq!(envelope.correlation_id, envelope.order_uuid);
    }

    #[test]
    fn payload_fields_are_flattened() {
        let envelope = Envelope::new(
            "u-1",
            Paid {
                amount: 400,
                currency: "USD".to_string(),
            },
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["order_uuid"], "u-1");
        assert_eq!(value["correlation_id"], "u-1");
        assert_eq!(value["amount"], 400);
        assert_eq!(value["currency"], "USD");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn roundtrip() {
        let envelope = Envelope::new(
            "u-2",
            Paid {
                amount: 100,
                currency: "USD".to_string(),
            },
        );

        let bytes = serde_json::to_vec(&envelope).unwrap();
        let back: Envelope<Paid> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn validate_accepts_complete_envelope() {
        let value = json!({
            "correlation_id": "u-3",
            "order_uuid": "u-3",
            "timestamp": "2026-01-01T00:00:00Z",
            "amount": 1
        });
        assert!(validate_envelope_fields(&value).is_ok());
    }

    #[test]
    fn validate_rejects_missing_or_empty_fields() {
        assert!(validate_envelope_fields(&json!({
            "order_uuid": "u-4",
            "timestamp": "2026-01-01T00:00:00Z"
        }))
        .is_err());

        assert!(validate_envelope_fields(&json!({
            "correlation_id": "",
            "order_uuid": "u-4",
            "timestamp": "2026-01-01T00:00:00Z"
        }))
        .is_err());

        assert!(validate_envelope_fields(&json!({
            "correlation_id": "u-4",
            "order_uuid": "u-4",
            "timestamp": "yesterday"
        }))
        .is_err());
    }
}
