//! The immutable event value carried by the [`super::EventBus`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, timestamped event with an opaque JSON payload.
///
/// Created by the publisher and never mutated afterwards: handlers only
/// ever see `&Event`. Payloads of application events are opaque; use
/// [`Event::decode`] to read them as a concrete type, or
/// [`super::SystemEvent::from_event`] for the `system.*` names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    name: String,
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Creates an event from any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if `payload` cannot be represented
    /// as JSON.
    pub fn from_payload<T: Serialize>(
        name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(name, serde_json::to_value(payload)?))
    }

    /// Unique id of this event instance.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Namespaced event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw JSON payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Time the event was created.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Decodes the payload as `T`.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload does not have the
    /// shape of `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct OrderCreated {
        id: String,
    }

    #[test]
    fn events_get_distinct_ids() {
        let a = Event::new("orders.created", json!({}));
        let b = Event::new("orders.created", json!({}));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn decode_reads_typed_payload() {
        let event = Event::new("orders.created", json!({ "id": "O1" }));
        let Ok(order) = event.decode::<OrderCreated>() else {
            panic!("payload should decode");
        };
        assert_eq!(order.id, "O1");
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let event = Event::new("orders.created", json!([1, 2, 3]));
        tokio_test::assert_err!(event.decode::<OrderCreated>());
    }

    #[test]
    fn from_payload_serializes_struct() {
        #[derive(Serialize)]
        struct Sale {
            total: u32,
        }
        let Ok(event) = Event::from_payload("sales.closed", &Sale { total: 42 }) else {
            panic!("payload should serialize");
        };
        assert_eq!(event.payload().get("total"), Some(&json!(42)));
        assert_eq!(event.name(), "sales.closed");
    }
}
