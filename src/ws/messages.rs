//! WebSocket wire envelope, used in both directions.

use serde::{Deserialize, Serialize};

/// Inbound message type answered directly by the server.
pub const PING: &str = "ping";
/// Reply to [`PING`].
pub const PONG: &str = "pong";

/// Top-level WebSocket message: `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event or message name.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Arbitrary JSON payload. Missing on input means `null`.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub fn new(msg_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
        }
    }

    /// Serializes the envelope as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if `data` cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] for malformed JSON, a missing
    /// `type`, or a `type` that is not a string.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_type_and_data() {
        let env = Envelope::new("orders.created", json!({ "id": "O1" }));
        assert_eq!(
            env.encode().unwrap_or_default(),
            r#"{"type":"orders.created","data":{"id":"O1"}}"#
        );
    }

    #[test]
    fn decode_defaults_missing_data_to_null() {
        let Ok(env) = Envelope::decode(r#"{"type":"ping"}"#) else {
            panic!("ping should decode");
        };
        assert_eq!(env.msg_type, PING);
        assert!(env.data.is_null());
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        tokio_test::assert_err!(Envelope::decode("not json"));
        tokio_test::assert_err!(Envelope::decode(r#"{"data":1}"#));
        tokio_test::assert_err!(Envelope::decode(r#"{"type":7}"#));
    }
}
