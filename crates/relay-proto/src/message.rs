//! Typed messages exchanged with the execution engine.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current protocol version carried in every envelope.
pub const PROTOCOL_VERSION: &str = "1";

/// Message type tag.
///
/// A closed enum: unknown tags fail decoding rather than falling through
/// a string match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Heartbeat,
    StatusRequest,
    StatusResponse,
    Signal,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heartbeat => write!(f, "HEARTBEAT"),
            Self::StatusRequest => write!(f, "STATUS_REQUEST"),
            Self::StatusResponse => write!(f, "STATUS_RESPONSE"),
            Self::Signal => write!(f, "SIGNAL"),
        }
    }
}

/// One framed unit of communication.
///
/// Constructed immediately before send; received envelopes are consumed by
/// one handler and discarded. `id` is unique per sender lifetime;
/// `correlation_id` links a response to the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub id: String,
    /// Unix milliseconds at construction.
    pub timestamp: i64,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub source: String,
    pub version: String,
}

impl Envelope {
    fn build(kind: MessageType, source: &str, payload: Value) -> Self {
        Self {
            kind,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            payload,
            correlation_id: None,
            source: source.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Heartbeat ping.
    pub fn heartbeat(source: &str) -> Self {
        Self::build(MessageType::Heartbeat, source, Value::Null)
    }

    /// Heartbeat reply correlated to `request`.
    pub fn heartbeat_reply(source: &str, request: &Envelope) -> Self {
        let mut env = Self::build(MessageType::Heartbeat, source, Value::Null);
        env.correlation_id = Some(request.id.clone());
        env
    }

    /// Request for account/market status.
    pub fn status_request(source: &str) -> Self {
        Self::build(MessageType::StatusRequest, source, Value::Null)
    }

    /// Status response correlated to `request`.
    pub fn status_response(source: &str, request: &Envelope, payload: Value) -> Self {
        let mut env = Self::build(MessageType::StatusResponse, source, payload);
        env.correlation_id = Some(request.id.clone());
        env
    }

    /// Trading signal carrying the serialized signal as payload.
    pub fn signal(source: &str, payload: Value) -> Self {
        Self::build(MessageType::Signal, source, payload)
    }

    /// Whether this envelope answers the given request.
    #[must_use]
    pub fn answers(&self, request: &Envelope) -> bool {
        self.correlation_id.as_deref() == Some(request.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&MessageType::StatusRequest).unwrap(),
            "\"STATUS_REQUEST\""
        );
        assert_eq!(
            serde_json::from_str::<MessageType>("\"HEARTBEAT\"").unwrap(),
            MessageType::Heartbeat
        );
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        assert!(serde_json::from_str::<MessageType>("\"TRADE_UPDATE\"").is_err());
    }

    #[test]
    fn test_heartbeat_reply_correlation() {
        let ping = Envelope::heartbeat("bridge");
        let pong = Envelope::heartbeat_reply("engine", &ping);

        assert!(pong.answers(&ping));
        assert_ne!(pong.id, ping.id);
    }

    #[test]
    fn test_envelope_ids_unique() {
        let a = Envelope::status_request("bridge");
        let b = Envelope::status_request("bridge");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_correlation_id_omitted_when_absent() {
        let env = Envelope::signal("bridge", json!({"symbol": "EURUSD"}));
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("correlation_id"));
    }
}
