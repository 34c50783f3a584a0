//! # Wire Frames
//!
//! JSON frames exchanged over the `/ws/realtime` socket.
//!
//! Outbound frames are a closed set and are modelled as a tagged enum.
//! Inbound frames come from a service outside our control, so they are read
//! leniently from a `serde_json::Value` by the router; this module only
//! provides the typed views the router produces.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::subscription_key::SubscriptionKey;

/// Frames sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving updates for one `(collection, entity_id)` pair.
    Subscribe {
        /// Collection name.
        collection: String,
        /// Entity identifier.
        entity_id: String,
    },
    /// Stop receiving updates for one `(collection, entity_id)` pair.
    Unsubscribe {
        /// Collection name.
        collection: String,
        /// Entity identifier.
        entity_id: String,
    },
    /// Keepalive carrying the local time in epoch milliseconds.
    Ping {
        /// Epoch milliseconds at send time.
        timestamp: i64,
    },
}

impl ClientFrame {
    /// Subscribe request for `key`.
    pub fn subscribe(key: &SubscriptionKey) -> Self {
        ClientFrame::Subscribe {
            collection: key.collection.clone(),
            entity_id: key.entity_id.clone(),
        }
    }

    /// Unsubscribe request for `key`.
    pub fn unsubscribe(key: &SubscriptionKey) -> Self {
        ClientFrame::Unsubscribe {
            collection: key.collection.clone(),
            entity_id: key.entity_id.clone(),
        }
    }

    /// Keepalive stamped with the current wall-clock time.
    pub fn ping_now() -> Self {
        ClientFrame::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Serializes the frame to the text payload of a WebSocket message.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The two request kinds that expect a confirmation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeKind {
    /// `subscribe` → `subscription_confirmed`.
    Subscribe,
    /// `unsubscribe` → `unsubscription_confirmed`.
    Unsubscribe,
}

impl fmt::Display for HandshakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeKind::Subscribe => f.write_str("subscribe"),
            HandshakeKind::Unsubscribe => f.write_str("unsubscribe"),
        }
    }
}

/// Kind of change carried by a data-update frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A new document was inserted.
    Insert,
    /// Some fields of an existing document changed (see `updated_fields`).
    Update,
    /// A document was removed.
    Delete,
    /// A document was replaced wholesale.
    Replace,
}

impl Operation {
    /// Parses the wire name; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "insert" => Some(Operation::Insert),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            "replace" => Some(Operation::Replace),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// # Update Event
///
/// A data-update frame pushed by the server after a change in one of the
/// watched collections.
///
/// The typed fields are a convenience; `payload` is the inbound JSON exactly
/// as received and is what subscribers should treat as authoritative.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    /// Collection the change happened in.
    pub collection: String,
    /// Kind of change.
    pub operation: Operation,
    /// Full document; the server sends it for inserts and replacements.
    pub document: Option<Map<String, Value>>,
    /// Changed fields of a partial update.
    pub updated_fields: Option<Map<String, Value>>,
    /// Primary key of the changed document, when the server includes it.
    pub document_id: Option<String>,
    /// Server-side timestamp of the change, when present.
    pub timestamp: Option<String>,
    /// The complete inbound frame.
    pub payload: Value,
}

impl UpdateEvent {
    /// Builds an event from an inbound frame.
    ///
    /// Returns `None` unless the frame is an object carrying a string
    /// `collection` and one of the four known `operation` kinds.
    pub fn from_value(payload: Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let collection = obj.get("collection")?.as_str()?.to_string();
        let operation = Operation::parse(obj.get("operation")?.as_str()?)?;
        let document = obj.get("document").and_then(Value::as_object).cloned();
        let updated_fields = obj.get("updated_fields").and_then(Value::as_object).cloned();
        let document_id = obj.get("document_id").and_then(scalar_to_string);
        let timestamp = obj.get("timestamp").and_then(scalar_to_string);

        Some(UpdateEvent {
            collection,
            operation,
            document,
            updated_fields,
            document_id,
            timestamp,
            payload,
        })
    }

    /// Looks `name` up in `document`, then in `updated_fields`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.document
            .as_ref()
            .and_then(|doc| doc.get(name))
            .or_else(|| self.updated_fields.as_ref().and_then(|f| f.get(name)))
    }
}

/// # Server Error Frame
///
/// An `error` frame. The correlation fields are optional: the server only
/// fills them in when the error concerns a specific request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerErrorFrame {
    /// Human-readable reason.
    pub message: String,
    /// Collection of the failed request, if known.
    pub collection: Option<String>,
    /// Entity of the failed request, if known.
    pub entity_id: Option<String>,
    /// Which request failed, if the server says so.
    pub request_type: Option<HandshakeKind>,
}

impl ServerErrorFrame {
    /// The subscription this error refers to, when both correlation fields are present.
    pub fn key(&self) -> Option<SubscriptionKey> {
        match (&self.collection, &self.entity_id) {
            (Some(collection), Some(entity_id)) => {
                Some(SubscriptionKey::new(collection.as_str(), entity_id.as_str()))
            }
            _ => None,
        }
    }
}

/// Renders a JSON string or number as an identifier; empty strings count as absent.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
