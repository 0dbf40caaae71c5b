//! Message model shared by every component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque key-value payload delivered to the peer.
pub type Payload = Map<String, Value>;

/// Payload key carrying the correlation id.
pub const CORRELATION_ID_FIELD: &str = "correlation_id";

/// Payload key marking the last reply of a flow.
pub const IS_FINAL_FIELD: &str = "is_final";

/// Payload key added when a message is redirected to a public account.
pub const ORIGINAL_SENDER_FIELD: &str = "original_sender";

/// A message addressed to one identity.
///
/// Fields are private: a message is built once and never mutated afterwards.
/// Routing produces a new message via [`Message::redirect`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    target: String,
    payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message for `target`.
    ///
    /// A string `correlation_id` already present in the payload is picked up.
    pub fn new(target: impl Into<String>, payload: Payload) -> Self {
        let correlation_id = payload
            .get(CORRELATION_ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            target: target.into(),
            payload,
            event_type: None,
            event_id: None,
            correlation_id,
            timestamp: Utc::now(),
        }
    }

    /// Build a reply message from a peer frame.
    ///
    /// The correlation id is read from the top level of the frame, falling
    /// back to `data.correlation_id`. Returns `None` when neither is present.
    pub fn reply_from(sender: impl Into<String>, frame: Payload) -> Option<Self> {
        let correlation_id = frame
            .get(CORRELATION_ID_FIELD)
            .and_then(Value::as_str)
            .or_else(|| {
                frame
                    .get("data")
                    .and_then(Value::as_object)
                    .and_then(|data| data.get(CORRELATION_ID_FIELD))
                    .and_then(Value::as_str)
            })?
            .to_string();

        let mut reply = Self::new(sender, frame);
        reply.correlation_id = Some(correlation_id);
        Some(reply)
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the correlation id, mirroring it into the payload so the peer sees it.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        self.payload.insert(
            CORRELATION_ID_FIELD.to_string(),
            Value::String(correlation_id.clone()),
        );
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Retarget to `identity`, recording the previous target as `original_sender`.
    pub fn redirect(mut self, identity: impl Into<String>) -> Self {
        let original = std::mem::replace(&mut self.target, identity.into());
        self.payload
            .insert(ORIGINAL_SENDER_FIELD.to_string(), Value::String(original));
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the payload carries `is_final: true`.
    pub fn is_final(&self) -> bool {
        self.payload
            .get(IS_FINAL_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The wire frame: the payload as a JSON object.
    pub fn frame(&self) -> String {
        Value::Object(self.payload.clone()).to_string()
    }
}
