//! Inbound WebSocket frame classification.

use serde_json::Value;

use pushbridge_core::Message;

/// Frame sent in answer to an application-level ping.
pub(crate) const PONG_FRAME: &str = r#"{"type":"pong"}"#;

/// What an inbound text frame means to the server.
#[derive(Debug, PartialEq)]
pub enum InboundFrame {
    /// `{"type":"ping"}`
    Ping,
    /// An object carrying `correlation_id` at the top level or inside `data`.
    Reply(Message),
    /// Anything else: not JSON, not an object, or no correlation id.
    Other,
}

impl InboundFrame {
    /// Classify a text frame received from `sender`.
    pub fn parse(sender: &str, text: &str) -> Self {
        let Ok(Value::Object(frame)) = serde_json::from_str::<Value>(text) else {
            return InboundFrame::Other;
        };

        if frame.get("type").and_then(Value::as_str) == Some("ping") {
            return InboundFrame::Ping;
        }

        match Message::reply_from(sender, frame) {
            Some(reply) => InboundFrame::Reply(reply),
            None => InboundFrame::Other,
        }
    }
}
