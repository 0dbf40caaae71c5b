//! Process-scoped facade wiring the delivery components together.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::batch::{BatchItemResult, BatchProcessor};
use crate::correlation::{CorrelationTable, ReplyStream, DEFAULT_REPLY_BUFFER};
use crate::error::{CorrelationError, StreamError};
use crate::message::Message;
use crate::registry::{ConnectionRegistry, SendOutcome, CLOSE_GOING_AWAY};
use crate::router::{MessageRouter, PublicAccountSet, DEFAULT_MENTION_FIELDS};
use crate::stream::{RequestResponseStream, DEFAULT_RESPONSE_TIMEOUT};

/// Bridge construction options.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub public_accounts: Vec<String>,
    pub mention_fields: Vec<String>,
    pub response_timeout: Duration,
    pub reply_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            public_accounts: Vec::new(),
            mention_fields: DEFAULT_MENTION_FIELDS.iter().map(|f| f.to_string()).collect(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            reply_buffer: DEFAULT_REPLY_BUFFER,
        }
    }
}

/// Owns one registry, router, correlation table and the processors built on them.
pub struct Bridge {
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
    correlations: Arc<CorrelationTable>,
    streams: RequestResponseStream,
    batch: BatchProcessor,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let correlations = Arc::new(CorrelationTable::with_capacity(config.reply_buffer));
        let registry = Arc::new(ConnectionRegistry::new().with_observer(correlations.clone()));
        let router = Arc::new(
            MessageRouter::new(PublicAccountSet::new(config.public_accounts))
                .with_fields(config.mention_fields),
        );
        let streams =
            RequestResponseStream::new(registry.clone(), router.clone(), correlations.clone())
                .with_timeout(config.response_timeout);
        let batch = BatchProcessor::new(registry.clone(), router.clone());

        info!(
            public_accounts = router.public_accounts().len(),
            "bridge initialized"
        );
        Self {
            registry,
            router,
            correlations,
            streams,
            batch,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn correlations(&self) -> &Arc<CorrelationTable> {
        &self.correlations
    }

    /// Route and deliver a one-way message.
    pub async fn push(&self, message: Message) -> SendOutcome {
        let message = self.router.route(message);
        let target = message.target().to_string();
        self.registry.send(&target, &message).await
    }

    /// Route and deliver a message, then stream its correlated replies.
    pub async fn request(&self, message: Message) -> Result<ReplyStream, StreamError> {
        self.streams.start(message).await
    }

    pub async fn push_batch(&self, messages: Vec<Message>) -> Vec<BatchItemResult> {
        self.batch.process(messages).await
    }

    /// Deliver to every connected identity, bypassing routing.
    pub async fn broadcast(&self, message: &Message) -> usize {
        self.registry.broadcast(message).await
    }

    /// Hand a peer reply to the flow waiting on its correlation id.
    ///
    /// # Errors
    ///
    /// [`CorrelationError::NotFound`] when the reply carries no correlation
    /// id or no flow is waiting for it.
    pub async fn deliver_reply(&self, reply: Message) -> Result<(), CorrelationError> {
        let Some(correlation_id) = reply.correlation_id().map(str::to_string) else {
            return Err(CorrelationError::NotFound(String::new()));
        };
        let result = self.correlations.push(&correlation_id, reply).await;
        if let Err(e) = &result {
            warn!(correlation_id = %correlation_id, error = %e, "dropping reply");
        }
        result
    }

    /// Close every connection with 1001 "Server shutdown".
    pub async fn shutdown(&self) {
        self.registry
            .close_all(CLOSE_GOING_AWAY, "Server shutdown")
            .await;
        info!(pending = self.correlations.len(), "bridge shut down");
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::StreamExt;
    use serde_json::{json, Value};

    use crate::test_support::RecordingChannel;

    fn message(target: &str, payload: Value) -> Message {
        Message::new(target, payload.as_object().cloned().unwrap())
    }

    fn bridge_with(public: &[&str]) -> Bridge {
        Bridge::new(BridgeConfig {
            public_accounts: public.iter().map(|s| s.to_string()).collect(),
            ..BridgeConfig::default()
        })
    }

    #[tokio::test]
    async fn test_push_routes_to_public_account() {
        let bridge = bridge_with(&["ci_bot"]);
        let bot = RecordingChannel::new();
        bridge.registry().connect("ci_bot", bot.clone()).unwrap();

        let outcome = bridge
            .push(message("alice", json!({"text": "run @ci_bot please"})))
            .await;

        assert_eq!(outcome, SendOutcome::Delivered);
        assert_eq!(
            bot.json_frames(),
            vec![json!({"text": "run @ci_bot please", "original_sender": "alice"})]
        );
    }

    #[tokio::test]
    async fn test_push_not_connected() {
        let bridge = Bridge::default();
        let outcome = bridge.push(message("bob", json!({"text": "hi"}))).await;
        assert_eq!(outcome, SendOutcome::NotConnected);
    }

    #[tokio::test]
    async fn test_request_and_deliver_reply() {
        let bridge = Bridge::default();
        bridge
            .registry()
            .connect("alice", RecordingChannel::new())
            .unwrap();

        let mut replies = bridge
            .request(message("alice", json!({"correlation_id": "req1"})))
            .await
            .unwrap();
        let reply = Message::reply_from(
            "alice",
            json!({"type": "response", "correlation_id": "req1", "is_final": true})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        bridge.deliver_reply(reply).await.unwrap();

        assert!(replies.next().await.unwrap().unwrap().is_final());
        assert!(replies.next().await.is_none());
    }

    #[tokio::test]
    async fn test_deliver_reply_unknown_correlation() {
        let bridge = Bridge::default();
        let reply = message("alice", json!({"correlation_id": "ghost"}));
        assert_eq!(
            bridge.deliver_reply(reply).await.unwrap_err(),
            CorrelationError::NotFound("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections_and_fails_flows() {
        let bridge = Bridge::default();
        let channel = RecordingChannel::new();
        bridge.registry().connect("alice", channel.clone()).unwrap();
        let mut replies = bridge
            .request(message("alice", json!({"correlation_id": "req1"})))
            .await
            .unwrap();

        bridge.shutdown().await;

        assert_eq!(channel.closed_with(), Some((1001, "Server shutdown".to_string())));
        assert_eq!(bridge.registry().count(), 0);
        assert_eq!(
            replies.next().await.unwrap().unwrap_err(),
            StreamError::ConnectionLost
        );
    }

    #[tokio::test]
    async fn test_broadcast_skips_routing() {
        let bridge = bridge_with(&["ci_bot"]);
        let a = RecordingChannel::new();
        bridge.registry().connect("a", a.clone()).unwrap();

        let sent = bridge.broadcast(&message("*", json!({"text": "@ci_bot"}))).await;

        assert_eq!(sent, 1);
        assert!(!a.json_frames()[0]
            .as_object()
            .unwrap()
            .contains_key("original_sender"));
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.response_timeout, Duration::from_secs(30));
        assert_eq!(config.mention_fields, vec!["message", "text", "content"]);
        assert!(config.public_accounts.is_empty());
    }
}
