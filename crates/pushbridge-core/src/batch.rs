//! Batch fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::info;

use crate::message::Message;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemResult {
    /// Position of the item in the input.
    pub index: usize,
    /// Identity the item was delivered to, after routing.
    #[serde(rename = "user_id")]
    pub identity: String,
    pub success: bool,
}

/// Routes and sends many messages independently.
#[derive(Clone)]
pub struct BatchProcessor {
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
}

impl BatchProcessor {
    pub fn new(registry: Arc<ConnectionRegistry>, router: Arc<MessageRouter>) -> Self {
        Self { registry, router }
    }

    /// Deliver every message and report per-item success, in input order.
    ///
    /// Items addressed to different identities are sent concurrently. Items
    /// resolving to the same identity are sent one after another in input
    /// order. One failure never affects another item.
    pub async fn process(&self, messages: Vec<Message>) -> Vec<BatchItemResult> {
        if messages.is_empty() {
            return Vec::new();
        }
        let total = messages.len();

        let mut lanes: HashMap<String, Vec<(usize, Message)>> = HashMap::new();
        for (index, message) in messages.into_iter().enumerate() {
            let routed = self.router.route(message);
            lanes
                .entry(routed.target().to_string())
                .or_default()
                .push((index, routed));
        }

        let lane_results = join_all(lanes.into_iter().map(|(identity, items)| async move {
            let mut results = Vec::with_capacity(items.len());
            for (index, message) in items {
                let outcome = self.registry.send(&identity, &message).await;
                results.push(BatchItemResult {
                    index,
                    identity: identity.clone(),
                    success: outcome.is_delivered(),
                });
            }
            results
        }))
        .await;

        let mut results: Vec<BatchItemResult> = lane_results.into_iter().flatten().collect();
        results.sort_by_key(|r| r.index);

        let delivered = results.iter().filter(|r| r.success).count();
        info!(total, delivered, "batch processed");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::router::PublicAccountSet;
    use crate::test_support::RecordingChannel;

    fn processor(public: &[&str]) -> (Arc<ConnectionRegistry>, BatchProcessor) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(MessageRouter::new(PublicAccountSet::new(public.iter().copied())));
        (registry.clone(), BatchProcessor::new(registry, router))
    }

    fn message(target: &str, payload: Value) -> Message {
        Message::new(target, payload.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (_, batch) = processor(&[]);
        assert!(batch.process(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_outcomes_keep_input_order() {
        let (registry, batch) = processor(&[]);
        let alice = RecordingChannel::new();
        registry.connect("alice", alice.clone()).unwrap();
        registry.connect("dead", RecordingChannel::failing()).unwrap();

        let results = batch
            .process(vec![
                message("alice", json!({"n": 0})),
                message("bob", json!({"n": 1})),
                message("dead", json!({"n": 2})),
                message("alice", json!({"n": 3})),
            ])
            .await;

        let summary: Vec<(usize, &str, bool)> = results
            .iter()
            .map(|r| (r.index, r.identity.as_str(), r.success))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "alice", true),
                (1, "bob", false),
                (2, "dead", false),
                (3, "alice", true),
            ]
        );
        assert_eq!(alice.json_frames(), vec![json!({"n": 0}), json!({"n": 3})]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_identity_keeps_order_under_delay() {
        let (registry, batch) = processor(&[]);
        let slow = RecordingChannel::slow(Duration::from_millis(5));
        registry.connect("alice", slow.clone()).unwrap();

        let messages = (0..10).map(|n| message("alice", json!({"n": n}))).collect();
        let results = batch.process(messages).await;

        assert!(results.iter().all(|r| r.success));
        let order: Vec<i64> = slow
            .json_frames()
            .iter()
            .map(|f| f["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_batch_routes_mentions() {
        let (registry, batch) = processor(&["ci_bot"]);
        let bot = RecordingChannel::new();
        registry.connect("ci_bot", bot.clone()).unwrap();

        let results = batch
            .process(vec![message("alice", json!({"message": "@ci_bot build"}))])
            .await;

        assert_eq!(results[0].identity, "ci_bot");
        assert!(results[0].success);
        assert_eq!(bot.json_frames()[0]["original_sender"], "alice");
    }

    #[test]
    fn test_result_serializes_as_user_id() {
        let result = BatchItemResult {
            index: 2,
            identity: "alice".to_string(),
            success: true,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"index": 2, "user_id": "alice", "success": true})
        );
    }
}
