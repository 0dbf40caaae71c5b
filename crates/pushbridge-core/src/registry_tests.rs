use super::*;

use std::time::Duration;

use serde_json::json;

use crate::message::Payload;
use crate::test_support::RecordingChannel;

fn text(target: &str, body: &str) -> Message {
    let mut payload = Payload::new();
    payload.insert("text".to_string(), json!(body));
    Message::new(target, payload)
}

#[derive(Default)]
struct DisconnectLog(Mutex<Vec<String>>, Mutex<Vec<u64>>);

impl ConnectionObserver for DisconnectLog {
    fn on_disconnect(&self, identity: &str, serial: u64) {
        self.0.lock().push(identity.to_string());
        self.1.lock().push(serial);
    }
}

#[test]
fn test_registry_new_is_empty() {
    let registry = ConnectionRegistry::new();
    assert_eq!(registry.count(), 0);
    assert!(registry.identities().is_empty());
}

#[tokio::test]
async fn test_connect_and_send() {
    let registry = ConnectionRegistry::new();
    let c1 = RecordingChannel::new();

    registry.connect("alice", c1.clone()).unwrap();
    let outcome = registry.send("alice", &text("alice", "hi")).await;

    assert_eq!(outcome, SendOutcome::Delivered);
    assert_eq!(c1.json_frames(), vec![json!({"text": "hi"})]);
    assert_eq!(registry.count(), 1);
}

#[tokio::test]
async fn test_send_to_unknown_identity() {
    let registry = ConnectionRegistry::new();
    registry.connect("alice", RecordingChannel::new()).unwrap();

    let outcome = registry.send("bob", &text("bob", "hello")).await;

    assert_eq!(outcome, SendOutcome::NotConnected);
    assert_eq!(registry.count(), 1);
}

#[test]
fn test_duplicate_connect_keeps_existing() {
    let registry = ConnectionRegistry::new();
    let first = registry.connect("alice", RecordingChannel::new()).unwrap();

    let err = registry
        .connect("alice", RecordingChannel::new())
        .unwrap_err();

    assert_eq!(err, RegistryError::DuplicateIdentity("alice".to_string()));
    assert_eq!(registry.get("alice").unwrap().serial(), first.serial());
    assert_eq!(registry.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_yield_one_winner() {
    let registry = Arc::new(ConnectionRegistry::new());

    let attempts: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.connect("alice", RecordingChannel::new()).is_ok() })
        })
        .collect();

    let mut successes = 0;
    for attempt in attempts {
        if attempt.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(registry.count(), 1);
}

#[tokio::test]
async fn test_send_after_disconnect_is_not_connected() {
    let registry = ConnectionRegistry::new();
    registry.connect("alice", RecordingChannel::new()).unwrap();

    assert!(registry.disconnect("alice"));
    let outcome = registry.send("alice", &text("alice", "late")).await;

    assert_eq!(outcome, SendOutcome::NotConnected);
}

#[test]
fn test_disconnect_is_idempotent() {
    let log = Arc::new(DisconnectLog::default());
    let registry = ConnectionRegistry::new().with_observer(log.clone());
    registry.connect("alice", RecordingChannel::new()).unwrap();

    assert!(registry.disconnect("alice"));
    assert!(!registry.disconnect("alice"));
    assert!(!registry.disconnect("nobody"));

    assert_eq!(*log.0.lock(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_failed_write_disconnects() {
    let log = Arc::new(DisconnectLog::default());
    let registry = ConnectionRegistry::new().with_observer(log.clone());
    registry.connect("alice", RecordingChannel::failing()).unwrap();

    let outcome = registry.send("alice", &text("alice", "hi")).await;

    assert_eq!(outcome, SendOutcome::ChannelFailed);
    assert!(!registry.is_connected("alice"));
    assert_eq!(*log.0.lock(), vec!["alice".to_string()]);
}

#[test]
fn test_observer_sees_serial_of_removed_connection() {
    let log = Arc::new(DisconnectLog::default());
    let registry = ConnectionRegistry::new().with_observer(log.clone());
    let old = registry.connect("alice", RecordingChannel::new()).unwrap();
    registry.disconnect("alice");
    let new = registry.connect("alice", RecordingChannel::new()).unwrap();
    registry.release(&new);

    assert_eq!(*log.1.lock(), vec![old.serial(), new.serial()]);
}

#[tokio::test]
async fn test_send_to_specific_connection() {
    let registry = ConnectionRegistry::new();
    let channel = RecordingChannel::new();
    let connection = registry.connect("alice", channel.clone()).unwrap();

    let outcome = registry.send_to(&connection, &text("alice", "hi")).await;

    assert_eq!(outcome, SendOutcome::Delivered);
    assert_eq!(channel.frames().len(), 1);
}

#[test]
fn test_release_ignores_stale_connection() {
    let registry = ConnectionRegistry::new();
    let old = registry.connect("alice", RecordingChannel::new()).unwrap();
    registry.disconnect("alice");
    let new = registry.connect("alice", RecordingChannel::new()).unwrap();

    assert!(!registry.release(&old));
    assert!(registry.is_connected("alice"));
    assert!(registry.release(&new));
    assert!(!registry.is_connected("alice"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_peer_does_not_block_others() {
    let registry = Arc::new(ConnectionRegistry::new());
    let slow = RecordingChannel::slow(Duration::from_secs(60));
    let fast = RecordingChannel::new();
    registry.connect("slow", slow.clone()).unwrap();
    registry.connect("fast", fast.clone()).unwrap();

    let stalled = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.send("slow", &text("slow", "zzz")).await })
    };
    tokio::task::yield_now().await;

    // The map lock is free while the slow write is in flight.
    let outcome = registry.send("fast", &text("fast", "quick")).await;
    assert_eq!(outcome, SendOutcome::Delivered);
    assert_eq!(fast.frames().len(), 1);
    assert!(slow.frames().is_empty());
    assert_eq!(registry.count(), 2);

    assert_eq!(stalled.await.unwrap(), SendOutcome::Delivered);
    assert_eq!(slow.frames().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_to_one_identity_are_serialized() {
    let registry = Arc::new(ConnectionRegistry::new());
    let channel = RecordingChannel::slow(Duration::from_millis(1));
    registry.connect("alice", channel.clone()).unwrap();

    let sends: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .send("alice", &text("alice", &format!("m{}", i)))
                    .await
            })
        })
        .collect();
    for send in sends {
        assert_eq!(send.await.unwrap(), SendOutcome::Delivered);
    }

    // Every frame arrives whole.
    let frames = channel.json_frames();
    assert_eq!(frames.len(), 16);
    assert!(frames.iter().all(|f| f["text"].as_str().unwrap().starts_with('m')));
}

#[tokio::test]
async fn test_broadcast_counts_and_prunes() {
    let registry = ConnectionRegistry::new();
    let a = RecordingChannel::new();
    let b = RecordingChannel::new();
    registry.connect("a", a.clone()).unwrap();
    registry.connect("b", b.clone()).unwrap();
    registry.connect("dead", RecordingChannel::failing()).unwrap();

    let sent = registry.broadcast(&text("*", "announcement")).await;

    assert_eq!(sent, 2);
    assert_eq!(a.frames().len(), 1);
    assert_eq!(b.frames().len(), 1);
    assert_eq!(registry.count(), 2);
    assert!(!registry.is_connected("dead"));
}

#[tokio::test]
async fn test_close_all() {
    let log = Arc::new(DisconnectLog::default());
    let registry = ConnectionRegistry::new().with_observer(log.clone());
    let a = RecordingChannel::new();
    let b = RecordingChannel::new();
    registry.connect("a", a.clone()).unwrap();
    registry.connect("b", b.clone()).unwrap();

    registry.close_all(CLOSE_GOING_AWAY, "Server shutdown").await;

    assert_eq!(registry.count(), 0);
    assert_eq!(a.closed_with(), Some((1001, "Server shutdown".to_string())));
    assert_eq!(b.closed_with(), Some((1001, "Server shutdown".to_string())));
    assert_eq!(log.0.lock().len(), 2);
}

#[tokio::test]
async fn test_close_all_does_not_wait_for_stuck_writes() {
    let registry = Arc::new(ConnectionRegistry::new());
    let stuck = RecordingChannel::slow(Duration::from_secs(3600));
    registry.connect("stuck", stuck.clone()).unwrap();
    registry.connect("ok", RecordingChannel::new()).unwrap();

    // Hold the stuck connection's write lock with a write that never finishes.
    let writer = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.send("stuck", &text("stuck", "hi")).await })
    };
    tokio::task::yield_now().await;

    let closed = tokio::time::timeout(
        Duration::from_secs(1),
        registry.close_all(CLOSE_GOING_AWAY, "Server shutdown"),
    )
    .await;

    assert!(closed.is_ok());
    assert_eq!(registry.count(), 0);
    assert_eq!(stuck.closed_with(), Some((1001, "Server shutdown".to_string())));
    writer.abort();
}

#[test]
fn test_connection_accessors() {
    let registry = ConnectionRegistry::new();
    let first = registry.connect("alice", RecordingChannel::new()).unwrap();
    let second = registry.connect("bob", RecordingChannel::new()).unwrap();

    assert_eq!(first.identity(), "alice");
    assert_ne!(first.serial(), second.serial());
    assert!(first.connected_at() <= second.connected_at());
    assert!(format!("{:?}", first).contains("alice"));
}
