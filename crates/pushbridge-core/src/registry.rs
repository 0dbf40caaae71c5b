//! Connection registry.
//!
//! Holds at most one live [`Connection`] per identity. A single
//! `parking_lot::Mutex` guards the map shape (insert, remove, lookup); it is
//! never held across a channel write. Writes to one connection are serialized
//! by that connection's own async lock, so a slow peer only stalls itself.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ConnectionObserver};
use crate::error::{ChannelError, RegistryError};
use crate::message::Message;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Close code sent to every peer on server shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// One live peer connection.
pub struct Connection {
    identity: String,
    serial: u64,
    connected_at: DateTime<Utc>,
    channel: Arc<dyn Channel>,
    write_lock: tokio::sync::Mutex<()>,
}

impl Connection {
    fn new(identity: String, channel: Arc<dyn Channel>) -> Self {
        Self {
            identity,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            connected_at: Utc::now(),
            channel,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Process-unique number distinguishing reconnects of the same identity.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Write one frame, waiting for any in-flight write on this connection.
    pub async fn write(&self, frame: String) -> Result<(), ChannelError> {
        let _guard = self.write_lock.lock().await;
        self.channel.write(frame).await
    }

    /// Close without waiting for in-flight writes.
    async fn close(&self, code: u16, reason: &str) -> Result<(), ChannelError> {
        self.channel.close(code, reason).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("serial", &self.serial)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Result of a single send-by-identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    NotConnected,
    /// The write failed; the connection has been dropped from the registry.
    ChannelFailed,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

/// Identity → connection map with per-connection write serialization.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            observers: Vec::new(),
        }
    }

    /// Register an observer notified after every removal.
    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register `channel` as the live connection for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateIdentity`] if the identity already has
    /// a live connection. The existing connection is left untouched.
    pub fn connect(
        &self,
        identity: impl Into<String>,
        channel: Arc<dyn Channel>,
    ) -> Result<Arc<Connection>, RegistryError> {
        let identity = identity.into();
        let connection = {
            let mut connections = self.connections.lock();
            match connections.entry(identity.clone()) {
                Entry::Occupied(_) => None,
                Entry::Vacant(slot) => {
                    let connection = Arc::new(Connection::new(identity.clone(), channel));
                    slot.insert(connection.clone());
                    Some(connection)
                }
            }
        };

        match connection {
            Some(connection) => {
                info!(identity = %identity, serial = connection.serial, "connection registered");
                Ok(connection)
            }
            None => {
                warn!(identity = %identity, "rejected duplicate connection");
                Err(RegistryError::DuplicateIdentity(identity))
            }
        }
    }

    /// Remove whatever connection is registered for `identity`.
    ///
    /// Idempotent. Returns whether a connection was removed.
    pub fn disconnect(&self, identity: &str) -> bool {
        let removed = self.connections.lock().remove(identity);
        match removed {
            Some(connection) => {
                info!(identity = %identity, serial = connection.serial, "connection removed");
                self.notify_disconnect(&connection);
                true
            }
            None => false,
        }
    }

    /// Remove `connection` only if it is still the registered one.
    ///
    /// Transport tasks call this on exit so that a stale task never evicts a
    /// newer connection for the same identity.
    pub fn release(&self, connection: &Connection) -> bool {
        let removed = {
            let mut connections = self.connections.lock();
            match connections.get(&connection.identity) {
                Some(current) if current.serial == connection.serial => {
                    connections.remove(&connection.identity)
                }
                _ => None,
            }
        };
        if removed.is_some() {
            info!(
                identity = %connection.identity,
                serial = connection.serial,
                "connection released"
            );
            self.notify_disconnect(connection);
            true
        } else {
            false
        }
    }

    /// Look up the live connection for `identity`.
    pub fn get(&self, identity: &str) -> Option<Arc<Connection>> {
        self.connections.lock().get(identity).cloned()
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.connections.lock().contains_key(identity)
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Snapshot of connected identities.
    pub fn identities(&self) -> Vec<String> {
        self.connections.lock().keys().cloned().collect()
    }

    /// Deliver `message`'s payload to `identity`.
    ///
    /// A failed write is treated as proof of a dead connection: that
    /// connection is released immediately and the send is not retried.
    pub async fn send(&self, identity: &str, message: &Message) -> SendOutcome {
        let Some(connection) = self.get(identity) else {
            debug!(identity = %identity, "send skipped, not connected");
            return SendOutcome::NotConnected;
        };
        self.send_to(&connection, message).await
    }

    /// Deliver `message`'s payload to one specific connection.
    ///
    /// Same failure handling as [`send`](Self::send).
    pub async fn send_to(&self, connection: &Connection, message: &Message) -> SendOutcome {
        match connection.write(message.frame()).await {
            Ok(()) => {
                debug!(identity = %connection.identity, "message delivered");
                SendOutcome::Delivered
            }
            Err(e) => {
                error!(identity = %connection.identity, error = %e, "write failed, dropping connection");
                self.release(connection);
                SendOutcome::ChannelFailed
            }
        }
    }

    /// Deliver `message`'s payload to every live connection.
    ///
    /// Returns the number of successful deliveries. Connections whose write
    /// fails are released.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let targets: Vec<Arc<Connection>> = self.connections.lock().values().cloned().collect();
        let frame = message.frame();

        let results = join_all(targets.iter().map(|connection| {
            let frame = frame.clone();
            async move { (connection, connection.write(frame).await) }
        }))
        .await;

        let mut sent = 0;
        for (connection, result) in results {
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(identity = %connection.identity, error = %e, "broadcast write failed");
                    self.release(connection);
                }
            }
        }
        sent
    }

    /// Close every connection concurrently and empty the registry.
    pub async fn close_all(&self, code: u16, reason: &str) {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.lock();
            connections.drain().map(|(_, connection)| connection).collect()
        };

        let results = join_all(drained.iter().map(|connection| async move {
            (connection, connection.close(code, reason).await)
        }))
        .await;
        for (connection, result) in results {
            if let Err(e) = result {
                debug!(identity = %connection.identity, error = %e, "close failed");
            }
            self.notify_disconnect(connection);
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all connections");
        }
    }

    fn notify_disconnect(&self, connection: &Connection) {
        for observer in &self.observers {
            observer.on_disconnect(&connection.identity, connection.serial);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
