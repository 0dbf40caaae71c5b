//! Transport seams.
//!
//! A [`Channel`] is the write half of one peer connection. The registry only
//! ever writes frames and closes; reading is owned by the transport task that
//! performed the handshake.

use async_trait::async_trait;

use crate::error::ChannelError;

/// Write side of a bidirectional, message-framed peer connection.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Write one text frame.
    async fn write(&self, frame: String) -> Result<(), ChannelError>;

    /// Close the connection with a protocol close code.
    async fn close(&self, code: u16, reason: &str) -> Result<(), ChannelError>;
}

/// Notified whenever a connection leaves the registry.
pub trait ConnectionObserver: Send + Sync {
    /// `serial` identifies the connection that left, see
    /// [`Connection::serial`](crate::registry::Connection::serial).
    fn on_disconnect(&self, identity: &str, serial: u64);
}
