//! Correlated request/response flows.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::correlation::{CorrelationTable, ReplyStream};
use crate::error::StreamError;
use crate::message::Message;
use crate::registry::{ConnectionRegistry, SendOutcome};
use crate::router::MessageRouter;

/// Default time a caller waits for the final reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one message and hands back the stream of its correlated replies.
#[derive(Clone)]
pub struct RequestResponseStream {
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
    correlations: Arc<CorrelationTable>,
    timeout: Duration,
}

impl RequestResponseStream {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<MessageRouter>,
        correlations: Arc<CorrelationTable>,
    ) -> Self {
        Self {
            registry,
            router,
            correlations,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a flow with the default timeout.
    pub async fn start(&self, message: Message) -> Result<ReplyStream, StreamError> {
        self.start_with_timeout(message, self.timeout).await
    }

    /// Route `message`, open its correlation, send it once and return the
    /// reply stream.
    ///
    /// The correlation is opened before the send so a reply arriving
    /// immediately after delivery is never lost. It is owned by the target's
    /// current connection. Every error path leaves no entry behind.
    ///
    /// # Errors
    ///
    /// - [`StreamError::MissingCorrelationId`] if the message has no correlation id
    /// - [`StreamError::DuplicateCorrelation`] if the id is already in flight; nothing is sent
    /// - [`StreamError::NotConnected`] if the resolved target has no live connection
    /// - [`StreamError::ConnectionLost`] if the write to the target fails
    pub async fn start_with_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<ReplyStream, StreamError> {
        let message = self.router.route(message);
        let correlation_id = message
            .correlation_id()
            .ok_or(StreamError::MissingCorrelationId)?
            .to_string();
        let target = message.target().to_string();

        let Some(connection) = self.registry.get(&target) else {
            warn!(correlation_id = %correlation_id, target = %target, "request target not connected");
            return Err(StreamError::NotConnected { identity: target });
        };

        // The flow belongs to this connection only; a reconnect under the
        // same identity gets flows of its own.
        self.correlations.open_owned(
            &correlation_id,
            &target,
            connection.serial(),
            Instant::now() + timeout,
        )?;
        // Taking the stream first ties the entry's lifetime to it: any early
        // return below drops the stream and closes the entry.
        let replies = self.correlations.consume(&correlation_id)?;

        match self.registry.send_to(&connection, &message).await {
            SendOutcome::Delivered => {
                debug!(correlation_id = %correlation_id, target = %target, "request sent, awaiting replies");
                Ok(replies)
            }
            SendOutcome::NotConnected => Err(StreamError::NotConnected { identity: target }),
            SendOutcome::ChannelFailed => {
                warn!(correlation_id = %correlation_id, target = %target, "request write failed");
                Err(StreamError::ConnectionLost)
            }
        }
    }
}
