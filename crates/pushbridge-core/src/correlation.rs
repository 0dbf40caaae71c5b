//! Correlation table and reply streams.
//!
//! Each pending flow owns a bounded single-producer/single-consumer queue and
//! a fixed deadline. The consumer side is a [`ReplyStream`], a hand-written
//! [`Stream`] that ends on a final reply, on the deadline, or when the entry
//! is removed from under it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info};

use crate::channel::ConnectionObserver;
use crate::error::{CorrelationError, StreamError};
use crate::message::Message;

/// Default reply queue capacity per flow.
pub const DEFAULT_REPLY_BUFFER: usize = 64;

struct PendingCorrelation {
    owner: String,
    /// Serial of the owning connection; `None` matches any connection.
    owner_serial: Option<u64>,
    flow: u64,
    deadline: Instant,
    tx: mpsc::Sender<Message>,
    rx: Option<mpsc::Receiver<Message>>,
}

/// Correlation id → pending reply sink.
pub struct CorrelationTable {
    entries: DashMap<String, PendingCorrelation>,
    capacity: usize,
    next_flow: AtomicU64,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLY_BUFFER)
    }

    /// Create a table whose reply queues hold up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            next_flow: AtomicU64::new(1),
        }
    }

    /// Open a flow for `correlation_id`, fulfilled by `owner`, expiring at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::DuplicateCorrelation`] while another flow
    /// with the same id is active.
    pub fn open(
        &self,
        correlation_id: &str,
        owner: &str,
        deadline: Instant,
    ) -> Result<(), CorrelationError> {
        self.insert(correlation_id, owner, None, deadline)
    }

    /// Like [`open`](Self::open), but bound to one connection of `owner`.
    ///
    /// Only the loss of that connection (same `serial`) fails the flow; a
    /// stale disconnect of an earlier connection under the same identity
    /// leaves it alone.
    pub fn open_owned(
        &self,
        correlation_id: &str,
        owner: &str,
        serial: u64,
        deadline: Instant,
    ) -> Result<(), CorrelationError> {
        self.insert(correlation_id, owner, Some(serial), deadline)
    }

    fn insert(
        &self,
        correlation_id: &str,
        owner: &str,
        owner_serial: Option<u64>,
        deadline: Instant,
    ) -> Result<(), CorrelationError> {
        match self.entries.entry(correlation_id.to_string()) {
            MapEntry::Occupied(_) => Err(CorrelationError::DuplicateCorrelation(
                correlation_id.to_string(),
            )),
            MapEntry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(self.capacity);
                slot.insert(PendingCorrelation {
                    owner: owner.to_string(),
                    owner_serial,
                    flow: self.next_flow.fetch_add(1, Ordering::Relaxed),
                    deadline,
                    tx,
                    rx: Some(rx),
                });
                debug!(correlation_id, owner, "correlation opened");
                Ok(())
            }
        }
    }

    /// Append a reply to the flow.
    ///
    /// Waits while the flow's queue is full, but never past the flow's
    /// deadline.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::NotFound`] if no flow is open for the id or
    /// its deadline passes before the reply is queued. Callers log and drop
    /// the reply.
    pub async fn push(&self, correlation_id: &str, message: Message) -> Result<(), CorrelationError> {
        let (tx, deadline) = {
            let entry = self
                .entries
                .get(correlation_id)
                .ok_or_else(|| CorrelationError::NotFound(correlation_id.to_string()))?;
            if Instant::now() >= entry.deadline {
                return Err(CorrelationError::NotFound(correlation_id.to_string()));
            }
            (entry.tx.clone(), entry.deadline)
        };

        match tokio::time::timeout_at(deadline, tx.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CorrelationError::NotFound(correlation_id.to_string())),
            Err(_) => {
                debug!(correlation_id, "reply queue still full at deadline");
                Err(CorrelationError::NotFound(correlation_id.to_string()))
            }
        }
    }

    /// Remove the flow. Idempotent; returns whether an entry was removed.
    pub fn close(&self, correlation_id: &str) -> bool {
        let removed = self.entries.remove(correlation_id).is_some();
        if removed {
            debug!(correlation_id, "correlation closed");
        }
        removed
    }

    fn close_flow(&self, correlation_id: &str, flow: u64) {
        if self
            .entries
            .remove_if(correlation_id, |_, entry| entry.flow == flow)
            .is_some()
        {
            debug!(correlation_id, "correlation closed");
        }
    }

    /// Take the reply stream for the flow. Only one consumer per flow.
    ///
    /// # Errors
    ///
    /// [`CorrelationError::NotFound`] if no flow is open,
    /// [`CorrelationError::AlreadyConsumed`] on a second call.
    pub fn consume(self: &Arc<Self>, correlation_id: &str) -> Result<ReplyStream, CorrelationError> {
        let mut entry = self
            .entries
            .get_mut(correlation_id)
            .ok_or_else(|| CorrelationError::NotFound(correlation_id.to_string()))?;
        let rx = entry
            .rx
            .take()
            .ok_or_else(|| CorrelationError::AlreadyConsumed(correlation_id.to_string()))?;
        let flow = entry.flow;
        let deadline = entry.deadline;
        drop(entry);

        Ok(ReplyStream {
            correlation_id: correlation_id.to_string(),
            flow,
            rx,
            expiry: Box::pin(tokio::time::sleep_until(deadline)),
            table: Arc::clone(self),
            finished: false,
        })
    }

    /// Close every flow owned by `identity`. Their consumers end with
    /// [`StreamError::ConnectionLost`].
    pub fn fail_owner(&self, identity: &str) -> usize {
        let owned: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.owner == identity)
            .map(|entry| entry.key().clone())
            .collect();

        let failed = owned
            .iter()
            .filter(|id| {
                self.entries
                    .remove_if(id.as_str(), |_, entry| entry.owner == identity)
                    .is_some()
            })
            .count();
        if failed > 0 {
            info!(identity, failed, "failed pending correlations for lost connection");
        }
        failed
    }

    /// Close the flows owned by one specific connection of `identity`.
    ///
    /// Flows opened without a serial count as owned by every connection of
    /// the identity.
    pub fn fail_connection(&self, identity: &str, serial: u64) -> usize {
        let owns = |entry: &PendingCorrelation| {
            entry.owner == identity && entry.owner_serial.is_none_or(|s| s == serial)
        };
        let owned: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| owns(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let failed = owned
            .iter()
            .filter(|id| self.entries.remove_if(id.as_str(), |_, entry| owns(entry)).is_some())
            .count();
        if failed > 0 {
            info!(identity, serial, failed, "failed pending correlations for lost connection");
        }
        failed
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.entries.contains_key(correlation_id)
    }

    /// Number of pending flows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionObserver for CorrelationTable {
    fn on_disconnect(&self, identity: &str, serial: u64) {
        self.fail_connection(identity, serial);
    }
}

/// Finite, non-restartable sequence of replies for one correlation id.
///
/// Yields `Ok(message)` per reply. Ends after a reply marked `is_final`, or
/// with a single `Err` item: [`StreamError::Timeout`] when the deadline
/// passes, [`StreamError::ConnectionLost`] when the flow is closed externally.
/// Dropping the stream closes the flow.
pub struct ReplyStream {
    correlation_id: String,
    flow: u64,
    rx: mpsc::Receiver<Message>,
    expiry: Pin<Box<Sleep>>,
    table: Arc<CorrelationTable>,
    finished: bool,
}

impl ReplyStream {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn finish(&mut self) {
        self.finished = true;
        self.table.close_flow(&self.correlation_id, self.flow);
    }
}

impl Stream for ReplyStream {
    type Item = Result<Message, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(message)) => {
                if message.is_final() {
                    this.finish();
                }
                return Poll::Ready(Some(Ok(message)));
            }
            Poll::Ready(None) => {
                this.finish();
                return Poll::Ready(Some(Err(StreamError::ConnectionLost)));
            }
            Poll::Pending => {}
        }

        if this.expiry.as_mut().poll(cx).is_ready() {
            debug!(correlation_id = %this.correlation_id, "reply stream timed out");
            this.finish();
            return Poll::Ready(Some(Err(StreamError::Timeout)));
        }
        Poll::Pending
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        if !self.finished {
            self.table.close_flow(&self.correlation_id, self.flow);
        }
    }
}

impl std::fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyStream")
            .field("correlation_id", &self.correlation_id)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
#[path = "correlation_tests.rs"]
mod tests;
