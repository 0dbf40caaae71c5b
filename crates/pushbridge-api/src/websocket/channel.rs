//! Bridge-facing write half of a WebSocket connection.

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use pushbridge_core::{Channel, ChannelError};

/// Work queued for the connection task.
#[derive(Debug, PartialEq)]
pub(crate) enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// [`Channel`] backed by a bounded queue drained by the connection task.
///
/// Writers wait while the queue is full. A close never waits: it is queued
/// behind pending frames when there is room, otherwise it overtakes them.
/// Once the task has exited every operation fails with
/// [`ChannelError::Closed`].
pub struct WsChannel {
    tx: mpsc::Sender<Outbound>,
    close_tx: watch::Sender<Option<(u16, String)>>,
}

impl WsChannel {
    pub(crate) fn new(buffer: usize) -> (Self, Outbox) {
        let (tx, frames) = mpsc::channel(buffer.max(1));
        let (close_tx, close) = watch::channel(None);
        (Self { tx, close_tx }, Outbox { frames, close })
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn write(&self, frame: String) -> Result<(), ChannelError> {
        self.tx
            .send(Outbound::Text(frame))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), ChannelError> {
        let close = Outbound::Close {
            code,
            reason: reason.to_string(),
        };
        match self.tx.try_send(close) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.close_tx.send_replace(Some((code, reason.to_string())));
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(ChannelError::Closed),
        }
    }
}

/// Receiving end of a [`WsChannel`], owned by the connection task.
pub(crate) struct Outbox {
    frames: mpsc::Receiver<Outbound>,
    close: watch::Receiver<Option<(u16, String)>>,
}

impl Outbox {
    /// Next piece of work. An overtaking close comes first.
    ///
    /// Returns `None` once the channel side is gone and the queue is empty.
    /// Cancel safe.
    pub(crate) async fn next(&mut self) -> Option<Outbound> {
        tokio::select! {
            biased;
            changed = self.close.changed() => match changed {
                Ok(()) => self
                    .close
                    .borrow_and_update()
                    .clone()
                    .map(|(code, reason)| Outbound::Close { code, reason }),
                Err(_) => self.frames.recv().await,
            },
            frame = self.frames.recv() => frame,
        }
    }
}
