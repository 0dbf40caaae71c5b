//! In-memory channel used by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::Channel;
use crate::error::ChannelError;

#[derive(Default)]
pub(crate) struct RecordingChannel {
    frames: Mutex<Vec<String>>,
    closed: Mutex<Option<(u16, String)>>,
    failing: AtomicBool,
    write_delay: Option<Duration>,
}

impl RecordingChannel {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        let channel = Self::default();
        channel.failing.store(true, Ordering::SeqCst);
        Arc::new(channel)
    }

    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_delay: Some(delay),
            ..Self::default()
        })
    }

    pub(crate) fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub(crate) fn json_frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub(crate) fn closed_with(&self) -> Option<(u16, String)> {
        self.closed.lock().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn write(&self, frame: String) -> Result<(), ChannelError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("peer went away".to_string()));
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), ChannelError> {
        *self.closed.lock() = Some((code, reason.to_string()));
        Ok(())
    }
}
