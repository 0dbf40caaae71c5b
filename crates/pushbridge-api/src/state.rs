//! Application state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pushbridge_config::Config;
use pushbridge_core::{Bridge, BridgeConfig};

/// Keepalive and buffering for WebSocket connections.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub outbound_buffer: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
        }
    }
}

/// Mount points of the configurable endpoints.
#[derive(Debug, Clone)]
pub struct RoutePaths {
    pub websocket: String,
    pub push: String,
    pub batch: String,
    pub send: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            websocket: "/ws".to_string(),
            push: "/sse/push".to_string(),
            batch: "/sse/push/batch".to_string(),
            send: "/sse/send".to_string(),
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub bridge: Arc<Bridge>,
    pub websocket: WebSocketSettings,
    pub paths: RoutePaths,
    start_time: Instant,
}

impl AppState {
    pub fn new(bridge: Arc<Bridge>, websocket: WebSocketSettings, paths: RoutePaths) -> Self {
        Self {
            bridge,
            websocket,
            paths,
            start_time: Instant::now(),
        }
    }

    /// Build the bridge and settings from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let bridge = Bridge::new(BridgeConfig {
            public_accounts: config.routing.public_accounts.clone(),
            mention_fields: config.routing.mention_fields.clone(),
            response_timeout: Duration::from_secs(config.sse.response_timeout_secs),
            reply_buffer: config.sse.reply_buffer,
        });
        let websocket = WebSocketSettings {
            ping_interval: Duration::from_secs(config.websocket.ping_interval_secs),
            ping_timeout: Duration::from_secs(config.websocket.ping_timeout_secs),
            outbound_buffer: config.websocket.outbound_buffer,
        };
        let paths = RoutePaths {
            websocket: config.websocket.path.clone(),
            push: config.sse.push_path.clone(),
            batch: config.sse.batch_path.clone(),
            send: config.sse.send_path.clone(),
        };
        Self::new(Arc::new(bridge), websocket, paths)
    }

    /// Get uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            Arc::new(Bridge::default()),
            WebSocketSettings::default(),
            RoutePaths::default(),
        )
    }
}
