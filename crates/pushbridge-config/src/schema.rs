//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub sse: SseConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// `"*"` for any origin, otherwise a comma-separated origin list.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    /// Parsed origin list, or `None` when any origin is allowed.
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        let origins = self.cors_origins.trim();
        if origins == "*" {
            return None;
        }
        Some(
            origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> String {
    "*".to_string()
}

/// WebSocket transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_ws_path")]
    pub path: String,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Frames queued per connection before writers wait.
    #[serde(default = "default_buffer")]
    pub outbound_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_ws_path(),
            ping_interval_secs: default_ping_interval(),
            ping_timeout_secs: default_ping_timeout(),
            outbound_buffer: default_buffer(),
        }
    }
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_ping_interval() -> u64 {
    30
}

fn default_ping_timeout() -> u64 {
    10
}

fn default_buffer() -> usize {
    64
}

/// HTTP push endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    #[serde(default = "default_push_path")]
    pub push_path: String,

    #[serde(default = "default_batch_path")]
    pub batch_path: String,

    #[serde(default = "default_send_path")]
    pub send_path: String,

    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    /// Replies queued per pending request before the replying peer waits.
    #[serde(default = "default_buffer")]
    pub reply_buffer: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            push_path: default_push_path(),
            batch_path: default_batch_path(),
            send_path: default_send_path(),
            response_timeout_secs: default_response_timeout(),
            reply_buffer: default_buffer(),
        }
    }
}

fn default_push_path() -> String {
    "/sse/push".to_string()
}

fn default_batch_path() -> String {
    "/sse/push/batch".to_string()
}

fn default_send_path() -> String {
    "/sse/send".to_string()
}

fn default_response_timeout() -> u64 {
    30
}

/// Mention routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub public_accounts: Vec<String>,

    #[serde(default = "default_mention_fields")]
    pub mention_fields: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            public_accounts: Vec::new(),
            mention_fields: default_mention_fields(),
        }
    }
}

fn default_mention_fields() -> Vec<String> {
    vec![
        "message".to_string(),
        "text".to_string(),
        "content".to_string(),
    ]
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
