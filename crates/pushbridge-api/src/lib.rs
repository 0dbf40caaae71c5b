//! # Pushbridge API
//!
//! External surface of the pushbridge server.
//!
//! - **WebSocket**: one long-lived connection per identity, keepalive, reply intake
//! - **HTTP**: one-way push, batch push, health and metrics
//! - **SSE**: correlated request/response, replies streamed as server-sent events
//!
//! ## Architecture
//!
//! ```text
//!  peers ══ws══► websocket::handler ──connect/release──┐
//!                       │ replies                       ▼
//!                       └──────────────────────►  pushbridge_core::Bridge
//!  callers ─http─► http::push ──push/batch/request─────┘
//!          ◄─sse──────┘
//! ```

pub mod error;
pub mod http;
pub mod server;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use http::routes::create_router;
pub use server::{ApiConfig, ApiServer};
pub use state::{AppState, RoutePaths, WebSocketSettings};
pub use websocket::WsChannel;
