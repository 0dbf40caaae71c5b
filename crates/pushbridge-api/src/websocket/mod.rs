//! WebSocket transport.
//!
//! Each peer holds one connection keyed by its `user_id`. Outbound frames
//! reach the socket through a [`WsChannel`] registered with the bridge;
//! inbound frames carrying a correlation id are fed back as replies.

mod channel;
mod handler;
mod message;

pub use channel::WsChannel;
pub use handler::{ws_handler, ConnectParams};
pub use message::InboundFrame;
