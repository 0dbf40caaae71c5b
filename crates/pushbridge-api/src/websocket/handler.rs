//! WebSocket handler implementation.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

use super::channel::{Outbound, Outbox, WsChannel};
use super::message::{InboundFrame, PONG_FRAME};

/// Close code sent when an identity is already connected.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Query string of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler: `GET {path}?user_id=<identity>`.
pub async fn ws_handler(
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let identity = match params.user_id {
        Some(id) if !id.is_empty() => id,
        _ => {
            return ApiError::BadRequest("user_id query parameter is required".to_string())
                .into_response();
        }
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

async fn handle_socket(socket: WebSocket, identity: String, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (channel, outbox) = WsChannel::new(state.websocket.outbound_buffer);

    let connection = match state
        .bridge
        .registry()
        .connect(identity.clone(), Arc::new(channel))
    {
        Ok(connection) => connection,
        Err(e) => {
            warn!(identity = %identity, "{}", e);
            let close = Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: "User already connected".into(),
            }));
            let _ = write_frame(&mut ws_tx, close, state.websocket.ping_timeout).await;
            return;
        }
    };

    run_connection(&identity, &state, &mut ws_tx, &mut ws_rx, outbox).await;

    state.bridge.registry().release(&connection);
    info!(identity = %identity, "WebSocket disconnected");
}

async fn run_connection<S, R>(
    identity: &str,
    state: &AppState,
    ws_tx: &mut S,
    ws_rx: &mut R,
    mut outbox: Outbox,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
    R: futures::Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let settings = &state.websocket;
    // Socket writes and reply hand-off may not stall the loop longer than this.
    let write_limit = settings.ping_timeout;
    let mut ping_interval =
        time::interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Set when a ping goes out, cleared by any inbound frame.
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let deadline = pong_deadline;
        let keepalive_expired = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            // Server -> peer
            outbound = outbox.next() => match outbound {
                Some(Outbound::Text(frame)) => {
                    if let Err(e) = write_frame(ws_tx, Message::Text(frame.into()), write_limit).await {
                        warn!(identity = %identity, error = %e, "failed to write frame");
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    debug!(identity = %identity, code, "closing connection");
                    let close = Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    }));
                    let _ = write_frame(ws_tx, close, write_limit).await;
                    break;
                }
                None => break,
            },

            // Peer -> server
            inbound = ws_rx.next() => {
                pong_deadline = None;
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match InboundFrame::parse(identity, text.as_str()) {
                            InboundFrame::Ping => {
                                if let Err(e) = write_frame(ws_tx, Message::Text(PONG_FRAME.into()), write_limit).await {
                                    warn!(identity = %identity, error = %e, "failed to write pong");
                                    break;
                                }
                            }
                            InboundFrame::Reply(reply) => {
                                // Unknown or expired correlations are logged by the bridge.
                                let delivered =
                                    time::timeout(write_limit, state.bridge.deliver_reply(reply)).await;
                                if delivered.is_err() {
                                    warn!(identity = %identity, "reply consumer stalled, dropping reply");
                                }
                            }
                            InboundFrame::Other => {
                                debug!(identity = %identity, "ignoring frame: {}", text.as_str());
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(identity = %identity, "WebSocket closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(identity = %identity, error = %e, "WebSocket error");
                        break;
                    }
                }
            },

            _ = ping_interval.tick() => {
                if let Err(e) = write_frame(ws_tx, Message::Ping(Bytes::new()), write_limit).await {
                    warn!(identity = %identity, error = %e, "failed to write ping");
                    break;
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + settings.ping_timeout);
                }
            },

            _ = keepalive_expired => {
                warn!(identity = %identity, "keepalive expired, dropping connection");
                break;
            },
        }
    }
}

/// Write one frame, failing if the peer does not accept it within `limit`.
async fn write_frame<S>(ws_tx: &mut S, frame: Message, limit: Duration) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    time::timeout(limit, ws_tx.send(frame))
        .await
        .map_err(|elapsed| axum::Error::new(elapsed))?
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
