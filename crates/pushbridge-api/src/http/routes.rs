//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::http::monitoring;
use crate::http::push;
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Create the main router.
///
/// ## Route Structure
///
/// ```text
/// GET  {websocket}  - WebSocket connection, `?user_id=<identity>` (default /ws)
/// POST {push}       - One-way push (default /sse/push)
/// POST {batch}      - Batch push (default /sse/push/batch)
/// POST {send}       - Request/response over SSE (default /sse/send)
///
/// GET  /health      - Health check
/// GET  /metrics     - Connection and correlation counts
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    let paths = state.paths.clone();

    let push_routes = Router::new()
        .route(&paths.push, post(push::push))
        .route(&paths.batch, post(push::push_batch))
        .route(&paths.send, post(push::send))
        .with_state(state.clone());

    let monitoring_routes = Router::new()
        .route("/health", get(monitoring::health_check))
        .route("/metrics", get(monitoring::metrics))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route(&paths.websocket, get(ws_handler))
        .with_state(state);

    Router::new()
        .merge(push_routes)
        .merge(monitoring_routes)
        .merge(ws_route)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
