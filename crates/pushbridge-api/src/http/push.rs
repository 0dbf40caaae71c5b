//! Push handlers.
//!
//! One-way push, batch push, and the correlated request/response endpoint
//! whose replies are streamed back as server-sent events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    Json,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use pushbridge_core::{
    BatchItemResult, Message, Payload, SendOutcome, StreamError, CORRELATION_ID_FIELD,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of every push endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PushRequest {
    /// Target identity.
    pub user_id: String,

    /// Payload delivered to the peer as-is.
    pub data: Payload,

    pub event_type: Option<String>,

    pub event_id: Option<String>,

    /// Unix seconds. Defaults to the time of receipt.
    pub timestamp: Option<f64>,
}

impl PushRequest {
    /// Validate and convert into a core message.
    pub fn into_message(self) -> Result<Message, ApiError> {
        if self.user_id.is_empty() {
            return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
        }

        let mut message = Message::new(self.user_id, self.data);
        if let Some(event_type) = self.event_type {
            message = message.with_event_type(event_type);
        }
        if let Some(event_id) = self.event_id {
            message = message.with_event_id(event_id);
        }
        if let Some(ts) = self.timestamp {
            message = message.with_timestamp(unix_seconds(ts)?);
        }
        Ok(message)
    }
}

fn unix_seconds(ts: f64) -> Result<DateTime<Utc>, ApiError> {
    let invalid = || ApiError::BadRequest(format!("timestamp out of range: {}", ts));
    if !ts.is_finite() {
        return Err(invalid());
    }
    DateTime::from_timestamp_micros((ts * 1_000_000.0).round() as i64).ok_or_else(invalid)
}

/// Result of a one-way push.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl From<SendOutcome> for PushResponse {
    fn from(outcome: SendOutcome) -> Self {
        if outcome.is_delivered() {
            Self {
                status: "success",
                message: "Message delivered",
            }
        } else {
            Self {
                status: "partial",
                message: "User not connected",
            }
        }
    }
}

/// Result of a batch push.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResult>,
}

/// One-way push to a single identity.
pub async fn push(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, ApiError> {
    let message = request.into_message()?;
    let requested = message.target().to_string();
    let outcome = state.bridge.push(message).await;

    info!(user_id = %requested, outcome = ?outcome, "push handled");
    Ok(Json(outcome.into()))
}

/// Push many messages; every item succeeds or fails on its own.
pub async fn push_batch(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<PushRequest>>,
) -> Result<Json<BatchResponse>, ApiError> {
    let messages = requests
        .into_iter()
        .enumerate()
        .map(|(index, request)| {
            request.into_message().map_err(|e| {
                ApiError::BadRequest(format!("item {}: {}", index, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let results = state.bridge.push_batch(messages).await;
    Ok(Json(BatchResponse { results }))
}

/// Send one request and stream its correlated replies.
///
/// The correlation id is taken from `data.correlation_id` or generated; a
/// non-string `data.correlation_id` is rejected.
/// Each reply becomes one `data:` event. A terminal failure is sent as a
/// last event of the form `{"error": ..., "correlation_id": ...}`.
pub async fn send(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PushRequest>,
) -> Result<Sse<KeepAliveStream<BoxStream<'static, Result<Event, Infallible>>>>, ApiError> {
    if request
        .data
        .get(CORRELATION_ID_FIELD)
        .is_some_and(|id| !id.is_string())
    {
        return Err(ApiError::BadRequest(
            "data.correlation_id must be a string".to_string(),
        ));
    }
    let mut message = request.into_message()?;
    let correlation_id = match message.correlation_id() {
        Some(id) => id.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            message = message.with_correlation_id(id.clone());
            id
        }
    };
    debug!(correlation_id = %correlation_id, user_id = %message.target(), "request received");

    let events = match state.bridge.request(message).await {
        Ok(replies) => replies
            .map(move |item| {
                Ok::<_, Infallible>(match item {
                    Ok(reply) => Event::default().data(reply.frame()),
                    Err(e) => error_event(&e, &correlation_id),
                })
            })
            .boxed(),
        Err(e) => {
            info!(correlation_id = %correlation_id, error = %e, "request not started");
            stream::once(async move { Ok::<_, Infallible>(error_event(&e, &correlation_id)) }).boxed()
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn error_event(err: &StreamError, correlation_id: &str) -> Event {
    Event::default().data(error_body(err, correlation_id).to_string())
}

fn error_body(err: &StreamError, correlation_id: &str) -> Value {
    json!({
        "error": err.to_string(),
        "correlation_id": correlation_id,
    })
}
