//! Health and metrics handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

/// Service name reported by `/metrics`.
pub const SERVICE_NAME: &str = "pushbridge";

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    pub uptime: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
}

/// Metrics response.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub active_connections: usize,
    pub pending_correlations: usize,
    pub service: &'static str,
}

/// Liveness plus the live connection count.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        connections: state.bridge.registry().count(),
        uptime: "running",
        uptime_seconds: state.uptime().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        active_connections: state.bridge.registry().count(),
        pending_correlations: state.bridge.correlations().len(),
        service: SERVICE_NAME,
    })
}
