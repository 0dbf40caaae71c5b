//! HTTP interface module.
//!
//! Provides endpoints for:
//! - One-way and batch push
//! - Correlated request/response streamed over SSE
//! - Health checks and metrics

pub mod push;
pub mod routes;

pub(crate) mod monitoring;
