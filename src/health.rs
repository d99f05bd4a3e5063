//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload with the server version,
//! uptime, the configured upstream and schema name, and cumulative
//! request statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub upstream: String,
    pub schema_name: String,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_rejected: u64,
    pub requests_failed: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        upstream: state.config.target.to_string(),
        schema_name: state.config.schema_name.clone(),
        stats: StatsResponse {
            requests_forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            requests_rejected: state.stats.rejected.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
        },
    })
}
