//! Health and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /stats` - In-flight reservation statistics
//!
//! Both are GET routes and therefore never consult the dedup table for
//! admission; `/stats` only reads it.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, StatsResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip_all)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Statistics endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "inflight_clients": 1,
///   "inflight_requests": 2,
///   "uptime_seconds": 3600,
///   "dedup_header": "request-id",
///   "reject_on_missing_id": false
/// }
/// ```
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let table = state.dedup.table();

    Json(StatsResponse {
        inflight_clients: table.client_count(),
        inflight_requests: table.len(),
        uptime_seconds: state.uptime_seconds(),
        dedup_header: state.dedup.header_name().to_string(),
        reject_on_missing_id: state.dedup.rejects_missing_id(),
    })
}
