//! Demo job endpoint.
//!
//! `POST /jobs` simulates a slow, non-idempotent operation. Submitting the
//! same `Request-Id` twice while the first job is still sleeping is what the
//! dedup guard rejects.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::request_id_from;
use crate::models::{JobResponse, SubmitJobRequest};
use crate::state::AppState;
use crate::validation::{validate_job_name, validate_work_ms};

/// Submit a job and wait for it to finish.
///
/// # Request Body
///
/// ```json
/// { "name": "nightly-import", "work_ms": 2000 }
/// ```
///
/// # Errors
///
/// - 400 `serialization_error` for malformed or unexpected JSON
/// - 400 `bad_request` for an invalid name or `work_ms` above `JOB_MAX_WORK_MS`
#[instrument(skip_all)]
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let request: SubmitJobRequest = serde_json::from_slice(&body)?;

    validate_job_name(&request.name)?;
    let work = validate_work_ms(request.work_ms, state.config.job_max_work)?;

    let request_id = headers
        .get(state.dedup.header_name())
        .and_then(request_id_from);

    let job_id = Uuid::new_v4();
    let accepted_at = Utc::now();

    if !work.is_zero() {
        tokio::time::sleep(work).await;
    }

    info!(
        %job_id,
        name = %request.name,
        request_id = request_id.as_deref().unwrap_or("-"),
        work_ms = request.work_ms,
        "Job completed"
    );

    Ok((
        StatusCode::CREATED,
        Json(JobResponse {
            job_id,
            name: request.name,
            request_id,
            accepted_at,
            completed_at: Utc::now(),
        }),
    ))
}
