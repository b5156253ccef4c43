use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for submitting a job.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitJobRequest {
    /// Job name
    pub name: String,
    /// Simulated processing time in milliseconds
    #[serde(default)]
    pub work_ms: u64,
}

/// Response after a job has been processed.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    /// Server-assigned job id
    pub job_id: Uuid,
    /// Job name as submitted
    pub name: String,
    /// Value of the dedup header, if the request carried one
    pub request_id: Option<String>,
    /// When the handler started the job
    pub accepted_at: DateTime<Utc>,
    /// When the job finished
    pub completed_at: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Statistics response.
///
/// Read directly from the in-flight table, so the numbers reflect requests
/// being processed at the moment of the call.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Clients with at least one reservation
    pub inflight_clients: usize,
    /// Reservations across all clients
    pub inflight_requests: usize,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Header carrying the request id
    pub dedup_header: String,
    /// Whether requests without an id are rejected
    pub reject_on_missing_id: bool,
}
