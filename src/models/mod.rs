mod api;

pub use api::{HealthResponse, JobResponse, StatsResponse, SubmitJobRequest};
