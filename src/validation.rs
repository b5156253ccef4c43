//! Input validation for the job endpoint.

use std::time::Duration;

use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for job names.
pub const MAX_JOB_NAME_LENGTH: usize = 128;

/// Validate a job name.
///
/// Rules:
/// - Must be between 1 and 128 characters
/// - Must start with an alphanumeric character
/// - Can contain alphanumeric characters, dots, underscores, and hyphens
pub fn validate_job_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::BadRequest("Job name cannot be empty".to_string()));
    }

    if name.len() > MAX_JOB_NAME_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Job name cannot exceed {MAX_JOB_NAME_LENGTH} characters"
        )));
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(
            "Job name must start with an alphanumeric character".to_string(),
        ));
    }

    if let Some(invalid) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(AppError::BadRequest(format!(
            "Job name contains invalid character '{invalid}'"
        )));
    }

    Ok(())
}

/// Validate the simulated work duration against the configured bound.
pub fn validate_work_ms(work_ms: u64, max: Duration) -> AppResult<Duration> {
    let work = Duration::from_millis(work_ms);
    if work > max {
        return Err(AppError::BadRequest(format!(
            "work_ms cannot exceed {}",
            max.as_millis()
        )));
    }
    Ok(work)
}
