mod health;
mod jobs;

pub use health::{health_check, stats};
pub use jobs::submit_job;
