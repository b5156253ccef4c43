//! Shared application state for Axum handlers.
//!
//! Holds the runtime configuration and the deduplication filter. The filter
//! is shared between the router layer that enforces it and the `/stats`
//! handler that reports on its table, so both observe the same reservations.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::middleware::DedupFilter;

/// Shared application state for Axum handlers.
///
/// Cloned for each request; all internal data sits behind `Arc`.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown();
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Deduplication filter and its in-flight table
    pub dedup: Arc<DedupFilter>,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Build the state, constructing the deduplication filter from `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the deduplication settings are
    /// invalid.
    pub fn new(config: Config) -> AppResult<Self> {
        let dedup = DedupFilter::new(config.dedup_config())?;

        Ok(Self {
            config: Arc::new(config),
            dedup: Arc::new(dedup),
            started_at: Instant::now(),
        })
    }

    /// Release everything held by the state.
    ///
    /// Call after the HTTP server has stopped accepting requests.
    pub fn shutdown(&self) {
        info!("Shutting down application state");
        self.dedup.shutdown();
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
