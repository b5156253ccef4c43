//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Error Pages    │ ← HTML 404/405, 500 on panic (if enabled)
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Dedup Guard    │ ← 400 missing id, 403 duplicate in flight
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 if exceeded
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! - `/health`, `/stats` - Health & monitoring (GET, never deduplicated)
//! - `/jobs` - Demo job submission guarded by the dedup filter

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{ErrorPageFilter, FilterLayer};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// The dedup layer shares the filter held by `state`, so `/stats` reports
/// on the same table the guard writes to.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::stats))
        .route("/jobs", post(handlers::submit_job));

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit
    info!(
        max_size_bytes = config.max_request_body_size,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. Deduplication guard
    info!(
        header = %state.dedup.header_name(),
        reject_on_missing_id = state.dedup.rejects_missing_id(),
        trusted_proxies = config.trusted_proxies.len(),
        "Request deduplication enabled"
    );
    router = router.layer(FilterLayer::from_shared(state.dedup.clone()));

    // 3. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 4. Error pages (if enabled) - outermost, sees every status below it
    if config.error_pages_enabled {
        info!("Error pages enabled");
        router = router.layer(FilterLayer::new(ErrorPageFilter::new()));
    } else {
        info!("Error pages disabled (ERROR_PAGES_ENABLED=false)");
    }

    router.with_state(state)
}
