//! # Inflight Guard
//!
//! HTTP request-processing filters built on Axum and Tower, centred on a
//! guard that stops a client from running two requests with the same
//! client-supplied identifier at once:
//!
//! - **Filter chain**: a small `Filter` contract (pass through, wrap, or
//!   short-circuit) adapted to Tower layers
//! - **Deduplication**: `(client, Request-Id)` reservations held for exactly
//!   as long as the request is processed, released on every exit path
//! - **Error pages**: HTML 404/405 pages and panic recovery
//! - **Observability**: structured logging and Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Filters (Error Pages → Trace → Dedup Guard → Body Limit)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  InflightTable (client → set of in-flight request ids)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, stats, jobs)                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//!
//! use inflight_guard::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state.clone());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<SocketAddr>(),
//!     )
//!     .await?;
//!
//!     state.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Deduplication Configuration
//!
//! ```bash
//! DEDUP_HEADER=Idempotency-Key DEDUP_REJECT_ON_MISSING_ID=true cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::{Config, LogFormat};
pub use error::{AppError, AppResult};
pub use middleware::{DedupConfig, DedupFilter, ErrorPageFilter, Filter, FilterLayer, Next};
pub use routes::build_router;
pub use state::AppState;
