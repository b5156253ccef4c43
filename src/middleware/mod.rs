//! Request-processing filters.
//!
//! - **Filter chain**: the [`Filter`] contract and its Tower adapter
//! - **Client identity**: peer-address based client keys with trusted proxies
//! - **In-flight table**: shared `(client, request id)` reservations
//! - **Deduplication**: rejects overlapping requests sharing an id
//! - **Error pages**: HTML for 404/405 and panic recovery
//!
//! # Architecture
//!
//! ```text
//! Request → Error Page → Trace → Dedup Guard → Handler → Response
//!               ↓                     ↓
//!          404/405 HTML,       400 missing id,
//!          500 on panic        403 duplicate in flight
//! ```

pub mod chain;
pub mod dedup;
pub mod error_page;
pub mod inflight;
pub mod ip;

pub use chain::{Filter, FilterLayer, FilterService, Next};
pub use dedup::{
    DEFAULT_HEADER_NAME, DedupConfig, DedupFilter, DedupOutcome, request_id_from,
};
pub use error_page::ErrorPageFilter;
pub use inflight::{InflightTable, Reservation};
pub use ip::{ClientResolver, TrustedProxyConfig, UNKNOWN_CLIENT};
