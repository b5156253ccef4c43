//! In-flight request deduplication guard.
//!
//! Prevents a client from having two requests carrying the same
//! client-supplied identifier in flight at the same time.
//!
//! # Decision Flow
//!
//! ```text
//!                   ┌─────────────┐
//!   request ───────►│ method GET? │──yes──► next (bypassed)
//!                   └──────┬──────┘
//!                          │ no
//!                   ┌──────▼──────┐        reject_on_missing_id
//!                   │ id header?  │──no──► ├─ true:  400 missing_request_id
//!                   └──────┬──────┘        └─ false: next (no reservation)
//!                          │ yes
//!                   ┌──────▼──────┐
//!                   │ reserve     │──taken──► 403 duplicate_request
//!                   │ (client,id) │
//!                   └──────┬──────┘
//!                          │ admitted
//!                          ▼
//!                   next, then release (also on panic / cancellation)
//! ```
//!
//! # Client Usage
//!
//! ```bash
//! curl -X POST -H "Request-Id: order-42" http://localhost:3000/jobs \
//!      -H "Content-Type: application/json" -d '{"name":"import","work_ms":2000}'
//! ```
//!
//! A second request with `Request-Id: order-42` from the same address while
//! the first is running is rejected with 403. Once the first completes the
//! identifier can be used again. Admission decisions are final: the guard
//! never queues or retries.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use super::chain::{Filter, Next};
use super::inflight::InflightTable;
use super::ip::{ClientResolver, TrustedProxyConfig};
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Header carrying the request identifier unless configured otherwise.
pub const DEFAULT_HEADER_NAME: &str = "Request-Id";

/// Default message for a rejected duplicate.
pub const DEFAULT_DUPLICATE_MESSAGE: &str = "request already accepted before, please wait";

/// Deduplication settings as supplied by the operator.
///
/// Empty strings fall back to defaults when the filter is built.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Header to read the request identifier from.
    pub header_name: String,
    /// Reject non-GET requests that carry no identifier (400) instead of
    /// passing them through.
    pub reject_on_missing_id: bool,
    /// Message returned with the 400 response.
    pub missing_id_message: String,
    /// Message returned with the 403 response.
    pub duplicate_message: String,
    /// CIDR ranges of proxies allowed to supply forwarded client addresses.
    pub trusted_proxies: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
            reject_on_missing_id: false,
            missing_id_message: String::new(),
            duplicate_message: String::new(),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Terminal state of a request passing through the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// GET request, table not consulted.
    Bypassed,
    /// No identifier and the pass-through policy is active.
    PassedWithoutId,
    /// No identifier and the reject policy is active.
    RejectedMissingId,
    /// Identifier already reserved for this client.
    RejectedDuplicate,
    /// Reserved, processed, released.
    Admitted,
}

impl DedupOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            DedupOutcome::Bypassed => "bypassed",
            DedupOutcome::PassedWithoutId => "passed_without_id",
            DedupOutcome::RejectedMissingId => "rejected_missing_id",
            DedupOutcome::RejectedDuplicate => "rejected_duplicate",
            DedupOutcome::Admitted => "admitted",
        }
    }
}

/// Filter rejecting overlapping requests that share a client-supplied id.
#[derive(Debug)]
pub struct DedupFilter {
    header: HeaderName,
    reject_on_missing_id: bool,
    missing_id_message: String,
    duplicate_message: String,
    resolver: ClientResolver,
    table: Arc<InflightTable>,
}

impl DedupFilter {
    /// Validate `config`, apply defaults and create an empty table.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the header name is not a valid
    /// HTTP header name.
    pub fn new(config: DedupConfig) -> AppResult<Self> {
        let header_name = match config.header_name.trim() {
            "" => DEFAULT_HEADER_NAME,
            name => name,
        };
        let header = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
            AppError::ConfigError(format!("Invalid dedup header name '{header_name}': {e}"))
        })?;

        let missing_id_message = if config.missing_id_message.is_empty() {
            format!("header value {header_name} can't be empty")
        } else {
            config.missing_id_message
        };
        let duplicate_message = if config.duplicate_message.is_empty() {
            DEFAULT_DUPLICATE_MESSAGE.to_string()
        } else {
            config.duplicate_message
        };

        Ok(Self {
            header,
            reject_on_missing_id: config.reject_on_missing_id,
            missing_id_message,
            duplicate_message,
            resolver: ClientResolver::new(TrustedProxyConfig::new(&config.trusted_proxies)),
            table: Arc::new(InflightTable::new()),
        })
    }

    /// Header the identifier is read from.
    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }

    /// Whether requests without an identifier are rejected.
    pub fn rejects_missing_id(&self) -> bool {
        self.reject_on_missing_id
    }

    /// Message sent with a 400 for a missing identifier.
    pub fn missing_id_message(&self) -> &str {
        &self.missing_id_message
    }

    /// Message sent with a 403 for a duplicate.
    pub fn duplicate_message(&self) -> &str {
        &self.duplicate_message
    }

    /// The shared in-flight table.
    pub fn table(&self) -> &Arc<InflightTable> {
        &self.table
    }

    /// Discard every reservation.
    ///
    /// Requests still running are not interrupted; their guards release into
    /// the cleared table as no-ops.
    pub fn shutdown(&self) {
        let discarded = self.table.clear();
        info!(discarded, "Deduplication table cleared");
    }

    /// Identifier carried by `req`, if present and non-empty.
    fn request_id(&self, req: &Request) -> Option<String> {
        req.headers().get(&self.header).and_then(request_id_from)
    }
}

/// Request identifier held in a header value.
///
/// Only a zero-length value counts as absent. The value is read as UTF-8;
/// bytes that are not valid UTF-8 become U+FFFD.
pub fn request_id_from(value: &HeaderValue) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(value.as_bytes()).into_owned())
}

impl Filter for DedupFilter {
    async fn process(&self, req: Request, next: Next) -> Response {
        if req.method() == Method::GET {
            metrics::record_dedup_outcome(DedupOutcome::Bypassed.as_str());
            return next.run(req).await;
        }

        let Some(request_id) = self.request_id(&req) else {
            if self.reject_on_missing_id {
                metrics::record_dedup_outcome(DedupOutcome::RejectedMissingId.as_str());
                return AppError::MissingRequestId(self.missing_id_message.clone())
                    .into_response();
            }
            metrics::record_dedup_outcome(DedupOutcome::PassedWithoutId.as_str());
            return next.run(req).await;
        };

        let client = self.resolver.resolve(&req).into_owned();
        let method = req.method().clone();

        let Some(reservation) = self.table.admit(client.clone(), request_id.clone()) else {
            warn!(
                client = %client,
                request_id = %request_id,
                method = %method,
                path = %req.uri().path(),
                "Rejected overlapping request"
            );
            metrics::record_dedup_outcome(DedupOutcome::RejectedDuplicate.as_str());
            return AppError::DuplicateRequest(self.duplicate_message.clone()).into_response();
        };

        debug!(
            client = %reservation.client(),
            request_id = %reservation.request_id(),
            method = %method,
            "Request admitted"
        );
        metrics::record_dedup_outcome(DedupOutcome::Admitted.as_str());

        let started = Instant::now();
        let response = next.run(req).await;
        metrics::record_admitted_duration(
            method.as_str(),
            response.status().as_str(),
            started.elapsed().as_secs_f64(),
        );

        drop(reservation);
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let filter = DedupFilter::new(DedupConfig::default()).unwrap();

        assert_eq!(filter.header_name().as_str(), "request-id");
        assert!(!filter.rejects_missing_id());
        assert_eq!(
            filter.missing_id_message(),
            "header value Request-Id can't be empty"
        );
        assert_eq!(filter.duplicate_message(), DEFAULT_DUPLICATE_MESSAGE);
        assert!(filter.table().is_empty());
    }

    #[test]
    fn test_empty_header_name_falls_back_to_default() {
        let filter = DedupFilter::new(DedupConfig {
            header_name: "  ".to_string(),
            ..DedupConfig::default()
        })
        .unwrap();

        assert_eq!(filter.header_name().as_str(), "request-id");
    }

    #[test]
    fn test_missing_id_message_names_custom_header() {
        let filter = DedupFilter::new(DedupConfig {
            header_name: "Idempotency-Key".to_string(),
            ..DedupConfig::default()
        })
        .unwrap();

        assert_eq!(
            filter.missing_id_message(),
            "header value Idempotency-Key can't be empty"
        );
    }

    #[test]
    fn test_custom_messages_kept() {
        let filter = DedupFilter::new(DedupConfig {
            missing_id_message: "send an id".to_string(),
            duplicate_message: "slow down".to_string(),
            reject_on_missing_id: true,
            ..DedupConfig::default()
        })
        .unwrap();

        assert!(filter.rejects_missing_id());
        assert_eq!(filter.missing_id_message(), "send an id");
        assert_eq!(filter.duplicate_message(), "slow down");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let result = DedupFilter::new(DedupConfig {
            header_name: "Request Id".to_string(),
            ..DedupConfig::default()
        });

        let err = result.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("Request Id"));
    }

    #[test]
    fn test_request_id_extraction() {
        let filter = DedupFilter::new(DedupConfig::default()).unwrap();

        let with_id = Request::builder()
            .method("POST")
            .header("request-id", "abc")
            .body(axum::body::Body::empty())
            .unwrap();
        let empty = Request::builder()
            .method("POST")
            .header("request-id", "")
            .body(axum::body::Body::empty())
            .unwrap();
        let utf8 = Request::builder()
            .method("POST")
            .header("request-id", "заказ-1")
            .body(axum::body::Body::empty())
            .unwrap();
        let obs_text = Request::builder()
            .method("POST")
            .header("request-id", HeaderValue::from_bytes(b"caf\xe9").unwrap())
            .body(axum::body::Body::empty())
            .unwrap();

        assert_eq!(filter.request_id(&with_id), Some("abc".to_string()));
        assert_eq!(filter.request_id(&empty), None);
        assert_eq!(filter.request_id(&utf8), Some("заказ-1".to_string()));
        assert_eq!(filter.request_id(&obs_text), Some("caf\u{FFFD}".to_string()));
    }

    #[test]
    fn test_shutdown_clears_table() {
        let filter = DedupFilter::new(DedupConfig::default()).unwrap();
        filter.table().reserve("10.0.0.1", "abc");

        filter.shutdown();

        assert!(filter.table().is_empty());
    }

    #[test]
    fn test_outcome_labels_are_distinct() {
        let labels = [
            DedupOutcome::Bypassed,
            DedupOutcome::PassedWithoutId,
            DedupOutcome::RejectedMissingId,
            DedupOutcome::RejectedDuplicate,
            DedupOutcome::Admitted,
        ]
        .map(DedupOutcome::as_str);

        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
