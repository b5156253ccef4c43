//! Error page filter.
//!
//! Outermost filter that turns bare 404/405 responses into small HTML pages
//! and converts panics raised anywhere further down the chain into a 500
//! response carrying the panic message.
//!
//! Install it as the last `Router::layer` call so it sees statuses produced
//! by inner filters, the method router and the router fallback.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use tracing::error;

use super::chain::{Filter, Next};
use crate::metrics;

/// Body written for 404 responses.
pub const NOT_FOUND_PAGE: &str = "<h1>404 Not Found</h1>";

/// Body written for 405 responses.
pub const METHOD_NOT_ALLOWED_PAGE: &str = "<h1>405 Method Not Allowed</h1>";

static CONTENT_TYPE_HTML: HeaderValue = HeaderValue::from_static("text/html; charset=utf-8");
static CONTENT_TYPE_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

/// Filter rendering error pages and recovering from downstream panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorPageFilter;

impl ErrorPageFilter {
    /// Create the filter.
    pub fn new() -> Self {
        Self
    }
}

impl Filter for ErrorPageFilter {
    async fn process(&self, req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%method, %path, panic = %message, "Request handler panicked");
                metrics::record_panic();
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(CONTENT_TYPE, CONTENT_TYPE_PLAIN.clone())],
                    message,
                )
                    .into_response();
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => replace_body(response, NOT_FOUND_PAGE),
            StatusCode::METHOD_NOT_ALLOWED => replace_body(response, METHOD_NOT_ALLOWED_PAGE),
            _ => response,
        }
    }
}

/// Swap the body for an HTML page, keeping status and other headers.
fn replace_body(response: Response, page: &'static str) -> Response {
    let (mut parts, _) = response.into_parts();
    parts.headers.insert(CONTENT_TYPE, CONTENT_TYPE_HTML.clone());
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(page))
}

/// Extract a printable message from a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "request handler panicked".to_string()
    }
}
