//! Filter chain protocol.
//!
//! A [`Filter`] receives the request together with a [`Next`] continuation
//! representing the rest of the pipeline (later filters and the route
//! handler). It may:
//!
//! - act before and/or after calling `next.run(req)` (pass-through or wrap)
//! - return its own response without calling `next` (short-circuit)
//!
//! `Next::run` consumes the continuation, so a filter cannot invoke the rest
//! of the chain twice.
//!
//! # Composition
//!
//! Filters are adapted to Tower with [`FilterLayer`]. The host composes them
//! with `Router::layer` / `ServiceBuilder` in the usual Tower order:
//!
//! ```text
//! Request → FilterLayer(A) → FilterLayer(B) → Handler
//!              │                 │
//!              └─ A::process ────┴─ B::process → next.run(req)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! struct Audit;
//!
//! impl Filter for Audit {
//!     async fn process(&self, req: Request, next: Next) -> Response {
//!         let path = req.uri().path().to_string();
//!         let response = next.run(req).await;
//!         info!(%path, status = %response.status(), "served");
//!         response
//!     }
//! }
//!
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(FilterLayer::new(Audit));
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};

/// A unit of the request-processing chain.
///
/// Implementations are shared across all concurrent requests and must keep
/// any per-request state on the stack of `process`.
pub trait Filter: Send + Sync + 'static {
    /// Process a request, optionally delegating to the rest of the chain.
    fn process(&self, req: Request, next: Next) -> impl Future<Output = Response> + Send;
}

/// The remainder of the filter chain, including the route handler.
pub struct Next {
    inner: BoxCloneService<Request, Response, Infallible>,
}

impl Next {
    fn new<S>(inner: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        Self {
            inner: BoxCloneService::new(inner),
        }
    }

    /// Run the rest of the chain to completion and return its response.
    pub async fn run(self, req: Request) -> Response {
        match self.inner.oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// Tower layer installing a [`Filter`] in front of the wrapped service.
pub struct FilterLayer<F> {
    filter: Arc<F>,
}

impl<F: Filter> FilterLayer<F> {
    /// Create a layer owning `filter`.
    pub fn new(filter: F) -> Self {
        Self {
            filter: Arc::new(filter),
        }
    }

    /// Create a layer around a filter that is also referenced elsewhere
    /// (e.g. by application state for statistics and shutdown).
    pub fn from_shared(filter: Arc<F>) -> Self {
        Self { filter }
    }
}

impl<F> Clone for FilterLayer<F> {
    fn clone(&self) -> Self {
        Self {
            filter: Arc::clone(&self.filter),
        }
    }
}

impl<S, F> Layer<S> for FilterLayer<F> {
    type Service = FilterService<S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        FilterService {
            inner,
            filter: Arc::clone(&self.filter),
        }
    }
}

/// Service produced by [`FilterLayer`].
pub struct FilterService<S, F> {
    inner: S,
    filter: Arc<F>,
}

impl<S: Clone, F> Clone for FilterService<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            filter: Arc::clone(&self.filter),
        }
    }
}

impl<S, F> Service<Request> for FilterService<S, F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
    F: Filter,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let filter = Arc::clone(&self.filter);
        let next = Next::new(self.inner.clone());

        Box::pin(async move { Ok(filter.process(req, next).await) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use tower::{ServiceBuilder, service_fn};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        log: Log,
    }

    impl Filter for Recording {
        async fn process(&self, req: Request, next: Next) -> Response {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            let response = next.run(req).await;
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            response
        }
    }

    struct Reject {
        log: Log,
    }

    impl Filter for Reject {
        async fn process(&self, _req: Request, _next: Next) -> Response {
            self.log.lock().unwrap().push("reject".to_string());
            StatusCode::FORBIDDEN.into_response()
        }
    }

    struct StampHeader;

    impl Filter for StampHeader {
        async fn process(&self, req: Request, next: Next) -> Response {
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .insert("x-stamped", axum::http::HeaderValue::from_static("yes"));
            response
        }
    }

    fn handler(log: Log) -> BoxCloneService<Request, Response, Infallible> {
        BoxCloneService::new(service_fn(move |_req: Request| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                Ok::<_, Infallible>(Response::new(Body::from("handled")))
            }
        }))
    }

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_filters_run_in_composition_order() {
        let log: Log = Arc::default();
        let service = ServiceBuilder::new()
            .layer(FilterLayer::new(Recording {
                name: "outer",
                log: log.clone(),
            }))
            .layer(FilterLayer::new(Recording {
                name: "inner",
                log: log.clone(),
            }))
            .service(handler(log.clone()));

        let response = service.oneshot(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "outer:before",
                "inner:before",
                "handler",
                "inner:after",
                "outer:after"
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_stops_the_chain() {
        let log: Log = Arc::default();
        let service = ServiceBuilder::new()
            .layer(FilterLayer::new(Recording {
                name: "outer",
                log: log.clone(),
            }))
            .layer(FilterLayer::new(Reject { log: log.clone() }))
            .service(handler(log.clone()));

        let response = service.oneshot(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        // Outer filter still observes the rejection on the way back out.
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:before", "reject", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_filter_can_modify_downstream_response() {
        let log: Log = Arc::default();
        let service = ServiceBuilder::new()
            .layer(FilterLayer::new(StampHeader))
            .service(handler(log));

        let response = service.oneshot(request()).await.unwrap();

        assert_eq!(response.headers().get("x-stamped").unwrap(), "yes");
    }

    #[tokio::test]
    async fn test_shared_filter_layer_reuses_instance() {
        let log: Log = Arc::default();
        let filter = Arc::new(Recording {
            name: "shared",
            log: log.clone(),
        });
        let layer = FilterLayer::from_shared(filter.clone());
        let service = layer.clone().layer(handler(log.clone()));

        service.oneshot(request()).await.unwrap();

        // The consumed service released its handle; the test and the layer remain.
        assert_eq!(Arc::strong_count(&filter), 2);
        assert_eq!(log.lock().unwrap().len(), 3);
    }
}
