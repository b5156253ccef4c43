//! End-to-end tests against a real server bound to an ephemeral port.
//!
//! The router is served with connect-info, exactly as the binary does, so
//! client keys come from the socket peer address.
//!
//! Run with: `cargo test --test server_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use inflight_guard::{AppState, Config, build_router};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::{Instant, sleep};

/// A running server plus an HTTP client pointed at it.
struct TestServer {
    base_url: String,
    client: Client,
    state: AppState,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    async fn start_with(config: Config) -> Self {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            metrics_port: 0,
            job_max_work: Duration::from_secs(10),
            ..config
        };

        let state = AppState::new(config).expect("Failed to build state");
        let app = build_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to ephemeral port");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://{addr}"),
            client,
            state,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn submit(&self, request_id: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self.client.post(self.url("/jobs")).json(&body);
        if let Some(id) = request_id {
            request = request.header("Request-Id", id);
        }
        request.send().await.expect("Failed to send request")
    }

    async fn stats(&self) -> Value {
        self.client
            .get(self.url("/stats"))
            .send()
            .await
            .expect("Failed to get stats")
            .json()
            .await
            .expect("Failed to parse stats")
    }

    /// Poll `/stats` until `inflight_requests` reaches `expected`.
    async fn wait_for_inflight(&self, expected: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if self.stats().await["inflight_requests"] == expected {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "inflight_requests never reached {expected}"
            );
            sleep(Duration::from_millis(10)).await;
        }
    }
}

// =============================================================================
// Health and statistics
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_stats_idle() {
    let server = TestServer::start().await;

    let stats = server.stats().await;

    assert_eq!(stats["inflight_clients"], 0);
    assert_eq!(stats["inflight_requests"], 0);
    assert_eq!(stats["dedup_header"], "request-id");
    assert_eq!(stats["reject_on_missing_id"], false);
    assert!(stats["uptime_seconds"].is_u64());
}

// =============================================================================
// Jobs
// =============================================================================

#[tokio::test]
async fn test_submit_job() {
    let server = TestServer::start().await;

    let response = server
        .submit(Some("job-1"), json!({"name": "import", "work_ms": 5}))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "import");
    assert_eq!(body["request_id"], "job-1");
    assert!(body["job_id"].as_str().unwrap().parse::<uuid::Uuid>().is_ok());
    assert!(body["accepted_at"].is_string());
    assert!(body["completed_at"].is_string());
}

#[tokio::test]
async fn test_submit_job_echoes_utf8_request_id() {
    let server = TestServer::start_with(Config {
        reject_on_missing_id: true,
        ..Config::default()
    })
    .await;

    let response = server.submit(Some("заказ-1"), json!({"name": "import"})).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["request_id"], "заказ-1");
}

#[tokio::test]
async fn test_submit_job_without_id_passes_through() {
    let server = TestServer::start().await;

    let response = server.submit(None, json!({"name": "import"})).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert!(body["request_id"].is_null());
}

#[tokio::test]
async fn test_submit_job_without_id_rejected_when_configured() {
    let server = TestServer::start_with(Config {
        reject_on_missing_id: true,
        ..Config::default()
    })
    .await;

    let response = server.submit(None, json!({"name": "import"})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "missing_request_id");
}

#[tokio::test]
async fn test_submit_job_validation() {
    let server = TestServer::start().await;

    let bad_name = server
        .submit(Some("v-1"), json!({"name": "-not-valid-"}))
        .await;
    assert_eq!(bad_name.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad_name.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");

    let too_slow = server
        .submit(Some("v-2"), json!({"name": "import", "work_ms": 60_000}))
        .await;
    assert_eq!(too_slow.status(), StatusCode::BAD_REQUEST);

    let malformed = server
        .client
        .post(server.url("/jobs"))
        .header("Request-Id", "v-3")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let body: Value = malformed.json().await.unwrap();
    assert_eq!(body["error"], "serialization_error");

    // Rejected requests released their ids.
    assert_eq!(server.stats().await["inflight_requests"], 0);
}

#[tokio::test]
async fn test_request_body_limit() {
    let server = TestServer::start_with(Config {
        max_request_body_size: 64,
        ..Config::default()
    })
    .await;

    let name = "a".repeat(100);
    let response = server.submit(Some("big"), json!({"name": name})).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(server.stats().await["inflight_requests"], 0);
}

// =============================================================================
// Overlapping requests
// =============================================================================

#[tokio::test]
async fn test_overlapping_jobs_with_same_id() {
    let server = TestServer::start().await;

    // First job holds "abc" for a while.
    let first = {
        let client = server.client.clone();
        let url = server.url("/jobs");
        tokio::spawn(async move {
            client
                .post(url)
                .header("Request-Id", "abc")
                .json(&json!({"name": "long-import", "work_ms": 1500}))
                .send()
                .await
                .expect("Failed to send first request")
        })
    };
    server.wait_for_inflight(1).await;

    let stats = server.stats().await;
    assert_eq!(stats["inflight_clients"], 1);

    // Second arrives before the first completes.
    let second = server
        .submit(Some("abc"), json!({"name": "long-import"}))
        .await;
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_request");
    assert_eq!(body["message"], "request already accepted before, please wait");

    // A different id is unaffected.
    let other = server.submit(Some("xyz"), json!({"name": "other"})).await;
    assert_eq!(other.status(), StatusCode::CREATED);

    let first = first.await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["request_id"], "abc");

    // Once the first has completed the id is accepted again.
    let third = server.submit(Some("abc"), json!({"name": "long-import"})).await;
    assert_eq!(third.status(), StatusCode::CREATED);

    assert!(server.state.dedup.table().is_empty());
}

#[tokio::test]
async fn test_custom_dedup_header() {
    let server = TestServer::start_with(Config {
        dedup_header: "Idempotency-Key".to_string(),
        duplicate_message: "already running".to_string(),
        ..Config::default()
    })
    .await;

    let first = {
        let client = server.client.clone();
        let url = server.url("/jobs");
        tokio::spawn(async move {
            client
                .post(url)
                .header("Idempotency-Key", "k-1")
                .json(&json!({"name": "import", "work_ms": 1000}))
                .send()
                .await
                .expect("Failed to send first request")
        })
    };
    server.wait_for_inflight(1).await;

    let second = server
        .client
        .post(server.url("/jobs"))
        .header("Idempotency-Key", "k-1")
        .json(&json!({"name": "import"}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["message"], "already running");

    assert_eq!(first.await.unwrap().status(), StatusCode::CREATED);
}

// =============================================================================
// Error pages
// =============================================================================

#[tokio::test]
async fn test_not_found_page() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/does-not-exist"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    assert_eq!(response.text().await.unwrap(), "<h1>404 Not Found</h1>");
}

#[tokio::test]
async fn test_method_not_allowed_page() {
    let server = TestServer::start().await;

    let response = server.client.get(server.url("/jobs")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.text().await.unwrap(),
        "<h1>405 Method Not Allowed</h1>"
    );
}

#[tokio::test]
async fn test_error_pages_disabled() {
    let server = TestServer::start_with(Config {
        error_pages_enabled: false,
        ..Config::default()
    })
    .await;

    let response = server
        .client
        .get(server.url("/does-not-exist"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().await.unwrap().is_empty());
}
