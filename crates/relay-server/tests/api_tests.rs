//! HTTP surface tests
//!
//! Exercises the router end to end with in-process requests: response
//! shapes, status codes for the error taxonomy, and the rate limit verdict
//! in the 429 body.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relay_server::api;
use relay_server::config::{Config, ImportConfig, RateLimitConfig};
use relay_server::features::imports::{BatchEngine, RateLimiter};
use relay_server::features::FeatureState;
use relay_server::storage::{MemoryStore, StateStore};
use relay_server::transport::AggregateClient;

const IMPORT_PATH: &str = "/aggregate/import";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

fn test_app(server: &MockServer, import: ImportConfig, rate_limit: RateLimitConfig) -> TestApp {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn StateStore> = memory.clone();

    let mut config = Config::default();
    config.import = import.clone();
    config.rate_limit = rate_limit.clone();
    config.backend.import_url = format!("{}{IMPORT_PATH}", server.uri());
    config.backend.timeout_secs = 5;

    let backend = AggregateClient::new(&config.backend).expect("build client");
    let engine = Arc::new(BatchEngine::new(store.clone(), backend, import.clone()));
    let limiter = RateLimiter::new(store.clone(), rate_limit);

    let state = FeatureState { store, engine, limiter, config: import };
    TestApp {
        router: api::create_router(state, &config),
        store: memory,
    }
}

fn default_app(server: &MockServer) -> TestApp {
    test_app(
        server,
        ImportConfig { batch_start_delay_ms: 0, ..ImportConfig::default() },
        RateLimitConfig { max_chunks: 10_000, window_secs: 60 },
    )
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    };

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn chunk_body(count: usize) -> Value {
    json!({
        "objects": (0..count).map(|i| json!({ "id": i })).collect::<Vec<_>>(),
        "ownerId": "owner-1",
        "totalObjects": count,
        "chunkIndex": 0,
        "totalChunks": 1,
    })
}

#[tokio::test]
async fn health_reports_store_connectivity() {
    let server = MockServer::start().await;
    let app = default_app(&server);

    let (status, body) = send_json(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn chunk_submission_round_trip_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMPORT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let app = default_app(&server);

    let (status, body) =
        send_json(&app.router, "POST", "/api/v1/imports/chunks", Some(chunk_body(5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["complete"], true);
    assert_eq!(body["receivedChunks"], 1);
    assert_eq!(body["totalChunks"], 1);
    let job_id = body["jobId"].as_str().expect("jobId").to_string();

    // Status polling reflects the finished job.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (status, body) =
            send_json(&app.router, "GET", &format!("/api/v1/imports/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" {
            assert_eq!(body["total"], 5);
            assert_eq!(body["processed"], 5);
            assert_eq!(body["failed"], 0);
            assert!(body["completedAt"].is_string());
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job never completed; last status: {body}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let _keep_alive = app.store;
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let server = MockServer::start().await;
    let app = default_app(&server);

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/imports/chunks",
        Some(json!({ "objects": "not-a-list", "ownerId": "owner-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_owner_is_a_validation_error() {
    let server = MockServer::start().await;
    let app = default_app(&server);

    let mut body = chunk_body(3);
    body.as_object_mut().expect("object").remove("ownerId");

    let (status, body) = send_json(&app.router, "POST", "/api/v1/imports/chunks", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("ownerId"));
}

#[tokio::test]
async fn oversized_chunk_is_payload_too_large() {
    let server = MockServer::start().await;
    let app = test_app(
        &server,
        ImportConfig {
            max_objects_per_chunk: 2,
            batch_start_delay_ms: 0,
            ..ImportConfig::default()
        },
        RateLimitConfig { max_chunks: 10_000, window_secs: 60 },
    );

    let (status, body) =
        send_json(&app.router, "POST", "/api/v1/imports/chunks", Some(chunk_body(3))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn rate_limit_verdict_is_reported_in_429_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMPORT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let app = test_app(
        &server,
        ImportConfig { batch_start_delay_ms: 0, ..ImportConfig::default() },
        RateLimitConfig { max_chunks: 2, window_secs: 3600 },
    );

    for _ in 0..2 {
        let (status, _) =
            send_json(&app.router, "POST", "/api/v1/imports/chunks", Some(chunk_body(1))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) =
        send_json(&app.router, "POST", "/api/v1/imports/chunks", Some(chunk_body(1))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["details"]["limit"], 2);
    assert_eq!(body["details"]["count"], 3);
    assert!(body["details"]["resetAt"].is_string());
}

#[tokio::test]
async fn unknown_job_queries_are_not_found() {
    let server = MockServer::start().await;
    let app = default_app(&server);

    let (status, _) = send_json(&app.router, "GET", "/api/v1/imports/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        send_json(&app.router, "GET", "/api/v1/imports/nope/failures", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) =
        send_json(&app.router, "POST", "/api/v1/imports/nope/retry", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn cleanup_reports_zero_on_empty_store() {
    let server = MockServer::start().await;
    let app = default_app(&server);

    let (status, body) = send_json(&app.router, "POST", "/api/v1/imports/cleanup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobsDeleted"], 0);
    assert_eq!(body["chunksDeleted"], 0);
}
