//! API integration tests against in-memory stores.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use clip_api::{create_router, ApiConfig, AppState, InMemoryCounterStore, ProviderKeys};
use clip_crypto::SecretCodec;
use clip_queue::InMemoryConnector;
use serde_json::{json, Value};
use tower::ServiceExt;

const TEST_SECRET: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
const TEST_TOKEN: &str = "internal-test-token";

struct TestApp {
    router: Router,
    counters: Arc<InMemoryCounterStore>,
}

fn test_app() -> TestApp {
    let config = ApiConfig {
        internal_api_token: Some(TEST_TOKEN.to_string()),
        ..ApiConfig::default()
    };
    let counters = Arc::new(InMemoryCounterStore::new());
    let codec = SecretCodec::from_hex_key(TEST_SECRET).unwrap();
    let state = AppState::from_parts(
        config,
        Arc::new(InMemoryConnector::new()),
        counters.clone(),
        codec,
        ProviderKeys::default(),
    );
    TestApp {
        router: create_router(state, None),
        counters,
    }
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
        .header("X-User-Id", "user-1");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn transcribe_body() -> Value {
    json!({
        "source_file_path": "uploads/video-1.mp4",
        "strategy": "global",
        "language": "ru"
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_ready_with_in_memory_stores() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ready");
}

#[tokio::test]
async fn test_ready_degraded_when_counter_store_down() {
    let app = test_app();
    app.counters.set_unreachable(true);

    let response = app
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_bearer_rejected() {
    let app = test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/videos/video-1/cancel")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_bearer_rejected() {
    let app = test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/videos/video-1/cancel")
                .header(header::AUTHORIZATION, "Bearer internal-test-tokeN")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_user_header_rejected() {
    let app = test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/videos/video-1/cancel")
                .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_transcribe_then_cancel() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/videos/video-1/transcribe",
            Some(transcribe_body()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["queue"], "stt");
    assert!(body["job_id"].as_str().is_some_and(|id| !id.is_empty()));

    let response = app
        .router
        .clone()
        .oneshot(authed("GET", "/api/queues/stt/counts", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["counts"]["waiting"], 1);

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", "/api/videos/video-1/cancel", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["cancelled"], 1);

    let response = app
        .router
        .oneshot(authed("GET", "/api/queues/stt/counts", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["counts"]["waiting"], 0);
}

#[tokio::test]
async fn test_invalid_video_id_rejected() {
    let app = test_app();

    let response = app
        .router
        .oneshot(authed(
            "POST",
            "/api/videos/bad%20id/transcribe",
            Some(transcribe_body()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transcribe_rejects_oversized_byok_key() {
    let app = test_app();
    let mut body = transcribe_body();
    body["byok_keys"] = json!({ "openai": "k".repeat(513) });

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", "/api/videos/video-1/transcribe", Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .oneshot(authed("GET", "/api/byok", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["cached"], false);
}

#[tokio::test]
async fn test_transcribe_rate_limited() {
    let app = test_app();

    for _ in 0..10 {
        let response = app
            .router
            .clone()
            .oneshot(authed(
                "POST",
                "/api/videos/video-1/transcribe",
                Some(transcribe_body()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = app
        .router
        .oneshot(authed(
            "POST",
            "/api/videos/video-1/transcribe",
            Some(transcribe_body()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    assert_eq!(json_body(response).await["code"], "rate_limited");
}

#[tokio::test]
async fn test_counter_store_outage_fails_open() {
    let app = test_app();
    app.counters.set_unreachable(true);

    for _ in 0..15 {
        let response = app
            .router
            .clone()
            .oneshot(authed(
                "POST",
                "/api/videos/video-1/transcribe",
                Some(transcribe_body()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}

#[tokio::test]
async fn test_queue_counts_unknown_queue() {
    let app = test_app();

    let response = app
        .router
        .oneshot(authed("GET", "/api/queues/transcode/counts", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_publish_then_cancel_publication() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/clips/clip-1/publications",
            Some(json!({
                "source_file_path": "clips/clip-1.mp4",
                "title": "Best moment",
                "targets": [
                    {
                        "publication_id": "pub-1",
                        "platform": "vk",
                        "token": { "kind": "plain", "value": "vk-access-token" },
                        "delay_secs": 3600
                    }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["job_ids"].as_array().unwrap().len(), 1);

    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", "/api/publications/pub-1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["removed"], true);

    let response = app
        .router
        .oneshot(authed("DELETE", "/api/publications/pub-1", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["removed"], false);
}

#[tokio::test]
async fn test_publish_requires_targets() {
    let app = test_app();

    let response = app
        .router
        .oneshot(authed(
            "POST",
            "/api/clips/clip-1/publications",
            Some(json!({
                "source_file_path": "clips/clip-1.mp4",
                "title": "Best moment",
                "targets": []
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_check_endpoint() {
    let app = test_app();
    let body = json!({ "scope": "auth:login", "key": "203.0.113.9" });

    for expected in 1..=5u64 {
        let response = app
            .router
            .clone()
            .oneshot(authed("POST", "/api/rate-limits/check", Some(body.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["count"], expected);
        assert_eq!(json["limit"], 5);
        assert_eq!(json["degraded"], false);
    }

    let response = app
        .router
        .oneshot(authed("POST", "/api/rate-limits/check", Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_check_unknown_scope() {
    let app = test_app();

    let response = app
        .router
        .oneshot(authed(
            "POST",
            "/api/rate-limits/check",
            Some(json!({ "scope": "nope", "key": "k" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_byok_cache_lifecycle() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(authed(
            "PUT",
            "/api/byok",
            Some(json!({ "keys": { "openai": "sk-test", "gemini": "g-test" } })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["providers"],
        json!(["gemini", "openai"])
    );

    let response = app
        .router
        .clone()
        .oneshot(authed("GET", "/api/byok", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["cached"], true);

    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", "/api/byok", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router
        .oneshot(authed("GET", "/api/byok", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["cached"], false);
}
