//! HTTP API Integration Tests
//!
//! Exercises request validation, rule management, ingestion and bulk
//! disconnection through the axum router.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use filtered_stream::application::ports::RuleSource;
use filtered_stream::{
    AppState, ConnectionRegistry, DispatcherConfig, InMemoryStore, StreamDispatcher, UsageLedger,
    UsageMeter, create_router,
};

struct TestApp {
    router: Router,
    registry: Arc<ConnectionRegistry>,
    store: Arc<InMemoryStore>,
    shutdown: CancellationToken,
}

fn setup_test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let usage = Arc::new(UsageLedger::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let meter: Arc<dyn UsageMeter> = usage.clone();
    let dispatcher = Arc::new(StreamDispatcher::new(
        Arc::clone(&store),
        meter,
        Arc::clone(&registry),
        DispatcherConfig::default(),
    ));
    let shutdown = CancellationToken::new();

    let router = create_router(AppState {
        dispatcher,
        store: Arc::clone(&store),
        usage,
        shutdown: shutdown.clone(),
        channel_capacity: 16,
    });

    TestApp {
        router,
        registry,
        store,
        shutdown,
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
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

async fn wait_for_connections(registry: &ConnectionRegistry, subscriber: &str, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while registry.connection_count(subscriber) != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection count not reached");
}

// =============================================================================
// Authentication and Validation
// =============================================================================

#[tokio::test]
async fn test_stream_without_bearer_is_unauthorized() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(request(Method::GET, "/2/tweets/sample/stream", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["status"], 401);
    assert!(body["title"].is_string());
    assert!(body["type"].is_string());
    assert_eq!(app.registry.total_connections(), 0);
}

#[tokio::test]
async fn test_firehose_requires_partition() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::GET,
            "/2/tweets/firehose/stream",
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["detail"].as_str().unwrap().contains("partition"));

    let response = app
        .router
        .oneshot(request(
            Method::GET,
            "/2/tweets/firehose/stream/lang/en",
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.registry.total_connections(), 0);
}

// =============================================================================
// Rules
// =============================================================================

#[tokio::test]
async fn test_rules_add_list_and_delete() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::POST,
            "/2/tweets/search/stream/rules",
            Some("alice"),
            Some(json!({
                "add": [
                    {"value": "#ai OR #ml", "tag": "ml"},
                    {"value": "from:alice -#spam"},
                    {"value": "   "}
                ]
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["meta"]["summary"]["created"], 2);
    assert_eq!(body["meta"]["summary"]["not_created"], 1);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["tag"], "ml");
    let first_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::GET,
            "/2/tweets/search/stream/rules",
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["meta"]["result_count"], 2);

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::POST,
            "/2/tweets/search/stream/rules",
            Some("alice"),
            Some(json!({"delete": {"ids": [first_id, "missing"]}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["meta"]["summary"]["deleted"], 1);
    assert_eq!(body["meta"]["summary"]["not_deleted"], 1);

    assert_eq!(app.store.active_rules().len(), 1);
}

#[tokio::test]
async fn test_rules_rejects_empty_and_malformed_bodies() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::POST,
            "/2/tweets/search/stream/rules",
            Some("alice"),
            Some(json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/2/tweets/search/stream/rules")
        .header(header::AUTHORIZATION, "Bearer alice")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], 400);
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_create_user_and_content() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::POST,
            "/2/users",
            Some("admin"),
            Some(json!({"id": "u1", "username": "alice", "name": "Alice"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::POST,
            "/2/tweets",
            Some("admin"),
            Some(json!({"text": "Hello @alice see https://example.com #Rust", "author_id": "u1", "lang": "en"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["conversation_id"], id.as_str());
    assert_eq!(app.store.content_count(), 1);

    let response = app
        .router
        .oneshot(request(
            Method::POST,
            "/2/tweets",
            Some("admin"),
            Some(json!({"text": "reply", "author_id": "u1", "in_reply_to_id": "nope"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_content_requires_text() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(request(
            Method::POST,
            "/2/tweets",
            Some("admin"),
            Some(json!({"text": "", "author_id": "u1"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.content_count(), 0);
}

// =============================================================================
// Connections
// =============================================================================

#[tokio::test]
async fn test_close_all_kills_only_callers_streams() {
    let app = setup_test_app();

    let mut bodies = Vec::new();
    for token in ["alice", "alice", "bob"] {
        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::GET,
                "/2/tweets/sample/stream?delay_ms=10",
                Some(token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        bodies.push(response.into_body());
    }

    wait_for_connections(&app.registry, "alice", 2).await;
    wait_for_connections(&app.registry, "bob", 1).await;

    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::DELETE,
            "/2/connections/all",
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["killed_connections"], 2);

    wait_for_connections(&app.registry, "alice", 0).await;
    assert_eq!(app.registry.connection_count("bob"), 1);

    let response = app
        .router
        .oneshot(request(
            Method::DELETE,
            "/2/connections/all",
            Some("carol"),
            None,
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["killed_connections"], 0);

    app.shutdown.cancel();
    wait_for_connections(&app.registry, "bob", 0).await;
    drop(bodies);
}
