//! HTTP integration tests for the Ponder REST API.
//!
//! Self-contained: the store runs on an in-memory SQLite database and the
//! completion API is a wiremock server, so every test exercises full axum
//! handler dispatch via `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ponder_core::config::{CompletionSettings, DatabaseConfig, HttpConfig, PonderConfig, ServiceConfig};
use ponder_core::{CompletionClient, CompletionConfig, EntryStore};
use ponder_server::http::{build_router, HttpState};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> PonderConfig {
    PonderConfig {
        service: ServiceConfig {
            log_level: "info".to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
            max_connections: 1,
        },
        completion: CompletionSettings::default(),
        http: HttpConfig::default(),
    }
}

async fn make_state(completion_base: Option<String>) -> Arc<HttpState> {
    let store = EntryStore::in_memory().await.expect("in-memory store");
    let completions = completion_base.map(|base| {
        let config = CompletionConfig {
            api_key: "test-api-key".to_string(),
            settings: CompletionSettings::default(),
        };
        CompletionClient::with_base_url(config, base).expect("completion client")
    });
    Arc::new(HttpState {
        store,
        completions,
        config: test_config(),
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn completion_response(content: &str) -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

#[tokio::test]
async fn test_health_and_version_endpoints() {
    let app = build_router(make_state(None).await);

    let resp = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["sqlite"].is_string());

    let resp = app.oneshot(get("/version")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["protocol"], "ponder/1");
}

#[tokio::test]
async fn test_entry_lifecycle_over_http() {
    let state = make_state(None).await;
    let app = build_router(state);

    // Create
    let resp = app
        .clone()
        .oneshot(post_json("/entries", &json!({ "content": "hello" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["content"], "hello");
    assert_eq!(created["summary"], Value::Null);
    assert_eq!(created["createdAt"], created["updatedAt"]);

    // Edit in place
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let resp = app
        .clone()
        .oneshot({
            Request::builder()
                .method("PUT")
                .uri(format!("/entries/{id}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "content": "hello world" }).to_string()))
                .unwrap()
        })
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let edited = body_json(resp).await;
    assert_eq!(edited["content"], "hello world");
    assert_eq!(edited["createdAt"], created["createdAt"]);
    assert_ne!(edited["updatedAt"], created["updatedAt"]);

    // List contains exactly the one entry
    let resp = app.clone().oneshot(get("/entries")).await.unwrap();
    let listed = body_json(resp).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["entries"][0]["id"], id.as_str());

    // Delete, then delete again (idempotent)
    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/entries/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app.oneshot(get("/entries")).await.unwrap();
    let listed = body_json(resp).await;
    assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn test_put_unknown_id_is_404() {
    let app = build_router(make_state(None).await);
    let resp = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/entries/does-not-exist")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "content": "text" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Entry not found");
}

#[tokio::test]
async fn test_export_import_round_trip_over_http() {
    let app = build_router(make_state(None).await);

    for content in ["first", "second", "third"] {
        let resp = app
            .clone()
            .oneshot(post_json("/entries", &json!({ "content": content })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app.clone().oneshot(get("/export")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let exported = body_json(resp).await;
    assert_eq!(exported["version"], 1);
    assert_eq!(exported["entries"].as_array().unwrap().len(), 3);

    // Import into a fresh server
    let fresh = build_router(make_state(None).await);
    let resp = fresh
        .clone()
        .oneshot(post_json("/import", &exported))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["imported"], 3);

    let resp = fresh.oneshot(get("/export")).await.unwrap();
    let mut re_exported = body_json(resp).await;
    let mut original = exported;
    sort_entries(&mut original);
    sort_entries(&mut re_exported);
    assert_eq!(re_exported, original);
}

fn sort_entries(payload: &mut Value) {
    if let Some(entries) = payload["entries"].as_array_mut() {
        entries.sort_by_key(|e| e["id"].as_str().unwrap_or_default().to_string());
    }
}

#[tokio::test]
async fn test_import_rejects_unsupported_version() {
    let app = build_router(make_state(None).await);
    let payload = json!({ "version": 2, "entries": [] });
    let resp = app
        .clone()
        .oneshot(post_json("/import", &payload))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("version"));
}

#[tokio::test]
async fn test_clear_all_over_http() {
    let app = build_router(make_state(None).await);

    app.clone()
        .oneshot(post_json("/entries", &json!({ "content": "soon gone" })))
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/entries")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["cleared"], true);

    let listed = body_json(app.oneshot(get("/entries")).await.unwrap()).await;
    assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn test_summarize_endpoint_with_mock_completion() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_response("You had a demanding day.")),
        )
        .mount(&mock)
        .await;

    let app = build_router(make_state(Some(mock.uri())).await);
    let resp = app
        .oneshot(post_json("/summarize", &json!({ "content": "long day" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["summary"], "You had a demanding day.");
}

#[tokio::test]
async fn test_reflect_endpoint_with_mock_completion() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_response(
            r#"["What felt heaviest?", "What helped?", "What might you try tomorrow?"]"#,
        )))
        .mount(&mock)
        .await;

    let app = build_router(make_state(Some(mock.uri())).await);
    let resp = app
        .oneshot(post_json("/reflect", &json!({ "content": "long day" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
}

#[tokio::test]
async fn test_trends_endpoint_with_mock_completion() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_response("Rest keeps coming up across entries.")),
        )
        .mount(&mock)
        .await;

    let app = build_router(make_state(Some(mock.uri())).await);
    let resp = app
        .oneshot(post_json(
            "/trends",
            &json!({ "entries": ["entry one", "entry two"] }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["summary"], "Rest keeps coming up across entries.");
}

#[tokio::test]
async fn test_summarize_upstream_failure_maps_to_500() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "boom" }
        })))
        .mount(&mock)
        .await;

    let app = build_router(make_state(Some(mock.uri())).await);
    let resp = app
        .oneshot(post_json("/summarize", &json!({ "content": "entry" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Failed to generate summary");
}

#[tokio::test]
async fn test_trends_requires_non_empty_entries() {
    let app = build_router(make_state(None).await);
    let resp = app
        .oneshot(post_json("/trends", &json!({ "entries": [] })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Entries array is required");
}

#[tokio::test]
async fn test_import_preserves_original_timestamps() {
    let app = build_router(make_state(None).await);

    let payload = json!({
        "version": 1,
        "entries": [{
            "id": "fixed-import-id",
            "content": "carried over",
            "summary": "You carried this over.",
            "reflectionQuestions": null,
            "createdAt": "2024-06-01T09:00:00.000Z",
            "updatedAt": "2024-06-02T09:30:00.125Z"
        }]
    });

    let resp = app
        .clone()
        .oneshot(post_json("/import", &payload))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/entries/fixed-import-id")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["createdAt"], "2024-06-01T09:00:00.000Z");
    assert_eq!(body["updatedAt"], "2024-06-02T09:30:00.125Z");
}
