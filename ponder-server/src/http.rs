//! Ponder HTTP REST API
//!
//! Axum-based HTTP server that exposes the entry store and the completion
//! proxy endpoints to front ends (the CLI, or anything else speaking JSON).
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function taking `&HttpState`. The inner functions are directly
//! testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET    /health       — health check with DB status
//! - GET    /version      — server version info
//! - GET    /entries      — list all entries (wire form)
//! - POST   /entries      — upsert an entry
//! - DELETE /entries      — clear all entries
//! - GET    /entries/:id  — fetch one entry
//! - PUT    /entries/:id  — update content in place (404 on unknown id)
//! - DELETE /entries/:id  — delete (idempotent)
//! - GET    /export       — versioned export payload
//! - POST   /import       — validate + import an export payload
//! - POST   /summarize    — entry text → short summary
//! - POST   /reflect      — entry text → reflection questions
//! - POST   /trends       — entry texts → trend narrative

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use ponder_core::export::{serialize_entry, validate_export_payload};
use ponder_core::models::UpsertEntry;
use ponder_core::{CompletionClient, EntryStore, PonderConfig, PonderError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Shared state for all HTTP handlers. `completions` is `None` when no API
/// key is configured; entry endpoints keep working without it.
#[derive(Clone)]
pub struct HttpState {
    pub store: EntryStore,
    pub completions: Option<CompletionClient>,
    pub config: PonderConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route(
            "/entries",
            get(list_handler).post(upsert_handler).delete(clear_handler),
        )
        .route(
            "/entries/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/export", get(export_handler))
        .route("/import", post(import_handler))
        .route("/summarize", post(summarize_handler))
        .route("/reflect", post(reflect_handler))
        .route("/trends", post(trends_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Ponder HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Wire-form upsert input: `content` required, everything else optional.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRequest {
    pub id: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub reflection_questions: Option<Vec<String>>,
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateRequest {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ContentRequest {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TrendsRequest {
    pub entries: Option<Vec<String>>,
}

// ============================================================================
// Helpers
// ============================================================================

fn error_body(msg: impl Into<String>) -> Value {
    json!({ "error": msg.into(), "status": "error" })
}

/// Map a store failure onto an HTTP response. Storage errors always surface
/// to the caller; only the update path distinguishes a missing id.
fn storage_error(e: PonderError) -> (StatusCode, Value) {
    match e {
        PonderError::EntryNotFound { .. } => {
            (StatusCode::NOT_FOUND, error_body("Entry not found"))
        }
        other => {
            tracing::error!(error = %other, "Storage operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(other.to_string()))
        }
    }
}

fn wire_json(entry: &ponder_core::JournalEntry) -> Value {
    serde_json::to_value(serialize_entry(entry)).unwrap_or(Value::Null)
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Inner health check — pings the DB and counts entries.
pub async fn health_inner(state: &HttpState) -> (StatusCode, Value) {
    let pool = match state.store.database().acquire().await {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "status": "unhealthy", "error": e.to_string() }),
            );
        }
    };

    let sqlite_ver = match ponder_core::db::health_check(pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "status": "unhealthy", "error": e.to_string() }),
            );
        }
    };

    let entries = state.store.count().await.unwrap_or(-1);

    (
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "sqlite": sqlite_ver,
            "entries": entries,
        }),
    )
}

/// Inner version — pure, no IO.
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "ponder/1",
    })
}

/// Inner list — every entry in wire form. Order is unspecified at the store
/// level; clients sort for display.
pub async fn list_inner(state: &HttpState) -> (StatusCode, Value) {
    match state.store.list_all().await {
        Ok(entries) => {
            let wire: Vec<Value> = entries.iter().map(wire_json).collect();
            (StatusCode::OK, json!({ "entries": wire, "count": wire.len() }))
        }
        Err(e) => storage_error(e),
    }
}

/// Inner upsert — validates content, parses the optional wire timestamp, and
/// returns the materialized entry.
pub async fn upsert_inner(state: &HttpState, req: UpsertRequest) -> (StatusCode, Value) {
    let content = match req.content {
        Some(c) if !c.trim().is_empty() => c,
        _ => return (StatusCode::BAD_REQUEST, error_body("Content is required")),
    };

    let created_at = match req.created_at.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<DateTime<Utc>>() {
            Ok(t) => Some(t),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    error_body("createdAt is not a valid ISO-8601 timestamp"),
                );
            }
        },
    };

    let upsert = UpsertEntry {
        id: req.id,
        content,
        summary: req.summary,
        reflection_questions: req.reflection_questions,
        created_at,
    };

    match state.store.upsert(upsert).await {
        Ok(entry) => (StatusCode::OK, wire_json(&entry)),
        Err(e) => storage_error(e),
    }
}

/// Inner get — one entry by id, 404 when absent.
pub async fn get_inner(state: &HttpState, id: &str) -> (StatusCode, Value) {
    match state.store.get(id).await {
        Ok(Some(entry)) => (StatusCode::OK, wire_json(&entry)),
        Ok(None) => (StatusCode::NOT_FOUND, error_body("Entry not found")),
        Err(e) => storage_error(e),
    }
}

/// Inner update — content edit in place; missing ids are an error here,
/// unlike delete.
pub async fn update_inner(state: &HttpState, id: &str, req: UpdateRequest) -> (StatusCode, Value) {
    let content = match req.content {
        Some(c) if !c.trim().is_empty() => c,
        _ => return (StatusCode::BAD_REQUEST, error_body("Content is required")),
    };

    match state.store.update_content(id, &content).await {
        Ok(entry) => (StatusCode::OK, wire_json(&entry)),
        Err(e) => storage_error(e),
    }
}

/// Inner delete — idempotent by design.
pub async fn delete_inner(state: &HttpState, id: &str) -> (StatusCode, Value) {
    match state.store.delete(id).await {
        Ok(()) => (StatusCode::OK, json!({ "deleted": true })),
        Err(e) => storage_error(e),
    }
}

/// Inner clear — removes every entry unconditionally.
pub async fn clear_inner(state: &HttpState) -> (StatusCode, Value) {
    match state.store.clear_all().await {
        Ok(()) => (StatusCode::OK, json!({ "cleared": true })),
        Err(e) => storage_error(e),
    }
}

/// Inner export — the versioned snapshot.
pub async fn export_inner(state: &HttpState) -> (StatusCode, Value) {
    match state.store.export().await {
        Ok(payload) => (
            StatusCode::OK,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        ),
        Err(e) => storage_error(e),
    }
}

/// Inner import — validates the raw payload first; a rejected payload never
/// touches the store, and a mid-batch failure imports nothing.
pub async fn import_inner(state: &HttpState, raw: Value) -> (StatusCode, Value) {
    let payload = match validate_export_payload(&raw) {
        Ok(p) => p,
        Err(e) => return (StatusCode::BAD_REQUEST, error_body(e.to_string())),
    };

    match state.store.import_many(&payload.entries).await {
        Ok(imported) => {
            let wire: Vec<Value> = imported.iter().map(wire_json).collect();
            (
                StatusCode::OK,
                json!({ "imported": wire.len(), "entries": wire }),
            )
        }
        Err(e) => storage_error(e),
    }
}

fn completions_or_error(state: &HttpState) -> Result<&CompletionClient, (StatusCode, Value)> {
    state.completions.as_ref().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("Completion API is not configured"),
    ))
}

/// Inner summarize — `{content}` → `{summary}`.
pub async fn summarize_inner(state: &HttpState, req: ContentRequest) -> (StatusCode, Value) {
    let content = match req.content {
        Some(c) if !c.trim().is_empty() => c,
        _ => return (StatusCode::BAD_REQUEST, error_body("Content is required")),
    };
    let client = match completions_or_error(state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match client.summarize(&content).await {
        Ok(summary) => (StatusCode::OK, json!({ "summary": summary })),
        Err(e) => {
            tracing::error!(error = %e, "Error generating summary");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Failed to generate summary"),
            )
        }
    }
}

/// Inner reflect — `{content}` → `{questions}`.
pub async fn reflect_inner(state: &HttpState, req: ContentRequest) -> (StatusCode, Value) {
    let content = match req.content {
        Some(c) if !c.trim().is_empty() => c,
        _ => return (StatusCode::BAD_REQUEST, error_body("Content is required")),
    };
    let client = match completions_or_error(state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match client.reflection_questions(&content).await {
        Ok(questions) => (StatusCode::OK, json!({ "questions": questions })),
        Err(e) => {
            tracing::error!(error = %e, "Error generating reflection questions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Failed to generate reflection questions"),
            )
        }
    }
}

/// Inner trends — `{entries}` (non-empty) → `{summary}`.
pub async fn trends_inner(state: &HttpState, req: TrendsRequest) -> (StatusCode, Value) {
    let entries = match req.entries {
        Some(e) if !e.is_empty() => e,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("Entries array is required"),
            );
        }
    };
    let client = match completions_or_error(state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match client.trend_summary(&entries).await {
        Ok(summary) => (StatusCode::OK, json!({ "summary": summary })),
        Err(e) => {
            tracing::error!(error = %e, "Error generating trends summary");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Failed to generate trends summary"),
            )
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn list_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = list_inner(&state).await;
    (status, Json(body))
}

pub async fn upsert_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<UpsertRequest>,
) -> impl IntoResponse {
    let (status, body) = upsert_inner(&state, req).await;
    (status, Json(body))
}

pub async fn get_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = get_inner(&state, &id).await;
    (status, Json(body))
}

pub async fn update_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> impl IntoResponse {
    let (status, body) = update_inner(&state, &id, req).await;
    (status, Json(body))
}

pub async fn delete_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = delete_inner(&state, &id).await;
    (status, Json(body))
}

pub async fn clear_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = clear_inner(&state).await;
    (status, Json(body))
}

pub async fn export_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = export_inner(&state).await;
    (status, Json(body))
}

pub async fn import_handler(
    State(state): State<Arc<HttpState>>,
    Json(raw): Json<Value>,
) -> impl IntoResponse {
    let (status, body) = import_inner(&state, raw).await;
    (status, Json(body))
}

pub async fn summarize_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    let (status, body) = summarize_inner(&state, req).await;
    (status, Json(body))
}

pub async fn reflect_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    let (status, body) = reflect_inner(&state, req).await;
    (status, Json(body))
}

pub async fn trends_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<TrendsRequest>,
) -> impl IntoResponse {
    let (status, body) = trends_inner(&state, req).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
