//! HTTP REST surface for operators.
//!
//! Thin wrappers over the job manager and adapter store: submit and poll
//! mapping jobs, cancel them, and inspect or invalidate stored adapters.
//! The dashboard and any other operator tooling talk to these routes.

use crate::adapter::store::AdapterStore;
use crate::job::runner::{JobManager, SubmitRequest};
use crate::job::{JobOptions, JobPriority, PageTarget};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared state behind every route.
pub struct AppState {
    pub manager: JobManager,
    pub store: Arc<AdapterStore>,
}

/// Build the axum router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(submit_job).get(list_jobs))
        .route("/api/v1/jobs/:id", get(poll_job))
        .route("/api/v1/jobs/:id/cancel", post(cancel_job))
        .route(
            "/api/v1/adapters/:fingerprint",
            get(get_adapter).delete(invalidate_adapter),
        )
        .layer(cors)
        .with_state(state)
}

/// Start the REST server on the given port.
pub async fn start(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Request bodies ──────────────────────────────────────────────────────────

/// Submission body. Exactly one of the three target forms must be set.
#[derive(Debug, Deserialize)]
struct SubmitBody {
    shop_id: String,
    #[serde(default)]
    product_handle: Option<String>,
    #[serde(default)]
    product_url: Option<String>,
    #[serde(default)]
    product_gid: Option<String>,
    #[serde(default)]
    theme_id: Option<String>,
    #[serde(default)]
    priority: JobPriority,
    #[serde(default)]
    options: Option<JobOptions>,
}

fn target_from_body(body: &SubmitBody) -> Result<PageTarget, &'static str> {
    let mut targets = Vec::new();
    if let Some(h) = &body.product_handle {
        targets.push(PageTarget::ProductHandle(h.clone()));
    }
    if let Some(u) = &body.product_url {
        targets.push(PageTarget::ProductUrl(u.clone()));
    }
    if let Some(g) = &body.product_gid {
        targets.push(PageTarget::ProductGid(g.clone()));
    }
    match targets.len() {
        1 => Ok(targets.remove(0)),
        0 => Err("one of product_handle, product_url, product_gid is required"),
        _ => Err("only one target form may be given"),
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> impl IntoResponse {
    let target = match target_from_body(&body) {
        Ok(t) => t,
        Err(msg) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "code": "E_INVALID_TARGET", "message": msg } })),
            );
        }
    };

    let job = state
        .manager
        .submit(SubmitRequest {
            shop_id: body.shop_id,
            target,
            theme_id: body.theme_id,
            priority: body.priority,
            options: body.options.unwrap_or_default(),
        })
        .await;

    (StatusCode::ACCEPTED, Json(json!(job)))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Value> {
    let jobs = state.manager.list().await;
    Json(json!({ "jobs": jobs }))
}

async fn poll_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.manager.poll(&id).await {
        Some(job) => (StatusCode::OK, Json(json!(job))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": "E_UNKNOWN_JOB", "message": format!("no job {id}") } })),
        ),
    }
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let cancelled = state.manager.cancel(&id).await;
    if cancelled {
        (StatusCode::OK, Json(json!({ "cancelled": true })))
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({
                "cancelled": false,
                "error": { "code": "E_NOT_CANCELLABLE", "message": "job unknown or already terminal" }
            })),
        )
    }
}

async fn get_adapter(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&fingerprint) {
        Some(adapter) => (StatusCode::OK, Json(json!(adapter.persisted()))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": { "code": "E_UNKNOWN_ADAPTER", "message": format!("no adapter for {fingerprint}") }
            })),
        ),
    }
}

async fn invalidate_adapter(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> Json<Value> {
    let invalidated = state.store.invalidate(&fingerprint);
    Json(json!({ "invalidated": invalidated }))
}
