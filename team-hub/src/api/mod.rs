//! HTTP API layer exposing the dashboard endpoints over the document store.

use axum::{
    extract::{FromRequestParts, Multipart, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use team_hub_core::storage::{Poll, Resource, ResourceDraft, ResourcePatch, Store};
use team_hub_core::{import, Error};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared application state: the store handle behind one lock. Writers hold
/// it exclusively for their whole load-mutate-save span, which serializes
/// all mutations; readers share it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
}

/// Caller identity taken from the `x-user-id` header. A missing or
/// non-numeric header means an unscoped caller, never a rejection; the
/// handlers that require a manager enforce that themselves.
#[derive(Clone, Copy, Debug)]
pub struct Caller(pub Option<u32>);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        Ok(Self(id))
    }
}

impl Caller {
    fn require_manager(self) -> Result<u32, ApiError> {
        self.0
            .ok_or_else(|| ApiError::bad_request("Manager id required"))
    }
}

/// Error shape returned to the client: a status code and a `{"message"}`
/// body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::DuplicateMobile
            | Error::AlreadyVoted
            | Error::InvalidOption
            | Error::InvalidOptions => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

pub fn router(store: Arc<RwLock<Store>>) -> Router {
    let state = AppState { store };
    Router::new()
        .route("/api/login", post(login))
        .route("/api/resources", get(list_resources).post(create_resource))
        .route("/api/resources/bulk", post(bulk_import))
        .route(
            "/api/resources/{id}",
            put(update_resource).delete(delete_resource),
        )
        .route("/api/users", get(list_users))
        .route("/api/polls", get(list_polls).post(create_poll))
        .route("/api/polls/{id}/vote", post(vote))
        .route("/api/polls/{id}", delete(delete_poll))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    mobile: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let doc = state.store.read().await.load();
    match doc.authenticate(&req.mobile, &req.password) {
        Some(user) => Json(json!({
            "success": true,
            "user": { "id": user.id, "name": user.name, "role": user.role },
        }))
        .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid credentials" })),
        )
            .into_response(),
    }
}

async fn list_resources(State(state): State<AppState>, caller: Caller) -> Json<Vec<Resource>> {
    let doc = state.store.read().await.load();
    Json(doc.visible_resources(caller.0))
}

async fn create_resource(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<ResourceDraft>,
) -> Result<Json<Resource>, ApiError> {
    let manager_id = caller.require_manager()?;
    let store = state.store.write().await;
    let mut doc = store.load();
    let resource = doc.create_resource(manager_id, draft)?;
    store.save(&doc)?;
    Ok(Json(resource))
}

async fn update_resource(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u32>,
    Json(patch): Json<ResourcePatch>,
) -> Result<Json<Resource>, ApiError> {
    let store = state.store.write().await;
    let mut doc = store.load();
    let resource = doc.update_resource(id, caller.0, patch)?;
    store.save(&doc)?;
    Ok(Json(resource))
}

async fn delete_resource(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.write().await;
    let mut doc = store.load();
    doc.delete_resource(id, caller.0)?;
    store.save(&doc)?;
    Ok(Json(json!({ "success": true })))
}

async fn bulk_import(
    State(state): State<AppState>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let manager_id = caller.require_manager()?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("No file uploaded"))?
    {
        if field.name() == Some("file") {
            upload = Some(
                field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("No file uploaded"))?,
            );
        }
    }
    let bytes = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let rows = import::parse_workbook(&bytes)?;

    let store = state.store.write().await;
    let mut doc = store.load();
    let summary = import::merge(&mut doc, manager_id, rows)?;
    store.save(&doc)?;
    info!(added = summary.added, skipped = summary.skipped, "bulk import merged");
    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Added {} resources. Skipped {} duplicates.",
            summary.added, summary.skipped
        ),
    })))
}

async fn list_users(State(state): State<AppState>) -> Json<Vec<serde_json::Value>> {
    let doc = state.store.read().await.load();
    // projection only; the password never leaves the store
    Json(
        doc.users
            .iter()
            .map(|u| {
                json!({ "id": u.id, "name": u.name, "mobile": u.mobile, "role": u.role })
            })
            .collect(),
    )
}

async fn list_polls(State(state): State<AppState>, caller: Caller) -> Json<Vec<Poll>> {
    let doc = state.store.read().await.load();
    Json(doc.visible_polls(caller.0))
}

#[derive(Deserialize)]
struct CreatePollRequest {
    title: String,
    options: Vec<String>,
}

async fn create_poll(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreatePollRequest>,
) -> Result<Json<Poll>, ApiError> {
    let manager_id = caller.require_manager()?;
    let store = state.store.write().await;
    let mut doc = store.load();
    let poll = doc.create_poll(manager_id, req.title, req.options)?;
    store.save(&doc)?;
    Ok(Json(poll))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    user_id: u32,
    option_label: String,
}

async fn vote(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<Poll>, ApiError> {
    let store = state.store.write().await;
    let mut doc = store.load();
    let poll = doc.vote(id, req.user_id, &req.option_label)?;
    store.save(&doc)?;
    Ok(Json(poll))
}

async fn delete_poll(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.write().await;
    let mut doc = store.load();
    doc.delete_poll(id, caller.0)?;
    store.save(&doc)?;
    Ok(Json(json!({ "success": true })))
}
