//! Context and page resource handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use berth_types::{Principal, Protocol};
use serde_json::{json, Value};

use crate::dto::CreateContextBody;
use crate::errors::ApiResult;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
    Json(body): Json<CreateContextBody>,
) -> ApiResult<Json<Value>> {
    let context = state
        .plane
        .create_context(&principal, &session_id, body.options, Protocol::Http)
        .await?;
    Ok(Json(json!({ "context": context })))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let contexts = state.plane.list_contexts(&principal, &session_id).await?;
    Ok(Json(json!({ "contexts": contexts })))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let context = state.plane.get_context(&principal, &id).await?;
    Ok(Json(json!({ "context": context })))
}

pub async fn close(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .plane
        .close_context(&principal, &id, Protocol::Http)
        .await?;
    Ok(Json(json!({ "closed": id })))
}

pub async fn create_page(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(context_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let page = state
        .plane
        .create_page(&principal, &context_id, Protocol::Http)
        .await?;
    Ok(Json(json!({ "page": page })))
}

pub async fn get_page(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let page = state.plane.get_page(&principal, &id).await?;
    Ok(Json(json!({ "page": page })))
}

pub async fn close_page(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .plane
        .close_page(&principal, &id, Protocol::Http)
        .await?;
    Ok(Json(json!({ "closed": id })))
}
