//! Session resource handlers.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use berth_registry::SessionFilter;
use berth_types::{Principal, Protocol};
use serde_json::{json, Value};

use crate::dto::{
    CreateSessionBody, ExtendSessionBody, ListSessionsQuery, UpdateMetadataBody,
};
use crate::errors::ApiResult;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateSessionBody>,
) -> ApiResult<Json<Value>> {
    let session = state
        .plane
        .create_session(
            &principal,
            body.ttl_secs.map(Duration::from_secs),
            body.metadata,
            Protocol::Http,
        )
        .await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Value>> {
    let filter = SessionFilter {
        user_id: query.user_id,
        metadata_contains: query.metadata_contains,
    };
    let sessions = state.plane.list_sessions(&principal, &filter).await?;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state.plane.get_session(&principal, &id).await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn update_metadata(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMetadataBody>,
) -> ApiResult<Json<Value>> {
    let session = state
        .plane
        .update_session_metadata(&principal, &id, body.metadata, Protocol::Http)
        .await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn extend(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<ExtendSessionBody>,
) -> ApiResult<Json<Value>> {
    let session = state
        .plane
        .extend_session(
            &principal,
            &id,
            Duration::from_secs(body.additional_secs),
            Protocol::Http,
        )
        .await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .plane
        .delete_session(&principal, &id, Protocol::Http)
        .await?;
    Ok(Json(json!({ "deleted": id })))
}
