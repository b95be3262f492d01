//! Action execution handlers.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use berth_executor::{parse_action, BatchOptions, ExecRequest};
use berth_types::{Principal, Protocol};
use serde_json::{json, Value};

use crate::dto::{BatchBody, ExecuteBody, HistoryQuery};
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn execute(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(context_id): Path<String>,
    Json(body): Json<ExecuteBody>,
) -> ApiResult<Json<Value>> {
    let action = parse_action(body.action).map_err(ApiError)?;
    let result = state
        .plane
        .execute(
            ExecRequest {
                principal,
                context_id,
                page_id: body.page_id,
                origin: Protocol::Http,
                timeout_ms: body.timeout_ms,
            },
            action,
        )
        .await;
    Ok(Json(json!({ "result": result })))
}

pub async fn execute_batch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(context_id): Path<String>,
    Json(body): Json<BatchBody>,
) -> ApiResult<Json<Value>> {
    let mut items = Vec::with_capacity(body.actions.len());
    for item in body.actions {
        items.push((item.page_id, parse_action(item.action).map_err(ApiError)?));
    }
    let defaults = BatchOptions::default();
    let options = BatchOptions {
        stop_on_error: body.stop_on_error.unwrap_or(defaults.stop_on_error),
        parallel: body.parallel.unwrap_or(defaults.parallel),
    };
    let results = state
        .plane
        .execute_batch(
            ExecRequest {
                principal,
                context_id,
                page_id: None,
                origin: Protocol::Http,
                timeout_ms: None,
            },
            items,
            options,
        )
        .await?;
    Ok(Json(json!({ "results": results })))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(context_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let records = state
        .plane
        .history(&principal, &context_id, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(json!({ "history": records })))
}

pub async fn metrics(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(context_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let metrics = state.plane.metrics(&principal, &context_id).await?;
    Ok(Json(json!({ "metrics": metrics })))
}
