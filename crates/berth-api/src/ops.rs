//! Protocol-neutral operation dispatch.
//!
//! The RPC and tool adapters converge here; each maps `(op, params)` onto
//! the facade without any protocol-specific behavior. The HTTP adapter uses
//! axum-native handlers instead but calls the same facade surface.

use std::time::Duration;

use berth_executor::{parse_action, BatchOptions, ExecRequest};
use berth_facade::BrowserPlane;
use berth_types::{Error, Principal, Protocol, Result};
use serde_json::{json, Value};

use crate::dto::{
    BatchBody, CreateContextBody, CreateSessionBody, ExecuteBody, ExtendSessionBody,
    UpdateMetadataBody,
};

fn params<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::invalid_argument(format!("malformed params: {e}")))
}

fn required_str(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::invalid_argument(format!("missing {key}")))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::internal(format!("serialize response: {e}")))
}

pub async fn dispatch_op(
    plane: &BrowserPlane,
    principal: &Principal,
    origin: Protocol,
    op: &str,
    raw: Value,
) -> Result<Value> {
    match op {
        "session.create" => {
            let body: CreateSessionBody = params(raw)?;
            let session = plane
                .create_session(
                    principal,
                    body.ttl_secs.map(Duration::from_secs),
                    body.metadata,
                    origin,
                )
                .await?;
            to_value(session)
        }
        "session.get" => {
            let id = required_str(&raw, "sessionId")?;
            to_value(plane.get_session(principal, &id).await?)
        }
        "session.list" => {
            let filter = params(raw)?;
            to_value(plane.list_sessions(principal, &filter).await?)
        }
        "session.updateMetadata" => {
            let id = required_str(&raw, "sessionId")?;
            let body: UpdateMetadataBody = params(raw)?;
            to_value(
                plane
                    .update_session_metadata(principal, &id, body.metadata, origin)
                    .await?,
            )
        }
        "session.extend" => {
            let id = required_str(&raw, "sessionId")?;
            let body: ExtendSessionBody = params(raw)?;
            to_value(
                plane
                    .extend_session(
                        principal,
                        &id,
                        Duration::from_secs(body.additional_secs),
                        origin,
                    )
                    .await?,
            )
        }
        "session.touch" => {
            let id = required_str(&raw, "sessionId")?;
            to_value(plane.touch_session(principal, &id, origin).await?)
        }
        "session.delete" => {
            let id = required_str(&raw, "sessionId")?;
            plane.delete_session(principal, &id, origin).await?;
            Ok(json!({ "deleted": id }))
        }
        "context.create" => {
            let session_id = required_str(&raw, "sessionId")?;
            let body: CreateContextBody = params(raw)?;
            to_value(
                plane
                    .create_context(principal, &session_id, body.options, origin)
                    .await?,
            )
        }
        "context.get" => {
            let id = required_str(&raw, "contextId")?;
            to_value(plane.get_context(principal, &id).await?)
        }
        "context.list" => {
            let session_id = required_str(&raw, "sessionId")?;
            to_value(plane.list_contexts(principal, &session_id).await?)
        }
        "context.close" => {
            let id = required_str(&raw, "contextId")?;
            plane.close_context(principal, &id, origin).await?;
            Ok(json!({ "closed": id }))
        }
        "page.create" => {
            let context_id = required_str(&raw, "contextId")?;
            to_value(plane.create_page(principal, &context_id, origin).await?)
        }
        "page.get" => {
            let id = required_str(&raw, "pageId")?;
            to_value(plane.get_page(principal, &id).await?)
        }
        "page.close" => {
            let id = required_str(&raw, "pageId")?;
            plane.close_page(principal, &id, origin).await?;
            Ok(json!({ "closed": id }))
        }
        "execute" => {
            let context_id = required_str(&raw, "contextId")?;
            let body: ExecuteBody = params(raw)?;
            let action = parse_action(body.action)?;
            let result = plane
                .execute(
                    ExecRequest {
                        principal: principal.clone(),
                        context_id,
                        page_id: body.page_id,
                        origin,
                        timeout_ms: body.timeout_ms,
                    },
                    action,
                )
                .await;
            to_value(result)
        }
        "executeBatch" => {
            let context_id = required_str(&raw, "contextId")?;
            let body: BatchBody = params(raw)?;
            let mut items = Vec::with_capacity(body.actions.len());
            for item in body.actions {
                items.push((item.page_id, parse_action(item.action)?));
            }
            let defaults = BatchOptions::default();
            let options = BatchOptions {
                stop_on_error: body.stop_on_error.unwrap_or(defaults.stop_on_error),
                parallel: body.parallel.unwrap_or(defaults.parallel),
            };
            let results = plane
                .execute_batch(
                    ExecRequest {
                        principal: principal.clone(),
                        context_id,
                        page_id: None,
                        origin,
                        timeout_ms: None,
                    },
                    items,
                    options,
                )
                .await?;
            to_value(results)
        }
        "history" => {
            let context_id = required_str(&raw, "contextId")?;
            let limit = raw.get("limit").and_then(|v| v.as_u64()).unwrap_or(50) as usize;
            to_value(plane.history(principal, &context_id, limit).await?)
        }
        "metrics" => {
            let context_id = required_str(&raw, "contextId")?;
            to_value(plane.metrics(principal, &context_id).await?)
        }
        "health" => to_value(plane.health().await),
        "catalog" => Ok(plane.catalog()),
        other => Err(Error::unsupported_action(format!("unknown operation: {other}"))),
    }
}
