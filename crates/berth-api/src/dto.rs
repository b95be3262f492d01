//! Request bodies for the HTTP and RPC adapters.

use std::collections::HashMap;

use berth_types::ContextOptions;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    /// Session TTL in seconds; server default when omitted.
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMetadataBody {
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendSessionBody {
    pub additional_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContextBody {
    #[serde(default)]
    pub options: ContextOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    /// Raw action envelope; parsed against the closed action set.
    pub action: serde_json::Value,
    pub page_id: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemBody {
    pub page_id: Option<String>,
    pub action: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchBody {
    pub actions: Vec<BatchItemBody>,
    #[serde(default)]
    pub stop_on_error: Option<bool>,
    #[serde(default)]
    pub parallel: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub user_id: Option<String>,
    pub metadata_contains: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_body_parses() {
        let body: ExecuteBody = serde_json::from_value(serde_json::json!({
            "action": {"type": "navigate", "url": "https://example.com"},
            "pageId": "page_1",
            "timeoutMs": 5000,
        }))
        .unwrap();
        assert_eq!(body.page_id.as_deref(), Some("page_1"));
        assert_eq!(body.timeout_ms, Some(5000));
        assert_eq!(body.action["type"], "navigate");
    }

    #[test]
    fn context_body_defaults() {
        let body: CreateContextBody = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(body.options.viewport.width, 1280);
        assert!(body.options.headless);
    }
}
