//! In-process tool-call adapter.
//!
//! Agent hosts embed this to drive the plane without a network hop. The
//! host resolves the principal once (it owns the agent's identity); every
//! call is then `(op, params)` against the shared dispatch table, with the
//! catalog available for tool discovery.

use std::sync::Arc;

use berth_facade::BrowserPlane;
use berth_types::{Principal, Protocol, Result};
use serde_json::Value;

#[derive(Clone)]
pub struct ToolCallAdapter {
    plane: Arc<BrowserPlane>,
    principal: Principal,
}

impl ToolCallAdapter {
    pub fn new(plane: Arc<BrowserPlane>, principal: Principal) -> Self {
        Self { plane, principal }
    }

    /// Machine-readable description of every operation and action.
    pub fn catalog(&self) -> Value {
        self.plane.catalog()
    }

    pub async fn call(&self, op: &str, params: Value) -> Result<Value> {
        crate::ops::dispatch_op(&self.plane, &self.principal, Protocol::Tool, op, params).await
    }
}
