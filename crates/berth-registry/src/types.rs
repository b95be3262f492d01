//! Registry records.

use std::collections::HashMap;

use berth_types::{ContextOptions, Principal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated lifetime for one principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub context_ids: Vec<String>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Created, no browser bound yet.
    Pending,
    /// Bound to a live browser instance.
    Active,
    /// Deliberately unbound; re-binds on next use.
    Paused,
    /// Lost its browser to a crash; re-binds on next use.
    Recovering,
    Closed,
}

/// An isolated browser profile owned by one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub id: String,
    pub session_id: String,
    /// Immutable snapshot taken at creation.
    pub options: ContextOptions,
    pub state: ContextState,
    #[serde(default)]
    pub page_ids: Vec<String>,
    /// Back-edge to the pool's instance, id only.
    pub assigned_instance: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub last_action_at: Option<DateTime<Utc>>,
    pub actions_executed: u64,
}

impl Context {
    /// Active contexts must hold a browser binding.
    pub fn binding_consistent(&self) -> bool {
        self.state != ContextState::Active || self.assigned_instance.is_some()
    }
}

/// A browsing surface inside a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub context_id: String,
    pub url: String,
    pub ready: bool,
    pub created_at: DateTime<Utc>,
    pub last_action_at: Option<DateTime<Utc>>,
}

/// Listing filter; non-admin callers are always narrowed to their own
/// sessions regardless of what they ask for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    /// Substring match on any metadata value.
    pub metadata_contains: Option<String>,
}
