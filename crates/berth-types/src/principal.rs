//! Caller identity resolved by the transport adapters.

use serde::{Deserialize, Serialize};

/// The authenticated principal behind a request.
///
/// Adapters resolve credentials into a `Principal` before calling the core;
/// the core itself only ever checks ownership against `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new<S: Into<String>>(user_id: S, display_name: S) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Admins may operate on resources they do not own.
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}
