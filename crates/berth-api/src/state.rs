//! Shared adapter state.

use std::sync::Arc;

use berth_facade::BrowserPlane;

use crate::auth::AuthConfig;

#[derive(Clone)]
pub struct AppState {
    pub plane: Arc<BrowserPlane>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(plane: Arc<BrowserPlane>, auth: AuthConfig) -> Self {
        Self {
            plane,
            auth: Arc::new(auth),
        }
    }
}
