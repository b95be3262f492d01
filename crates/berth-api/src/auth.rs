//! Principal resolution at the transport boundary.
//!
//! Static API keys: `BERTH_API_KEYS` is a comma-separated list of
//! `token:user_id:display_name[:role[;role]]` entries. Tokens arrive via
//! `X-API-Key` or `Authorization: Bearer <token>`.

use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use berth_types::{Error, Principal, Result};
use tracing::warn;

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: HashMap<String, Principal>,
}

impl AuthConfig {
    pub fn from_spec(spec: &str) -> Self {
        let mut tokens = HashMap::new();
        for entry in spec.split(',').filter(|e| !e.trim().is_empty()) {
            let parts: Vec<&str> = entry.trim().splitn(4, ':').collect();
            if parts.len() < 3 {
                warn!(entry = %entry, "skipping malformed api key entry");
                continue;
            }
            let mut principal = Principal::new(parts[1], parts[2]);
            if let Some(roles) = parts.get(3) {
                principal = principal
                    .with_roles(roles.split(';').map(|r| r.trim().to_string()).collect());
            }
            tokens.insert(parts[0].to_string(), principal);
        }
        Self { tokens }
    }

    pub fn from_env() -> Self {
        std::env::var("BERTH_API_KEYS")
            .map(|spec| Self::from_spec(&spec))
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn resolve_token(&self, token: &str) -> Result<Principal> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::unauthorized("unknown api key"))
    }

    pub fn resolve_headers(&self, headers: &HeaderMap) -> Result<Principal> {
        let token = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .or_else(|| {
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .map(|v| v.to_string())
            })
            .ok_or_else(|| Error::unauthorized("missing credentials"))?;
        self.resolve_token(&token)
    }
}

/// Resolves the caller and stashes the `Principal` in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let principal = state.auth.resolve_headers(request.headers())?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
