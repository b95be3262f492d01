//! Error mapping at the HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use berth_types::{Error, ErrorKind};
use serde_json::json;

/// Transport-side wrapper over the core taxonomy.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
        // 499 (client closed request) has no named constant in http.
        ErrorKind::Canceled => StatusCode::from_u16(499).expect("valid status code"),
        ErrorKind::BlockedByPolicy => StatusCode::FORBIDDEN,
        ErrorKind::BrowserCrashed => StatusCode::BAD_GATEWAY,
        ErrorKind::ScriptRuntimeError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::UpstreamProxyFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::UnsupportedAction => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        // Internal detail stays in the logs, never in the response body.
        let message = if kind == ErrorKind::Internal {
            tracing::error!(error = %self.0, "internal error surfaced to client");
            "internal error".to_string()
        } else {
            self.0.message().to_string()
        };
        let body = json!({
            "error": kind,
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let expected = [
            (ErrorKind::InvalidArgument, 400),
            (ErrorKind::Unauthorized, 401),
            (ErrorKind::PermissionDenied, 403),
            (ErrorKind::NotFound, 404),
            (ErrorKind::ResourceExhausted, 503),
            (ErrorKind::Timeout, 408),
            (ErrorKind::Canceled, 499),
            (ErrorKind::BlockedByPolicy, 403),
            (ErrorKind::BrowserCrashed, 502),
            (ErrorKind::ScriptRuntimeError, 422),
            (ErrorKind::UpstreamProxyFailure, 502),
            (ErrorKind::UnsupportedAction, 400),
            (ErrorKind::Internal, 500),
        ];
        for (kind, code) in expected {
            assert_eq!(status_for(kind).as_u16(), code, "{kind} maps to {code}");
        }
    }
}
