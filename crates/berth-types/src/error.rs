//! Protocol-neutral error taxonomy.
//!
//! Every failure that crosses the core boundary is one of these kinds.
//! Adapters map kinds to their transport's status codes; history records the
//! kind only, never the message, so metrics stay cardinality-safe.

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure kinds, shared by every subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Validation failed (URL, selector, bounds).
    InvalidArgument,
    /// Missing or invalid principal.
    Unauthorized,
    /// Principal does not own the target.
    PermissionDenied,
    /// Session/context/page absent.
    NotFound,
    /// Pool or queue saturated.
    ResourceExhausted,
    /// Action deadline exceeded.
    Timeout,
    /// Request canceled.
    Canceled,
    /// URL, script, or file path rejected by policy.
    BlockedByPolicy,
    /// Underlying browser instance died mid-action.
    BrowserCrashed,
    /// Script executed but threw.
    ScriptRuntimeError,
    /// Proxy unreachable or refused.
    UpstreamProxyFailure,
    /// Unknown action type at the adapter boundary.
    UnsupportedAction,
    /// Invariant violation or bug; surfaced opaque.
    Internal,
}

impl ErrorKind {
    /// Whether the caller can reasonably retry the same request.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ResourceExhausted
                | ErrorKind::Timeout
                | ErrorKind::BrowserCrashed
                | ErrorKind::UpstreamProxyFailure
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ResourceExhausted => "ResourceExhausted",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Canceled => "Canceled",
            ErrorKind::BlockedByPolicy => "BlockedByPolicy",
            ErrorKind::BrowserCrashed => "BrowserCrashed",
            ErrorKind::ScriptRuntimeError => "ScriptRuntimeError",
            ErrorKind::UpstreamProxyFailure => "UpstreamProxyFailure",
            ErrorKind::UnsupportedAction => "UnsupportedAction",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error kind plus human-readable detail.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    pub fn blocked<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::BlockedByPolicy, message)
    }

    pub fn browser_crashed<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::BrowserCrashed, message)
    }

    pub fn script_runtime<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::ScriptRuntimeError, message)
    }

    pub fn proxy_failure<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::UpstreamProxyFailure, message)
    }

    pub fn unsupported_action<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::UnsupportedAction, message)
    }

    /// Internal errors are logged with full context at the call site and
    /// surfaced to clients without detail.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_preserved() {
        let err = Error::blocked("private address");
        assert_eq!(err.kind(), ErrorKind::BlockedByPolicy);
        assert_eq!(err.to_string(), "BlockedByPolicy: private address");
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::ResourceExhausted.retryable());
        assert!(ErrorKind::BrowserCrashed.retryable());
        assert!(!ErrorKind::PermissionDenied.retryable());
        assert!(!ErrorKind::BlockedByPolicy.retryable());
    }
}
