//! Driver-level errors and their classification into the shared taxonomy.

use berth_types::ErrorKind;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to create page: {0}")]
    PageCreation(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("target detached: {0}")]
    Detached(String),

    #[error("script threw: {0}")]
    ScriptRuntime(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("browser connection closed")]
    ConnectionClosed,

    #[error("browser process exited")]
    ProcessExited,

    #[error("no history entry in that direction")]
    NoHistory,

    #[error("not supported by this engine: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Map to the protocol-neutral taxonomy. This is the only place where
    /// engine failure modes become caller-visible error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Timeout(_) => ErrorKind::Timeout,
            DriverError::ElementNotFound { .. } => ErrorKind::NotFound,
            DriverError::ScriptRuntime(_) => ErrorKind::ScriptRuntimeError,
            DriverError::ConnectionClosed
            | DriverError::ProcessExited
            | DriverError::Detached(_)
            | DriverError::PageCreation(_) => ErrorKind::BrowserCrashed,
            DriverError::NoHistory => ErrorKind::InvalidArgument,
            DriverError::NotSupported(_) => ErrorKind::UnsupportedAction,
            DriverError::Launch(_) | DriverError::Navigation(_) | DriverError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Hard liveness failures: the instance is gone, not merely slow.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionClosed | DriverError::ProcessExited
        )
    }
}

impl From<DriverError> for berth_types::Error {
    fn from(err: DriverError) -> Self {
        berth_types::Error::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(DriverError::Timeout(500).kind(), ErrorKind::Timeout);
        assert_eq!(DriverError::ProcessExited.kind(), ErrorKind::BrowserCrashed);
        assert_eq!(
            DriverError::ElementNotFound {
                selector: "#x".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DriverError::ScriptRuntime("boom".into()).kind(),
            ErrorKind::ScriptRuntimeError
        );
        assert!(DriverError::ConnectionClosed.is_fatal());
        assert!(!DriverError::Timeout(1).is_fatal());
    }
}
