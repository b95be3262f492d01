//! Shared types for the berth browser execution plane.
//!
//! Everything that crosses a crate boundary lives here: ids, the caller
//! principal, the protocol-neutral error taxonomy, context configuration
//! snapshots, and the hard limits enforced by validation.

mod error;
mod ids;
mod limits;
mod options;
mod principal;

pub use error::{Error, ErrorKind, Result};
pub use ids::{context_id, endpoint_id, instance_id, page_id, session_id};
pub use limits::*;
pub use options::{ContextOptions, ProxyPolicy, SameSite, Viewport};
pub use principal::Principal;

/// Which front-end protocol originated a request or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Rpc,
    Ws,
    Tool,
    /// Internal origin (background loops, recovery, sweepers).
    Internal,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Protocol::Http => "http",
            Protocol::Rpc => "rpc",
            Protocol::Ws => "ws",
            Protocol::Tool => "tool",
            Protocol::Internal => "internal",
        };
        f.write_str(s)
    }
}
