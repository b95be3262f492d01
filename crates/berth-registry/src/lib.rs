//! Session, context, and page registry.
//!
//! Identities and ownership live here: sessions own contexts, contexts own
//! pages, and every cross-principal access fails with `PermissionDenied`.
//! Browser instances and proxy endpoints are referenced by id only; their
//! lifecycles belong to the pool and the proxy manager.

mod registry;
mod store;
mod types;

pub use registry::{CascadeOutcome, RegistryConfig, SessionRegistry};
pub use store::{InMemoryStore, RegistryStore};
pub use types::{Context, ContextState, Page, Session, SessionFilter};
