//! Transport adapters for the berth execution plane.
//!
//! Four front-ends converge on one `BrowserPlane`: the JSON/HTTP API and
//! the WebSocket push channel (axum), a newline-delimited JSON RPC listener
//! over TCP, and an in-process tool-call adapter for embedding in agent
//! hosts. Adapters parse, authenticate, call the facade, and map errors;
//! nothing else.

pub mod auth;
pub mod config;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod ops;
pub mod router;
pub mod rpc;
pub mod state;
pub mod tool;
pub mod ws;

pub use router::build_router;
pub use state::AppState;
pub use tool::ToolCallAdapter;
