//! HTTP handlers, grouped by resource.

pub mod actions;
pub mod contexts;
pub mod sessions;
pub mod system;
