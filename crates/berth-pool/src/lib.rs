//! Browser instance pool.
//!
//! Owns a bounded set of long-lived engine instances: pre-warms a minimum,
//! lends instances out through one-shot leases, parks saturated acquirers in
//! a FIFO waiter queue, health-checks in the background, and recycles
//! crashed or drained instances.

mod config;
mod instance;
mod pool;

pub use config::{LaunchProfile, PoolConfig};
pub use instance::{InstanceSnapshot, InstanceState};
pub use pool::{BrowserPool, Lease, PoolStats};
