//! In-process event bus.
//!
//! Lifecycle events from every subsystem fan out through a single
//! `tokio::sync::broadcast` channel. Each subscriber gets its own bounded
//! mailbox; a subscriber that falls behind loses the oldest events with a
//! warning and never blocks publishers.

mod bus;
mod event;

pub use bus::{BusStats, EventBus, EventBusConfig, Subscription};
pub use event::{topic_matches, Event};

/// Well-known topic names.
pub mod topics {
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_EXTENDED: &str = "session.extended";
    pub const SESSION_DELETED: &str = "session.deleted";
    pub const SESSION_EXPIRED: &str = "session.expired";

    pub const CONTEXT_CREATED: &str = "context.created";
    pub const CONTEXT_ASSIGNED: &str = "context.assigned";
    pub const CONTEXT_STATE_CHANGED: &str = "context.state_changed";
    pub const CONTEXT_CLOSED: &str = "context.closed";

    pub const PAGE_CREATED: &str = "page.created";
    pub const PAGE_NAVIGATED: &str = "page.navigated";
    pub const PAGE_ACTION_EXECUTED: &str = "page.action_executed";
    pub const PAGE_CLOSED: &str = "page.closed";

    pub const BROWSER_LAUNCHED: &str = "browser.launched";
    pub const BROWSER_UNHEALTHY: &str = "browser.unhealthy";
    pub const BROWSER_CRASHED: &str = "browser.crashed";
    pub const BROWSER_REPLACED: &str = "browser.replaced";
    pub const BROWSER_TERMINATED: &str = "browser.terminated";

    pub const PROXY_ASSIGNED: &str = "proxy.assigned";
    pub const PROXY_ROTATED: &str = "proxy.rotated";
    pub const PROXY_UNHEALTHY: &str = "proxy.unhealthy";
    pub const PROXY_RECOVERED: &str = "proxy.recovered";
}
