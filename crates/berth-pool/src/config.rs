//! Pool capacity and health policy.

use std::collections::HashMap;
use std::time::Duration;

use berth_driver::LaunchOptions;

/// A named launch configuration. `Acquire` requests name one of these and
/// only instances launched from the same profile are reused.
#[derive(Debug, Clone, Default)]
pub struct LaunchProfile {
    pub options: LaunchOptions,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Instances kept alive at all times.
    pub min_size: usize,
    /// Hard cap on live instances.
    pub max_size: usize,
    /// Idle instances to keep warm.
    pub target_idle: usize,
    /// Idle instances above `target_idle` tolerated before trimming.
    pub idle_grace: usize,
    /// Parked `acquire` calls beyond this fail immediately.
    pub waiter_queue_bound: usize,
    /// Deadline applied when the caller does not supply one.
    pub default_acquire_deadline: Duration,
    /// Background health scan interval.
    pub health_check_interval: Duration,
    /// Budget for one health probe (liveness + blank page open/close).
    pub probe_timeout: Duration,
    /// Soft probe failures before an instance is marked unhealthy.
    pub unhealthy_after_failures: u32,
    /// How long a drained instance may finish its lease before termination.
    pub drain_deadline: Duration,
    /// First launch retry delay; doubles per attempt.
    pub launch_backoff_base: Duration,
    /// Ceiling for the launch retry delay.
    pub launch_backoff_cap: Duration,
    /// Launch attempts before an acquire fails.
    pub launch_retries: u32,
    /// Grace window for `shutdown` before leases are force-terminated.
    pub shutdown_grace: Duration,
    /// Launch profiles by config key. Must contain `default`.
    pub profiles: HashMap<String, LaunchProfile>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), LaunchProfile::default());
        Self {
            min_size: 1,
            max_size: 8,
            target_idle: 2,
            idle_grace: 2,
            waiter_queue_bound: 64,
            default_acquire_deadline: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            unhealthy_after_failures: 3,
            drain_deadline: Duration::from_secs(30),
            launch_backoff_base: Duration::from_millis(200),
            launch_backoff_cap: Duration::from_secs(5),
            launch_retries: 3,
            shutdown_grace: Duration::from_secs(10),
            profiles,
        }
    }
}

impl PoolConfig {
    pub fn profile(&self, key: &str) -> Option<&LaunchProfile> {
        self.profiles.get(key)
    }
}
