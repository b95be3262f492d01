//! Health rollup across components.

use berth_events::BusStats;
use berth_pool::PoolStats;
use berth_proxy::ProxyStats;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Operational,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub overall: OverallState,
    pub uptime_ms: u64,
    pub components: Components,
    pub pool: PoolStats,
    pub proxy: ProxyStats,
    pub events: BusStats,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    pub pool: ComponentState,
    pub proxy: ComponentState,
    pub registry: ComponentState,
    pub events: ComponentState,
}

pub(crate) fn rollup(pool: &PoolStats, proxy: &ProxyStats) -> (Components, OverallState) {
    let pool_state = if pool.min_size > 0 && pool.total == 0 {
        ComponentState::Down
    } else if pool.unhealthy > 0 || pool.total < pool.min_size {
        ComponentState::Degraded
    } else {
        ComponentState::Operational
    };

    let proxy_state = if proxy.endpoints.is_empty() {
        // No endpoints configured means the proxy layer is simply unused.
        ComponentState::Operational
    } else if proxy.endpoints.iter().all(|e| !e.healthy) {
        ComponentState::Down
    } else if proxy.endpoints.iter().any(|e| !e.healthy) {
        ComponentState::Degraded
    } else {
        ComponentState::Operational
    };

    let components = Components {
        pool: pool_state,
        proxy: proxy_state,
        registry: ComponentState::Operational,
        events: ComponentState::Operational,
    };

    let states = [pool_state, proxy_state];
    let overall = if states.contains(&ComponentState::Down) {
        OverallState::Unhealthy
    } else if states.contains(&ComponentState::Degraded) {
        OverallState::Degraded
    } else {
        OverallState::Healthy
    };
    (components, overall)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_stats(total: usize, min: usize, unhealthy: usize) -> PoolStats {
        PoolStats {
            total,
            min_size: min,
            unhealthy,
            max_size: 8,
            ..PoolStats::default()
        }
    }

    fn proxy_stats() -> ProxyStats {
        ProxyStats {
            strategy: "round-robin".to_string(),
            assignments: 0,
            endpoints: vec![],
        }
    }

    #[test]
    fn healthy_when_pool_at_floor() {
        let (components, overall) = rollup(&pool_stats(2, 1, 0), &proxy_stats());
        assert_eq!(components.pool, ComponentState::Operational);
        assert_eq!(overall, OverallState::Healthy);
    }

    #[test]
    fn degraded_below_floor_or_unhealthy_instances() {
        let (_, overall) = rollup(&pool_stats(0, 1, 0), &proxy_stats());
        assert_eq!(overall, OverallState::Unhealthy);

        let (components, overall) = rollup(&pool_stats(2, 1, 1), &proxy_stats());
        assert_eq!(components.pool, ComponentState::Degraded);
        assert_eq!(overall, OverallState::Degraded);
    }
}
