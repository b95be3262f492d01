//! Per-instance bookkeeping and the health probe.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use berth_driver::{BrowserEngine, LaunchOptions};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Starting,
    Idle,
    InUse,
    Unhealthy,
    Terminating,
}

pub(crate) struct PooledInstance {
    pub id: String,
    pub engine: Arc<dyn BrowserEngine>,
    pub config_key: String,
    /// Options this instance was launched with; replacements reuse them.
    pub options: LaunchOptions,
    pub created_at: Instant,
    pub state: InstanceState,
    pub consecutive_failures: u32,
    pub last_health: Option<(Instant, bool)>,
    /// Context ids currently bound to this instance. Back-edge only; the
    /// registry owns the context records.
    pub assigned_contexts: HashSet<String>,
    pub leased: bool,
    /// Set when the instance went unhealthy while leased; the drain loop
    /// terminates it after the drain deadline.
    pub draining_since: Option<Instant>,
}

impl PooledInstance {
    pub fn new(
        id: String,
        engine: Arc<dyn BrowserEngine>,
        config_key: String,
        options: LaunchOptions,
    ) -> Self {
        Self {
            id,
            engine,
            config_key,
            options,
            created_at: Instant::now(),
            state: InstanceState::Starting,
            consecutive_failures: 0,
            last_health: None,
            assigned_contexts: HashSet::new(),
            leased: false,
            draining_since: None,
        }
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            id: self.id.clone(),
            state: self.state,
            config_key: self.config_key.clone(),
            age_secs: self.created_at.elapsed().as_secs(),
            consecutive_failures: self.consecutive_failures,
            assigned_contexts: self.assigned_contexts.len(),
            last_health_ok: self.last_health.map(|(_, ok)| ok),
        }
    }
}

/// Probe outcome for one scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeOutcome {
    Ok,
    /// Probe failed but the process is still there.
    SoftFail,
    /// Connection closed or process exited.
    HardFail,
}

/// Liveness plus a cheap in-browser operation: open and close a blank page
/// within the probe budget.
pub(crate) async fn probe(engine: &Arc<dyn BrowserEngine>, budget: Duration) -> ProbeOutcome {
    if !engine.is_connected().await {
        return ProbeOutcome::HardFail;
    }
    match timeout(budget, async {
        let page = engine.new_page().await?;
        page.close().await
    })
    .await
    {
        Ok(Ok(())) => ProbeOutcome::Ok,
        Ok(Err(e)) if e.is_fatal() => {
            warn!(error = %e, "health probe hit dead browser");
            ProbeOutcome::HardFail
        }
        Ok(Err(e)) => {
            debug!(error = %e, "health probe failed");
            ProbeOutcome::SoftFail
        }
        Err(_) => {
            debug!(budget_ms = budget.as_millis() as u64, "health probe timed out");
            ProbeOutcome::SoftFail
        }
    }
}

/// Read-only view used by `PoolStats` and the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub id: String,
    pub state: InstanceState,
    pub config_key: String,
    pub age_secs: u64,
    pub consecutive_failures: u32,
    pub assigned_contexts: usize,
    pub last_health_ok: Option<bool>,
}
