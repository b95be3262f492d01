//! Pool state machine, leases, waiter queue, health loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use berth_driver::{BrowserEngine, Launcher};
use berth_events::{topics, Event, EventBus};
use berth_types::{Error, Protocol, Result};
use serde::Serialize;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::{interval, sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::instance::{probe, InstanceSnapshot, InstanceState, PooledInstance, ProbeOutcome};

struct Grant {
    instance_id: String,
    engine: Arc<dyn BrowserEngine>,
}

struct Waiter {
    id: u64,
    config_key: String,
    tx: oneshot::Sender<Result<Grant>>,
}

#[derive(Default)]
struct Counters {
    launched: u64,
    crashed: u64,
    trimmed: u64,
}

struct PoolState {
    instances: HashMap<String, PooledInstance>,
    /// Instance ids in `Idle`, oldest release first.
    idle: VecDeque<String>,
    /// Parked acquirers in FIFO arrival order.
    waiters: VecDeque<Waiter>,
    /// In-flight launches, counted against `max_size`.
    launching: usize,
    next_waiter_id: u64,
    shutting_down: bool,
    counters: Counters,
}

impl PoolState {
    fn live(&self) -> usize {
        self.instances
            .values()
            .filter(|i| i.state != InstanceState::Terminating)
            .count()
    }
}

struct Shared {
    config: PoolConfig,
    launcher: Launcher,
    bus: EventBus,
    state: Mutex<PoolState>,
    shutdown_tx: watch::Sender<bool>,
}

/// The browser pool. Clone-free: wrap in `Arc` to share.
pub struct BrowserPool {
    shared: Arc<Shared>,
    health_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BrowserPool {
    /// Build the pool and pre-warm `min_size` instances. Launch failures at
    /// startup degrade capacity but do not fail construction.
    pub async fn start(config: PoolConfig, launcher: Launcher, bus: EventBus) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            config,
            launcher,
            bus,
            state: Mutex::new(PoolState {
                instances: HashMap::new(),
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                launching: 0,
                next_waiter_id: 0,
                shutting_down: false,
                counters: Counters::default(),
            }),
            shutdown_tx,
        });

        let default_options = shared
            .config
            .profile("default")
            .map(|p| p.options.clone())
            .unwrap_or_default();
        let mut warmed = 0usize;
        for _ in 0..shared.config.min_size {
            match launch_instance(&shared, "default", &default_options).await {
                Ok(instance_id) => {
                    warmed += 1;
                    debug!(instance_id = %instance_id, "pre-warmed browser instance");
                }
                Err(e) => {
                    warn!(error = %e, "pre-warm launch failed, continuing with reduced capacity");
                }
            }
        }
        info!(
            warmed,
            min = shared.config.min_size,
            max = shared.config.max_size,
            "browser pool started"
        );

        let pool = Arc::new(Self {
            shared: shared.clone(),
            health_task: std::sync::Mutex::new(None),
        });

        let task = tokio::spawn(health_loop(shared, shutdown_rx));
        *pool.health_task.lock().unwrap() = Some(task);
        pool
    }

    /// Acquire an instance launched from `config_key`'s profile.
    ///
    /// Returns an idle instance when one exists, launches up to `max_size`,
    /// and otherwise parks in the FIFO waiter queue until `deadline`.
    pub async fn acquire(&self, config_key: &str, deadline: Option<Duration>) -> Result<Lease> {
        let options = self
            .shared
            .config
            .profile(config_key)
            .ok_or_else(|| {
                Error::invalid_argument(format!("unknown launch profile: {config_key}"))
            })?
            .options
            .clone();
        self.acquire_inner(config_key.to_string(), options, deadline)
            .await
    }

    /// Acquire an instance routed through one proxy endpoint. Instances are
    /// keyed by profile and endpoint, so contexts on different endpoints
    /// never share a browser.
    pub async fn acquire_proxied(
        &self,
        config_key: &str,
        endpoint_id: &str,
        proxy_server: &str,
        deadline: Option<Duration>,
    ) -> Result<Lease> {
        let mut options = self
            .shared
            .config
            .profile(config_key)
            .ok_or_else(|| {
                Error::invalid_argument(format!("unknown launch profile: {config_key}"))
            })?
            .options
            .clone();
        options.proxy_server = Some(proxy_server.to_string());
        let derived_key = format!("{config_key}@{endpoint_id}");
        self.acquire_inner(derived_key, options, deadline).await
    }

    async fn acquire_inner(
        &self,
        config_key: String,
        options: berth_driver::LaunchOptions,
        deadline: Option<Duration>,
    ) -> Result<Lease> {
        let deadline = deadline.unwrap_or(self.shared.config.default_acquire_deadline);
        let deadline_at = Instant::now() + deadline;

        enum Plan {
            Grant(Grant),
            Launch,
            Wait(u64, oneshot::Receiver<Result<Grant>>),
        }

        let plan = {
            let mut state = self.shared.state.lock().await;
            if state.shutting_down {
                return Err(Error::canceled("pool is shutting down"));
            }

            if let Some(grant) = pop_idle(&mut state, &config_key) {
                Plan::Grant(grant)
            } else if state.live() + state.launching < self.shared.config.max_size {
                state.launching += 1;
                Plan::Launch
            } else if state.waiters.len() >= self.shared.config.waiter_queue_bound {
                return Err(Error::resource_exhausted("pool waiter queue is full"));
            } else {
                let id = state.next_waiter_id;
                state.next_waiter_id += 1;
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter {
                    id,
                    config_key: config_key.clone(),
                    tx,
                });
                debug!(waiter_id = id, config_key = %config_key, "acquire parked in waiter queue");
                Plan::Wait(id, rx)
            }
        };

        match plan {
            Plan::Grant(grant) => Ok(self.lease(grant)),
            Plan::Launch => self.launch_for_acquire(&config_key, &options, deadline_at).await,
            Plan::Wait(waiter_id, rx) => match timeout_at(deadline_at, rx).await {
                Ok(Ok(Ok(grant))) => Ok(self.lease(grant)),
                Ok(Ok(Err(e))) => Err(e),
                Ok(Err(_)) => Err(Error::internal("pool dropped waiter channel")),
                Err(_) => {
                    let mut state = self.shared.state.lock().await;
                    state.waiters.retain(|w| w.id != waiter_id);
                    Err(Error::resource_exhausted(format!(
                        "no browser available within {}ms",
                        deadline.as_millis()
                    )))
                }
            },
        }
    }

    async fn launch_for_acquire(
        &self,
        config_key: &str,
        options: &berth_driver::LaunchOptions,
        deadline_at: Instant,
    ) -> Result<Lease> {
        let result = launch_with_backoff(&self.shared, options, Some(deadline_at)).await;
        let mut state = self.shared.state.lock().await;
        state.launching -= 1;
        match result {
            Ok((instance_id, engine)) => {
                let mut instance = PooledInstance::new(
                    instance_id.clone(),
                    engine.clone(),
                    config_key.to_string(),
                    options.clone(),
                );
                instance.state = InstanceState::InUse;
                instance.leased = true;
                state.instances.insert(instance_id.clone(), instance);
                state.counters.launched += 1;
                drop(state);
                self.shared.bus.publish(
                    Event::new(topics::BROWSER_LAUNCHED, Protocol::Internal).with_fields(
                        serde_json::json!({ "instance_id": instance_id, "config_key": config_key }),
                    ),
                );
                Ok(self.lease(Grant {
                    instance_id,
                    engine,
                }))
            }
            Err(e) => {
                // Launch capacity is gone; nothing will free up for parked
                // acquirers either if the pool is empty.
                if state.live() == 0 {
                    for waiter in state.waiters.drain(..) {
                        let _ = waiter.tx.send(Err(e.clone()));
                    }
                }
                Err(e)
            }
        }
    }

    fn lease(&self, grant: Grant) -> Lease {
        debug!(instance_id = %grant.instance_id, "browser leased");
        Lease {
            instance_id: grant.instance_id,
            engine: grant.engine,
            shared: self.shared.clone(),
            released: false,
        }
    }

    /// Record a crash observed by a caller mid-action. Detaches contexts,
    /// terminates the instance, and replaces it if the pool is below demand.
    pub async fn report_crash(&self, instance_id: &str, reason: &str) {
        recover_instance(&self.shared, instance_id, reason).await;
    }

    /// Bind a context to an instance. Ids only; the registry owns contexts.
    pub async fn assign_context(&self, instance_id: &str, context_id: &str) {
        let mut state = self.shared.state.lock().await;
        if let Some(instance) = state.instances.get_mut(instance_id) {
            instance.assigned_contexts.insert(context_id.to_string());
        }
    }

    pub async fn detach_context(&self, instance_id: &str, context_id: &str) {
        let mut state = self.shared.state.lock().await;
        if let Some(instance) = state.instances.get_mut(instance_id) {
            instance.assigned_contexts.remove(context_id);
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().await;
        let mut stats = PoolStats {
            min_size: self.shared.config.min_size,
            max_size: self.shared.config.max_size,
            ..PoolStats::default()
        };
        for instance in state.instances.values() {
            stats.total += 1;
            match instance.state {
                InstanceState::Idle => stats.idle += 1,
                InstanceState::InUse => stats.in_use += 1,
                InstanceState::Unhealthy => stats.unhealthy += 1,
                InstanceState::Starting | InstanceState::Terminating => {}
            }
            stats.instances.push(instance.snapshot());
        }
        stats.waiters = state.waiters.len();
        stats.launched_total = state.counters.launched;
        stats.crashed_total = state.counters.crashed;
        stats.trimmed_total = state.counters.trimmed;
        stats.utilization = if stats.max_size > 0 {
            stats.in_use as f64 / stats.max_size as f64
        } else {
            0.0
        };
        stats
    }

    /// Cancel waiters, drain leases within the grace window, terminate
    /// everything, and stop the health loop.
    pub async fn shutdown(&self) {
        info!("browser pool shutting down");
        {
            let mut state = self.shared.state.lock().await;
            state.shutting_down = true;
            for waiter in state.waiters.drain(..) {
                let _ = waiter.tx.send(Err(Error::canceled("pool is shutting down")));
            }
        }
        let _ = self.shared.shutdown_tx.send(true);

        let grace_until = Instant::now() + self.shared.config.shutdown_grace;
        loop {
            let leased = {
                let state = self.shared.state.lock().await;
                state.instances.values().filter(|i| i.leased).count()
            };
            if leased == 0 || Instant::now() >= grace_until {
                if leased > 0 {
                    warn!(leased, "shutdown grace elapsed with live leases, force-terminating");
                }
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }

        let instances: Vec<PooledInstance> = {
            let mut state = self.shared.state.lock().await;
            state.idle.clear();
            state.instances.drain().map(|(_, v)| v).collect()
        };
        for instance in instances {
            if let Err(e) = instance.engine.close().await {
                warn!(instance_id = %instance.id, error = %e, "error closing browser at shutdown");
            }
            self.shared.bus.publish(
                Event::new(topics::BROWSER_TERMINATED, Protocol::Internal).with_fields(
                    serde_json::json!({ "instance_id": instance.id, "reason": "shutdown" }),
                ),
            );
        }

        if let Some(task) = self.health_task.lock().unwrap().take() {
            task.abort();
        }
        info!("browser pool shutdown complete");
    }
}

/// A one-shot ticket for exclusive use of one instance. Release explicitly;
/// dropping falls back to a best-effort background release.
pub struct Lease {
    instance_id: String,
    engine: Arc<dyn BrowserEngine>,
    shared: Arc<Shared>,
    released: bool,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("instance_id", &self.instance_id)
            .field("released", &self.released)
            .finish()
    }
}

impl Lease {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn engine(&self) -> Arc<dyn BrowserEngine> {
        self.engine.clone()
    }

    pub async fn release(mut self) {
        self.released = true;
        release_instance(&self.shared, &self.instance_id).await;
    }

    /// Discard without returning the instance to the pool. For leases on
    /// instances the pool has already recovered or is about to recover.
    pub fn forget(mut self) {
        self.released = true;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                instance_id = %self.instance_id,
                "lease dropped without release, spawning background checkin"
            );
            let shared = self.shared.clone();
            let instance_id = self.instance_id.clone();
            tokio::spawn(async move {
                release_instance(&shared, &instance_id).await;
            });
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub unhealthy: usize,
    pub waiters: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub launched_total: u64,
    pub crashed_total: u64,
    pub trimmed_total: u64,
    pub utilization: f64,
    pub instances: Vec<InstanceSnapshot>,
}

fn pop_idle(state: &mut PoolState, config_key: &str) -> Option<Grant> {
    let pos = state.idle.iter().position(|id| {
        state
            .instances
            .get(id)
            .is_some_and(|i| i.state == InstanceState::Idle && i.config_key == config_key)
    })?;
    let id = state.idle.remove(pos)?;
    let instance = state.instances.get_mut(&id)?;
    instance.state = InstanceState::InUse;
    instance.leased = true;
    Some(Grant {
        instance_id: id,
        engine: instance.engine.clone(),
    })
}

async fn launch_with_backoff(
    shared: &Arc<Shared>,
    options: &berth_driver::LaunchOptions,
    deadline_at: Option<Instant>,
) -> Result<(String, Arc<dyn BrowserEngine>)> {
    let mut last_error = None;
    for attempt in 0..=shared.config.launch_retries {
        if let Some(deadline) = deadline_at {
            if Instant::now() >= deadline {
                return Err(Error::resource_exhausted(
                    "acquire deadline elapsed during browser launch",
                ));
            }
        }
        match shared.launcher.launch(options).await {
            Ok(engine) => return Ok((berth_types::instance_id(), engine)),
            Err(e) => {
                warn!(attempt, error = %e, "browser launch failed");
                last_error = Some(e);
                if attempt < shared.config.launch_retries {
                    let backoff = shared
                        .config
                        .launch_backoff_base
                        .saturating_mul(1 << attempt.min(16))
                        .min(shared.config.launch_backoff_cap);
                    sleep(backoff).await;
                }
            }
        }
    }
    let detail = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no launch attempts made".to_string());
    Err(Error::internal(format!("browser launch failed: {detail}")))
}

/// Simple launch used for pre-warm and replacements; the new instance goes
/// idle or is handed straight to the oldest matching waiter.
async fn launch_instance(
    shared: &Arc<Shared>,
    config_key: &str,
    options: &berth_driver::LaunchOptions,
) -> Result<String> {
    let (instance_id, engine) = launch_with_backoff(shared, options, None).await?;
    let mut state = shared.state.lock().await;
    let mut instance = PooledInstance::new(
        instance_id.clone(),
        engine.clone(),
        config_key.to_string(),
        options.clone(),
    );

    let waiter = state
        .waiters
        .iter()
        .position(|w| w.config_key == config_key)
        .and_then(|pos| state.waiters.remove(pos));
    if let Some(waiter) = waiter {
        instance.state = InstanceState::InUse;
        instance.leased = true;
        state.instances.insert(instance_id.clone(), instance);
        let _ = waiter.tx.send(Ok(Grant {
            instance_id: instance_id.clone(),
            engine,
        }));
    } else {
        instance.state = InstanceState::Idle;
        state.instances.insert(instance_id.clone(), instance);
        state.idle.push_back(instance_id.clone());
    }
    state.counters.launched += 1;
    drop(state);

    shared.bus.publish(
        Event::new(topics::BROWSER_LAUNCHED, Protocol::Internal).with_fields(serde_json::json!({
            "instance_id": instance_id,
            "config_key": config_key,
        })),
    );
    Ok(instance_id)
}

async fn release_instance(shared: &Arc<Shared>, instance_id: &str) {
    let mut to_close: Vec<PooledInstance> = Vec::new();
    {
        let mut state = shared.state.lock().await;
        let (instance_state, config_key, engine) = {
            let Some(instance) = state.instances.get_mut(instance_id) else {
                return;
            };
            instance.leased = false;
            (
                instance.state,
                instance.config_key.clone(),
                instance.engine.clone(),
            )
        };

        match instance_state {
            InstanceState::InUse => {
                let waiter = state
                    .waiters
                    .iter()
                    .position(|w| w.config_key == config_key)
                    .and_then(|pos| state.waiters.remove(pos));
                if let Some(waiter) = waiter {
                    // FIFO handoff: the instance never goes idle.
                    if let Some(instance) = state.instances.get_mut(instance_id) {
                        instance.leased = true;
                    }
                    let _ = waiter.tx.send(Ok(Grant {
                        instance_id: instance_id.to_string(),
                        engine,
                    }));
                    debug!(instance_id, waiter_id = waiter.id, "lease handed to waiter");
                } else {
                    if let Some(instance) = state.instances.get_mut(instance_id) {
                        instance.state = InstanceState::Idle;
                    }
                    state.idle.push_back(instance_id.to_string());
                    trim_idle(&shared.config, &mut state, &mut to_close);
                }
            }
            InstanceState::Unhealthy => {
                // Drained: the lease finished, terminate now.
                state.idle.retain(|id| id != instance_id);
                if let Some(instance) = state.instances.remove(instance_id) {
                    to_close.push(instance);
                }
            }
            _ => {}
        }
    }

    for instance in to_close {
        terminate(shared, instance, "idle_trim_or_drain").await;
    }
}

fn trim_idle(config: &PoolConfig, state: &mut PoolState, to_close: &mut Vec<PooledInstance>) {
    if state.idle.len() <= config.target_idle + config.idle_grace {
        return;
    }
    while state.idle.len() > config.target_idle && state.live() > config.min_size {
        let Some(oldest) = state.idle.pop_front() else {
            break;
        };
        if let Some(instance) = state.instances.remove(&oldest) {
            state.counters.trimmed += 1;
            to_close.push(instance);
        }
    }
}

async fn terminate(shared: &Arc<Shared>, instance: PooledInstance, reason: &str) {
    debug!(instance_id = %instance.id, reason, "terminating browser instance");
    if let Err(e) = instance.engine.close().await {
        warn!(instance_id = %instance.id, error = %e, "error closing browser");
    }
    shared.bus.publish(
        Event::new(topics::BROWSER_TERMINATED, Protocol::Internal).with_fields(serde_json::json!({
            "instance_id": instance.id,
            "reason": reason,
        })),
    );
}

/// Crash/drain recovery: detach contexts, terminate, replace, notify.
async fn recover_instance(shared: &Arc<Shared>, instance_id: &str, reason: &str) {
    let (instance, contexts) = {
        let mut state = shared.state.lock().await;
        state.idle.retain(|id| id != instance_id);
        let Some(instance) = state.instances.remove(instance_id) else {
            return;
        };
        state.counters.crashed += 1;
        let contexts: Vec<String> = instance.assigned_contexts.iter().cloned().collect();
        (instance, contexts)
    };

    error!(instance_id, reason, detached_contexts = contexts.len(), "browser instance recovered");
    // Observers mark the detached contexts as recovering.
    shared.bus.publish(
        Event::new(topics::BROWSER_CRASHED, Protocol::Internal).with_fields(serde_json::json!({
            "instance_id": instance_id,
            "reason": reason,
            "context_ids": contexts,
        })),
    );

    let config_key = instance.config_key.clone();
    let options = instance.options.clone();
    if let Err(e) = instance.engine.close().await {
        debug!(instance_id, error = %e, "error closing crashed browser");
    }

    // Replace when below the minimum or when acquirers are waiting.
    let need_replacement = {
        let state = shared.state.lock().await;
        !state.shutting_down
            && (state.live() + state.launching < shared.config.min_size
                || !state.waiters.is_empty())
    };
    if need_replacement {
        {
            let mut state = shared.state.lock().await;
            state.launching += 1;
        }
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = launch_instance(&shared, &config_key, &options).await;
            let mut state = shared.state.lock().await;
            state.launching -= 1;
            drop(state);
            match result {
                Ok(new_id) => {
                    shared.bus.publish(
                        Event::new(topics::BROWSER_REPLACED, Protocol::Internal).with_fields(
                            serde_json::json!({ "instance_id": new_id, "config_key": config_key }),
                        ),
                    );
                }
                Err(e) => warn!(error = %e, "replacement launch failed"),
            }
        });
    }
}

async fn health_loop(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval(shared.config.health_check_interval);
    // The first tick fires immediately; skip it so tests observe a clean
    // interval cadence.
    ticker.tick().await;
    info!(
        interval_ms = shared.config.health_check_interval.as_millis() as u64,
        "pool health loop started"
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => scan(&shared).await,
            _ = shutdown_rx.changed() => {
                info!("pool health loop stopped");
                break;
            }
        }
    }
}

async fn scan(shared: &Arc<Shared>) {
    let probes: Vec<(String, Arc<dyn BrowserEngine>)> = {
        let state = shared.state.lock().await;
        state
            .instances
            .values()
            .filter(|i| matches!(i.state, InstanceState::Idle | InstanceState::InUse))
            .map(|i| (i.id.clone(), i.engine.clone()))
            .collect()
    };

    let mut went_unhealthy: Vec<String> = Vec::new();
    for (id, engine) in probes {
        let outcome = probe(&engine, shared.config.probe_timeout).await;
        let mut state = shared.state.lock().await;
        let Some(instance) = state.instances.get_mut(&id) else {
            continue;
        };
        let now: std::time::Instant = Instant::now().into();
        match outcome {
            ProbeOutcome::Ok => {
                instance.consecutive_failures = 0;
                instance.last_health = Some((now, true));
            }
            ProbeOutcome::SoftFail => {
                instance.consecutive_failures += 1;
                instance.last_health = Some((now, false));
                if instance.consecutive_failures >= shared.config.unhealthy_after_failures {
                    went_unhealthy.push(id);
                } else {
                    warn!(
                        instance_id = %instance.id,
                        failures = instance.consecutive_failures,
                        "health probe failure below threshold"
                    );
                }
            }
            ProbeOutcome::HardFail => {
                instance.last_health = Some((now, false));
                went_unhealthy.push(id);
            }
        }
    }

    for id in went_unhealthy {
        let leased = {
            let mut state = shared.state.lock().await;
            let Some(instance) = state.instances.get_mut(&id) else {
                continue;
            };
            if instance.leased {
                // Drain: the lease may finish within the drain deadline.
                instance.state = InstanceState::Unhealthy;
                instance.draining_since = Some(Instant::now().into());
                true
            } else {
                false
            }
        };
        shared.bus.publish(
            Event::new(topics::BROWSER_UNHEALTHY, Protocol::Internal)
                .with_fields(serde_json::json!({ "instance_id": id, "draining": leased })),
        );
        if !leased {
            recover_instance(shared, &id, "health_check_failed").await;
        }
    }

    // Force-terminate drains that overstayed their deadline.
    let overdue: Vec<String> = {
        let state = shared.state.lock().await;
        state
            .instances
            .values()
            .filter(|i| {
                i.state == InstanceState::Unhealthy
                    && i.draining_since
                        .is_some_and(|since| since.elapsed() > shared.config.drain_deadline)
            })
            .map(|i| i.id.clone())
            .collect()
    };
    for id in overdue {
        recover_instance(shared, &id, "drain_deadline_elapsed").await;
    }

    // Keep the floor.
    let deficit = {
        let state = shared.state.lock().await;
        if state.shutting_down {
            0
        } else {
            shared
                .config
                .min_size
                .saturating_sub(state.live() + state.launching)
        }
    };
    for _ in 0..deficit {
        {
            let mut state = shared.state.lock().await;
            state.launching += 1;
        }
        let shared = shared.clone();
        tokio::spawn(async move {
            let options = shared
                .config
                .profile("default")
                .map(|p| p.options.clone())
                .unwrap_or_default();
            let result = launch_instance(&shared, "default", &options).await;
            let mut state = shared.state.lock().await;
            state.launching -= 1;
            drop(state);
            if let Err(e) = result {
                warn!(error = %e, "pool floor maintenance launch failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_driver::{EngineKind, Launcher};

    fn sim_pool_config(min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            min_size: min,
            max_size: max,
            target_idle: max,
            idle_grace: 0,
            launch_backoff_base: Duration::from_millis(10),
            launch_backoff_cap: Duration::from_millis(50),
            shutdown_grace: Duration::from_millis(200),
            ..PoolConfig::default()
        }
    }

    async fn start_pool(config: PoolConfig) -> (Arc<BrowserPool>, Launcher, EventBus) {
        let launcher = Launcher::new(EngineKind::Sim);
        let bus = EventBus::new();
        let pool = BrowserPool::start(config, launcher.clone(), bus.clone()).await;
        (pool, launcher, bus)
    }

    #[tokio::test]
    async fn prewarm_reaches_min_size() {
        let (pool, launcher, _bus) = start_pool(sim_pool_config(2, 4)).await;
        let stats = pool.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.idle, 2);
        assert_eq!(launcher.fleet().launched(), 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn acquire_reuses_idle_then_launches() {
        let (pool, launcher, _bus) = start_pool(sim_pool_config(1, 3)).await;

        let a = pool.acquire("default", None).await.unwrap();
        assert_eq!(launcher.fleet().launched(), 1, "idle instance reused");

        let b = pool.acquire("default", None).await.unwrap();
        assert_eq!(launcher.fleet().launched(), 2, "second acquire launches");

        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 2);
        assert_eq!(stats.idle, 0);

        a.release().await;
        b.release().await;
        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 2);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_acquire_times_out_with_resource_exhausted() {
        let (pool, _launcher, _bus) = start_pool(sim_pool_config(1, 1)).await;

        let held = pool.acquire("default", None).await.unwrap();

        let started = Instant::now();
        let err = pool
            .acquire("default", Some(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), berth_types::ErrorKind::ResourceExhausted);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(500));
        assert!(waited < Duration::from_millis(700));

        held.release().await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn release_wakes_waiters_in_fifo_order() {
        let (pool, _launcher, _bus) = start_pool(sim_pool_config(1, 1)).await;
        let held = pool.acquire("default", None).await.unwrap();

        let pool1 = pool.clone();
        let first = tokio::spawn(async move {
            pool1
                .acquire("default", Some(Duration::from_secs(5)))
                .await
                .map(|lease| (Instant::now(), lease))
        });
        // Ensure deterministic arrival order.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let pool2 = pool.clone();
        let second = tokio::spawn(async move {
            pool2
                .acquire("default", Some(Duration::from_secs(5)))
                .await
                .map(|lease| (Instant::now(), lease))
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        held.release().await;
        let (t1, lease1) = first.await.unwrap().unwrap();
        lease1.release().await;
        let (t2, lease2) = second.await.unwrap().unwrap();
        assert!(t1 <= t2, "first waiter must be served first");
        lease2.release().await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn idle_trim_keeps_target() {
        let mut config = sim_pool_config(1, 4);
        config.target_idle = 1;
        config.idle_grace = 0;
        let (pool, _launcher, _bus) = start_pool(config).await;

        let a = pool.acquire("default", None).await.unwrap();
        let b = pool.acquire("default", None).await.unwrap();
        let c = pool.acquire("default", None).await.unwrap();
        a.release().await;
        b.release().await;
        c.release().await;

        let stats = pool.stats().await;
        assert_eq!(stats.idle, 1, "trimmed down to target_idle");
        assert!(stats.total >= 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn crash_recovery_detaches_contexts_and_replaces() {
        let (pool, _launcher, bus) = start_pool(sim_pool_config(1, 2)).await;
        let mut sub = bus.subscribe(vec!["browser.crashed".to_string()]);

        let lease = pool.acquire("default", None).await.unwrap();
        let instance_id = lease.instance_id().to_string();
        pool.assign_context(&instance_id, "ctx_1").await;

        pool.report_crash(&instance_id, "test kill").await;

        let event = sub.next().await.unwrap();
        assert_eq!(event.topic, "browser.crashed");
        let contexts: Vec<String> =
            serde_json::from_value(event.fields["context_ids"].clone()).unwrap();
        assert_eq!(contexts, vec!["ctx_1".to_string()]);

        // Replacement keeps the pool at the minimum.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = pool.stats().await;
        assert!(stats.total >= stats.min_size);

        drop(lease);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn launch_failures_exhaust_retries() {
        let mut config = sim_pool_config(0, 2);
        config.launch_retries = 1;
        let launcher = Launcher::new(EngineKind::Sim);
        let bus = EventBus::new();
        let pool = BrowserPool::start(config, launcher.clone(), bus).await;

        launcher.fleet().fail_next_launches(2);
        let err = pool.acquire("default", None).await.unwrap_err();
        assert_eq!(err.kind(), berth_types::ErrorKind::Internal);

        // Next acquire succeeds once launches recover.
        let lease = pool.acquire("default", None).await.unwrap();
        lease.release().await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_profile_is_invalid_argument() {
        let (pool, _launcher, _bus) = start_pool(sim_pool_config(0, 1)).await;
        let err = pool.acquire("mobile", None).await.unwrap_err();
        assert_eq!(err.kind(), berth_types::ErrorKind::InvalidArgument);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_waiters() {
        let (pool, _launcher, _bus) = start_pool(sim_pool_config(1, 1)).await;
        let held = pool.acquire("default", None).await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move {
            pool2.acquire("default", Some(Duration::from_secs(30))).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.shutdown().await;
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), berth_types::ErrorKind::Canceled);
        drop(held);
    }
}
