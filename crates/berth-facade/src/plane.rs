//! Service wiring and the stable operation set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use berth_driver::{EngineKind, Launcher};
use berth_events::{topics, EventBus, EventBusConfig, Subscription};
use berth_executor::{
    Action, ActionExecutor, ActionRecord, ActionResult, BatchOptions, ContextMetrics, ExecRequest,
    ExecutorConfig,
};
use berth_pool::{BrowserPool, PoolConfig};
use berth_proxy::{ProxyManager, ProxyManagerConfig};
use berth_registry::{
    CascadeOutcome, Context, InMemoryStore, Page, RegistryConfig, Session, SessionFilter,
    SessionRegistry,
};
use berth_types::{ContextOptions, Principal, Protocol, Result};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::health::{rollup, HealthStatus};

#[derive(Debug, Clone, Default)]
pub struct PlaneConfig {
    pub engine: EngineConfig,
    pub events: EventBusConfig,
    pub registry: RegistryConfig,
    pub pool: PoolConfig,
    pub proxy: ProxyManagerConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub kind: EngineKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Cdp,
        }
    }
}

/// The core service. Everything adapters can do goes through here.
pub struct BrowserPlane {
    bus: EventBus,
    registry: Arc<SessionRegistry>,
    pool: Arc<BrowserPool>,
    proxy: Arc<ProxyManager>,
    executor: Arc<ActionExecutor>,
    launcher: Launcher,
    shutdown_tx: watch::Sender<bool>,
    started_at: Instant,
    tasks: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl BrowserPlane {
    pub async fn start(config: PlaneConfig) -> Arc<Self> {
        let bus = EventBus::with_config(config.events.clone());
        let launcher = Launcher::new(config.engine.kind);
        let pool = BrowserPool::start(config.pool.clone(), launcher.clone(), bus.clone()).await;
        let registry = SessionRegistry::new(
            config.registry.clone(),
            Arc::new(InMemoryStore::new()),
            bus.clone(),
        );
        let proxy = ProxyManager::new(config.proxy.clone(), bus.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let executor = ActionExecutor::new(
            config.executor.clone(),
            registry.clone(),
            pool.clone(),
            proxy.clone(),
            bus.clone(),
            shutdown_rx.clone(),
        );

        let plane = Arc::new(Self {
            bus: bus.clone(),
            registry: registry.clone(),
            pool,
            proxy: proxy.clone(),
            executor: executor.clone(),
            launcher,
            shutdown_tx,
            started_at: Instant::now(),
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        let mut tasks = Vec::new();

        // Expiry sweeps release the browser and proxy resources the dead
        // sessions were holding.
        {
            let executor = executor.clone();
            tasks.push(registry.spawn_sweeper(shutdown_rx.clone(), move |outcomes| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    release_cascades(&executor, outcomes).await;
                });
            }));
        }

        if !config.proxy.endpoints.is_empty() {
            tasks.push(proxy.spawn_prober(shutdown_rx.clone()));
        }

        // Pool-initiated recoveries (health loop, drain timeouts) come in as
        // events; contexts detached there need their registry state flipped
        // and their dead leases discarded.
        {
            let registry = registry.clone();
            let executor = executor.clone();
            let mut subscription = bus.subscribe(vec![topics::BROWSER_CRASHED.to_string()]);
            let mut shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = subscription.next() => {
                            let Some(event) = event else { break };
                            let context_ids: Vec<String> = event
                                .fields
                                .get("context_ids")
                                .and_then(|v| serde_json::from_value(v.clone()).ok())
                                .unwrap_or_default();
                            if context_ids.is_empty() {
                                continue;
                            }
                            executor.invalidate_bindings(&context_ids).await;
                            registry.mark_recovering(&context_ids).await;
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }));
        }

        *plane.tasks.lock().unwrap() = tasks;
        info!("browser plane started");
        plane
    }

    /// Test and tooling access to the engine launcher (sim fleet control).
    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self, patterns: Vec<String>) -> Subscription {
        self.bus.subscribe(patterns)
    }

    // Session operations

    pub async fn create_session(
        &self,
        principal: &Principal,
        ttl: Option<Duration>,
        metadata: HashMap<String, serde_json::Value>,
        origin: Protocol,
    ) -> Result<Session> {
        self.registry
            .create_session(principal, ttl, metadata, origin)
            .await
    }

    pub async fn get_session(&self, principal: &Principal, id: &str) -> Result<Session> {
        self.registry.get_session(principal, id).await
    }

    pub async fn list_sessions(
        &self,
        principal: &Principal,
        filter: &SessionFilter,
    ) -> Result<Vec<Session>> {
        self.registry.list_sessions(principal, filter).await
    }

    pub async fn update_session_metadata(
        &self,
        principal: &Principal,
        id: &str,
        patch: HashMap<String, serde_json::Value>,
        origin: Protocol,
    ) -> Result<Session> {
        self.registry
            .update_metadata(principal, id, patch, origin)
            .await
    }

    pub async fn extend_session(
        &self,
        principal: &Principal,
        id: &str,
        additional: Duration,
        origin: Protocol,
    ) -> Result<Session> {
        self.registry
            .extend_session(principal, id, additional, origin)
            .await
    }

    pub async fn touch_session(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<Session> {
        self.registry.touch_session(principal, id, origin).await
    }

    pub async fn delete_session(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<()> {
        let outcome = self.registry.delete_session(principal, id, origin).await?;
        release_cascades(&self.executor, vec![outcome]).await;
        Ok(())
    }

    // Context operations

    /// Create a context and bind it to a browser instance immediately,
    /// routing through an assigned proxy endpoint when the policy asks.
    pub async fn create_context(
        &self,
        principal: &Principal,
        session_id: &str,
        options: ContextOptions,
        origin: Protocol,
    ) -> Result<Context> {
        let context = self
            .registry
            .create_context(principal, session_id, options.clone(), origin)
            .await?;

        let lease = async {
            if options.proxy.enabled {
                let route = self
                    .proxy
                    .configure_context(&context.id, options.proxy.clone())
                    .await?;
                match route {
                    Some(route) => {
                        self.pool
                            .acquire_proxied(
                                &options.config_key,
                                &route.endpoint_id,
                                &route.server_url,
                                None,
                            )
                            .await
                    }
                    None => self.pool.acquire(&options.config_key, None).await,
                }
            } else {
                self.pool.acquire(&options.config_key, None).await
            }
        }
        .await;

        let lease = match lease {
            Ok(lease) => lease,
            Err(e) => {
                // Roll the registry entry back; a context that never bound
                // must not linger half-created.
                let _ = self
                    .registry
                    .close_context(principal, &context.id, origin)
                    .await;
                self.proxy.release_context(&context.id);
                return Err(e);
            }
        };

        self.executor.attach_context(&context, lease).await?;
        self.registry.get_context(principal, &context.id).await
    }

    pub async fn get_context(&self, principal: &Principal, id: &str) -> Result<Context> {
        self.registry.get_context(principal, id).await
    }

    pub async fn list_contexts(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> Result<Vec<Context>> {
        self.registry.list_contexts(principal, session_id).await
    }

    pub async fn close_context(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<()> {
        self.registry.close_context(principal, id, origin).await?;
        self.executor.detach_context(id).await;
        self.proxy.release_context(id);
        Ok(())
    }

    // Page operations

    pub async fn create_page(
        &self,
        principal: &Principal,
        context_id: &str,
        origin: Protocol,
    ) -> Result<Page> {
        self.executor.create_page(principal, context_id, origin).await
    }

    pub async fn get_page(&self, principal: &Principal, id: &str) -> Result<Page> {
        self.registry.get_page(principal, id).await
    }

    pub async fn close_page(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<()> {
        self.executor.close_page(principal, id, origin).await
    }

    // Execution

    pub async fn execute(&self, req: ExecRequest, action: Action) -> ActionResult {
        self.executor.execute(req, action).await
    }

    pub async fn execute_batch(
        &self,
        req: ExecRequest,
        items: Vec<(Option<String>, Action)>,
        options: BatchOptions,
    ) -> Result<Vec<ActionResult>> {
        self.executor.execute_batch(req, items, options).await
    }

    pub async fn history(
        &self,
        principal: &Principal,
        context_id: &str,
        limit: usize,
    ) -> Result<Vec<ActionRecord>> {
        self.executor.history(principal, context_id, limit).await
    }

    pub async fn metrics(&self, principal: &Principal, context_id: &str) -> Result<ContextMetrics> {
        self.executor.metrics(principal, context_id).await
    }

    // Observability

    pub async fn health(&self) -> HealthStatus {
        let pool = self.pool.stats().await;
        let proxy = self.proxy.stats().await;
        let sessions = self
            .registry
            .list_sessions(
                &Principal::new("health", "health").with_roles(vec!["admin".to_string()]),
                &SessionFilter::default(),
            )
            .await
            .map(|s| s.len())
            .unwrap_or(0);
        let (components, overall) = rollup(&pool, &proxy);
        HealthStatus {
            overall,
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            components,
            pool,
            proxy,
            events: self.bus.stats(),
            sessions,
        }
    }

    pub fn catalog(&self) -> serde_json::Value {
        crate::catalog()
    }

    /// Graceful shutdown: cancel in-flight actions, release every context,
    /// drain the pool, stop background loops.
    pub async fn shutdown(&self) {
        info!("browser plane shutting down");
        if self.shutdown_tx.send(true).is_err() {
            debug!("shutdown signal had no receivers");
        }
        self.executor.shutdown().await;
        self.pool.shutdown().await;
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("browser plane shutdown complete");
    }
}

async fn release_cascades(executor: &Arc<ActionExecutor>, outcomes: Vec<CascadeOutcome>) {
    for outcome in outcomes {
        for context in &outcome.contexts {
            executor.detach_context(&context.id).await;
        }
        if !outcome.contexts.is_empty() {
            warn!(
                session_id = %outcome.session_id,
                contexts = outcome.contexts.len(),
                "released resources for removed session"
            );
        }
    }
}

impl From<EngineKind> for EngineConfig {
    fn from(kind: EngineKind) -> Self {
        Self { kind }
    }
}
