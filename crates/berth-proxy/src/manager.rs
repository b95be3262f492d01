//! Endpoint selection, context assignment, health tracking, probing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use berth_events::{topics, Event, EventBus};
use berth_types::{Error, Protocol, ProxyPolicy, Result};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointConfig, EndpointSnapshot, EndpointState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    #[default]
    RoundRobin,
    /// Highest priority healthy endpoint.
    Priority,
    LeastFailures,
    Random,
}

impl SelectionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionStrategy::RoundRobin => "round-robin",
            SelectionStrategy::Priority => "priority",
            SelectionStrategy::LeastFailures => "least-failures",
            SelectionStrategy::Random => "random",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyManagerConfig {
    pub endpoints: Vec<EndpointConfig>,
    pub strategy: SelectionStrategy,
    /// Consecutive failures before an endpoint is marked unhealthy.
    pub failover_threshold: u32,
    pub probe_interval: Duration,
    /// Known-good URL fetched through each endpoint by the prober.
    pub probe_url: String,
    pub probe_timeout: Duration,
}

impl Default for ProxyManagerConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            strategy: SelectionStrategy::RoundRobin,
            failover_threshold: 3,
            probe_interval: Duration::from_secs(60),
            probe_url: "https://www.gstatic.com/generate_204".to_string(),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

/// What a caller needs to route traffic through an assigned endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRoute {
    pub endpoint_id: String,
    pub server_url: String,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

struct Assignment {
    endpoint_id: String,
    policy: ProxyPolicy,
    errors_since_assignment: u32,
    rotate_after: Option<Instant>,
}

pub struct ProxyManager {
    strategy: SelectionStrategy,
    failover_threshold: u32,
    probe_interval: Duration,
    probe_url: String,
    probe_timeout: Duration,
    bus: EventBus,
    endpoints: RwLock<Vec<EndpointState>>,
    assignments: DashMap<String, Assignment>,
    rr_cursor: AtomicUsize,
}

impl ProxyManager {
    pub fn new(config: ProxyManagerConfig, bus: EventBus) -> Arc<Self> {
        let endpoints = config
            .endpoints
            .into_iter()
            .map(EndpointState::new)
            .collect::<Vec<_>>();
        info!(
            endpoints = endpoints.len(),
            strategy = config.strategy.as_str(),
            "proxy manager initialized"
        );
        Arc::new(Self {
            strategy: config.strategy,
            failover_threshold: config.failover_threshold,
            probe_interval: config.probe_interval,
            probe_url: config.probe_url,
            probe_timeout: config.probe_timeout,
            bus,
            endpoints: RwLock::new(endpoints),
            assignments: DashMap::new(),
            rr_cursor: AtomicUsize::new(0),
        })
    }

    /// Apply a context's proxy policy. Disabled means no proxy, ever, for
    /// this context; any existing assignment is retired.
    pub async fn configure_context(
        &self,
        context_id: &str,
        policy: ProxyPolicy,
    ) -> Result<Option<ProxyRoute>> {
        if !policy.enabled {
            self.assignments.remove(context_id);
            return Ok(None);
        }

        let endpoints = self.endpoints.read().await;
        let chosen = self
            .select(&endpoints, &policy.tags, None)
            .ok_or_else(|| Error::proxy_failure("no healthy proxy endpoint matches policy"))?;
        let route = route_for(&endpoints[chosen]);
        let endpoint_id = endpoints[chosen].id.clone();
        drop(endpoints);

        self.assignments.insert(
            context_id.to_string(),
            Assignment {
                endpoint_id: endpoint_id.clone(),
                rotate_after: rotation_deadline(&policy),
                errors_since_assignment: 0,
                policy,
            },
        );
        self.bus.publish(
            Event::new(topics::PROXY_ASSIGNED, Protocol::Internal).with_fields(serde_json::json!({
                "context_id": context_id,
                "endpoint_id": endpoint_id,
            })),
        );
        Ok(Some(route))
    }

    /// Drop a context's assignment (context closed).
    pub fn release_context(&self, context_id: &str) {
        self.assignments.remove(context_id);
    }

    /// The route for one URL, honoring stickiness, rotation triggers, and
    /// bypass patterns. `None` means connect directly.
    pub async fn proxy_for_url(&self, url: &str, context_id: &str) -> Result<Option<ProxyRoute>> {
        // Snapshot the assignment first; the map guard must not be held
        // across the endpoints lock.
        let (assigned_id, policy, rotate_after, errors) = {
            let Some(assignment) = self.assignments.get(context_id) else {
                return Ok(None);
            };
            if !assignment.policy.enabled {
                return Ok(None);
            }
            (
                assignment.endpoint_id.clone(),
                assignment.policy.clone(),
                assignment.rotate_after,
                assignment.errors_since_assignment,
            )
        };

        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()));

        let endpoints = self.endpoints.read().await;
        let current = endpoints.iter().position(|e| e.id == assigned_id);

        let current_unhealthy = current.is_none_or(|i| !endpoints[i].healthy);
        let timer_elapsed = rotate_after.is_some_and(|at| Instant::now() >= at);
        let error_trigger = policy.rotate_on_error && errors > 0;

        let effective_id = if current_unhealthy || timer_elapsed || error_trigger {
            let chosen = self
                .select(&endpoints, &policy.tags, current)
                .ok_or_else(|| Error::proxy_failure("no healthy proxy endpoint available"))?;
            let new_id = endpoints[chosen].id.clone();
            if let Some(mut assignment) = self.assignments.get_mut(context_id) {
                assignment.endpoint_id = new_id.clone();
                assignment.errors_since_assignment = 0;
                assignment.rotate_after = rotation_deadline(&assignment.policy);
            }
            debug!(context_id, from = %assigned_id, to = %new_id, "proxy assignment rotated");
            self.bus.publish(
                Event::new(topics::PROXY_ROTATED, Protocol::Internal).with_fields(
                    serde_json::json!({
                        "context_id": context_id,
                        "from": assigned_id,
                        "to": new_id,
                    }),
                ),
            );
            new_id
        } else {
            assigned_id
        };

        let endpoint = endpoints
            .iter()
            .find(|e| e.id == effective_id)
            .ok_or_else(|| Error::internal("assigned proxy endpoint vanished"))?;

        if let Some(host) = &host {
            if endpoint.bypass.matches_host(host) {
                return Ok(None);
            }
        }
        Ok(Some(route_for(endpoint)))
    }

    /// The context's current route, rotation triggers applied, without any
    /// per-URL bypass evaluation. Used when (re)binding a browser instance.
    pub async fn current_route(&self, context_id: &str) -> Result<Option<ProxyRoute>> {
        self.proxy_for_url("", context_id).await
    }

    pub async fn report_success(&self, endpoint_id: &str) {
        self.record_success(endpoint_id, None).await;
    }

    async fn record_success(&self, endpoint_id: &str, latency_ms: Option<f64>) {
        let mut endpoints = self.endpoints.write().await;
        let Some(endpoint) = endpoints.iter_mut().find(|e| e.id == endpoint_id) else {
            return;
        };
        let was_unhealthy = !endpoint.healthy;
        endpoint.record_success(latency_ms);
        endpoint.healthy = true;
        if was_unhealthy {
            info!(endpoint_id, "proxy endpoint re-admitted");
            self.bus.publish(
                Event::new(topics::PROXY_RECOVERED, Protocol::Internal)
                    .with_fields(serde_json::json!({ "endpoint_id": endpoint_id })),
            );
        }
    }

    pub async fn report_failure(&self, endpoint_id: &str, error: &str) {
        let crossed = {
            let mut endpoints = self.endpoints.write().await;
            let Some(endpoint) = endpoints.iter_mut().find(|e| e.id == endpoint_id) else {
                return;
            };
            endpoint.record_failure(error);
            let crossed =
                endpoint.healthy && endpoint.consecutive_failures >= self.failover_threshold;
            if crossed {
                endpoint.healthy = false;
            }
            crossed
        };

        // Error-triggered rotation is evaluated lazily on the next routing
        // query for each affected context.
        for mut assignment in self.assignments.iter_mut() {
            if assignment.endpoint_id == endpoint_id {
                assignment.errors_since_assignment += 1;
            }
        }

        if crossed {
            warn!(endpoint_id, error, "proxy endpoint marked unhealthy");
            self.bus.publish(
                Event::new(topics::PROXY_UNHEALTHY, Protocol::Internal).with_fields(
                    serde_json::json!({ "endpoint_id": endpoint_id, "error": error }),
                ),
            );
        }
    }

    pub async fn stats(&self) -> ProxyStats {
        let endpoints = self.endpoints.read().await;
        ProxyStats {
            strategy: self.strategy.as_str().to_string(),
            assignments: self.assignments.len(),
            endpoints: endpoints.iter().map(|e| e.snapshot()).collect(),
        }
    }

    fn select(
        &self,
        endpoints: &[EndpointState],
        tags: &[String],
        exclude: Option<usize>,
    ) -> Option<usize> {
        let candidates: Vec<usize> = endpoints
            .iter()
            .enumerate()
            .filter(|(i, e)| {
                e.healthy
                    && Some(*i) != exclude
                    && tags.iter().all(|t| e.config.tags.contains(t))
            })
            .map(|(i, _)| i)
            .collect();

        let candidates = if candidates.is_empty() {
            // Rotation with a single healthy endpoint keeps it.
            exclude
                .filter(|&i| {
                    endpoints[i].healthy && tags.iter().all(|t| endpoints[i].config.tags.contains(t))
                })
                .map(|i| vec![i])?
        } else {
            candidates
        };

        let pick = match self.strategy {
            SelectionStrategy::RoundRobin => {
                let cursor = self.rr_cursor.fetch_add(1, Ordering::Relaxed);
                candidates[cursor % candidates.len()]
            }
            SelectionStrategy::Priority => *candidates
                .iter()
                .max_by_key(|&&i| endpoints[i].config.priority)?,
            SelectionStrategy::LeastFailures => *candidates
                .iter()
                .min_by_key(|&&i| endpoints[i].total_failures)?,
            SelectionStrategy::Random => {
                candidates[rand::thread_rng().gen_range(0..candidates.len())]
            }
        };
        Some(pick)
    }

    /// Background prober: a known-good request through each endpoint.
    /// Success re-admits unhealthy endpoints; failure counts toward the
    /// failover threshold.
    pub fn spawn_prober(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(manager.probe_interval);
            ticker.tick().await;
            info!(
                interval_secs = manager.probe_interval.as_secs(),
                probe_url = %manager.probe_url,
                "proxy prober started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => manager.probe_all().await,
                    _ = shutdown_rx.changed() => {
                        info!("proxy prober stopped");
                        break;
                    }
                }
            }
        })
    }

    async fn probe_all(&self) {
        let targets: Vec<(String, String, Option<String>, Option<String>)> = {
            let endpoints = self.endpoints.read().await;
            endpoints
                .iter()
                .map(|e| {
                    (
                        e.id.clone(),
                        e.config.server_url(),
                        e.config.username.clone(),
                        e.config.password.clone(),
                    )
                })
                .collect()
        };

        for (id, server_url, username, password) in targets {
            let started = Instant::now();
            match self
                .probe_one(&server_url, username.as_deref(), password.as_deref())
                .await
            {
                Ok(()) => {
                    let latency = started.elapsed().as_secs_f64() * 1000.0;
                    self.record_success(&id, Some(latency)).await;
                }
                Err(e) => {
                    debug!(endpoint_id = %id, error = %e, "proxy probe failed");
                    self.report_failure(&id, &e).await;
                }
            }
        }
    }

    async fn probe_one(
        &self,
        server_url: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> std::result::Result<(), String> {
        let mut proxy = reqwest::Proxy::all(server_url).map_err(|e| e.to_string())?;
        if let (Some(user), Some(pass)) = (username, password) {
            proxy = proxy.basic_auth(user, pass);
        }
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.probe_timeout)
            .build()
            .map_err(|e| e.to_string())?;
        let response = client
            .get(&self.probe_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() || response.status().as_u16() == 204 {
            Ok(())
        } else {
            Err(format!("probe returned {}", response.status()))
        }
    }
}

fn rotation_deadline(policy: &ProxyPolicy) -> Option<Instant> {
    (policy.rotation_interval_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(policy.rotation_interval_secs))
}

fn route_for(endpoint: &EndpointState) -> ProxyRoute {
    ProxyRoute {
        endpoint_id: endpoint.id.clone(),
        server_url: endpoint.config.server_url(),
        username: endpoint.config.username.clone(),
        password: endpoint.config.password.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStats {
    pub strategy: String,
    pub assignments: usize,
    pub endpoints: Vec<EndpointSnapshot>,
}
