//! Proxy endpoint configuration and health state.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::bypass::BypassMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Hosts reached directly even when this endpoint is assigned.
    #[serde(default)]
    pub bypass: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Higher wins under the `priority` strategy.
    #[serde(default)]
    pub priority: i32,
}

impl EndpointConfig {
    /// The value handed to engines and HTTP clients,
    /// e.g. `http://squid.internal:3128`.
    pub fn server_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// Runtime state for one endpoint.
pub(crate) struct EndpointState {
    pub id: String,
    pub config: EndpointConfig,
    pub bypass: BypassMatcher,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub last_error: Option<String>,
    pub last_success: Option<Instant>,
    pub latency_ewma_ms: Option<f64>,
}

impl EndpointState {
    pub fn new(config: EndpointConfig) -> Self {
        let bypass = BypassMatcher::compile(&config.bypass);
        Self {
            id: berth_types::endpoint_id(),
            config,
            bypass,
            healthy: true,
            consecutive_failures: 0,
            total_failures: 0,
            total_successes: 0,
            last_error: None,
            last_success: None,
            latency_ewma_ms: None,
        }
    }

    pub fn record_success(&mut self, latency_ms: Option<f64>) {
        self.consecutive_failures = 0;
        self.total_successes += 1;
        self.last_success = Some(Instant::now());
        if let Some(sample) = latency_ms {
            self.latency_ewma_ms = Some(match self.latency_ewma_ms {
                Some(ewma) => ewma * 0.8 + sample * 0.2,
                None => sample,
            });
        }
    }

    pub fn record_failure(&mut self, error: &str) {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_error = Some(error.to_string());
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            id: self.id.clone(),
            server_url: self.config.server_url(),
            tags: self.config.tags.clone(),
            priority: self.config.priority,
            healthy: self.healthy,
            consecutive_failures: self.consecutive_failures,
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            latency_ewma_ms: self.latency_ewma_ms,
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSnapshot {
    pub id: String,
    pub server_url: String,
    pub tags: Vec<String>,
    pub priority: i32,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub latency_ewma_ms: Option<f64>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EndpointConfig {
        EndpointConfig {
            scheme: ProxyScheme::Http,
            host: "proxy.example".to_string(),
            port: 3128,
            username: None,
            password: None,
            bypass: vec![],
            tags: vec![],
            priority: 0,
        }
    }

    #[test]
    fn server_url_format() {
        assert_eq!(config().server_url(), "http://proxy.example:3128");
    }

    #[test]
    fn ewma_tracks_latency() {
        let mut state = EndpointState::new(config());
        state.record_success(Some(100.0));
        assert_eq!(state.latency_ewma_ms, Some(100.0));
        state.record_success(Some(200.0));
        let ewma = state.latency_ewma_ms.unwrap();
        assert!(ewma > 100.0 && ewma < 200.0);
    }

    #[test]
    fn failure_counters() {
        let mut state = EndpointState::new(config());
        state.record_failure("refused");
        state.record_failure("refused");
        assert_eq!(state.consecutive_failures, 2);
        state.record_success(None);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_failures, 2);
    }
}
