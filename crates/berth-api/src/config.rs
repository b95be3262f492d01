//! Optional JSON config file, merged over built-in defaults.

use std::path::Path;

use berth_driver::EngineKind;
use berth_facade::PlaneConfig;
use berth_proxy::{EndpointConfig, SelectionStrategy};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub engine: Option<EngineKind>,
    pub pool: Option<PoolSection>,
    pub proxy: Option<ProxySection>,
    pub allow_private_networks: Option<bool>,
    pub upload_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSection {
    pub min_size: Option<usize>,
    pub max_size: Option<usize>,
    pub target_idle: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySection {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    pub strategy: Option<SelectionStrategy>,
    pub failover_threshold: Option<u32>,
    pub probe_url: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        info!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    pub fn apply(self, mut base: PlaneConfig) -> PlaneConfig {
        if let Some(engine) = self.engine {
            base.engine = engine.into();
        }
        if let Some(pool) = self.pool {
            if let Some(min) = pool.min_size {
                base.pool.min_size = min;
            }
            if let Some(max) = pool.max_size {
                base.pool.max_size = max;
            }
            if let Some(target) = pool.target_idle {
                base.pool.target_idle = target;
            }
        }
        if let Some(proxy) = self.proxy {
            base.proxy.endpoints = proxy.endpoints;
            if let Some(strategy) = proxy.strategy {
                base.proxy.strategy = strategy;
            }
            if let Some(threshold) = proxy.failover_threshold {
                base.proxy.failover_threshold = threshold;
            }
            if let Some(url) = proxy.probe_url {
                base.proxy.probe_url = url;
            }
        }
        if let Some(allow) = self.allow_private_networks {
            base.executor.url_guard.allow_private_networks = allow;
        }
        if let Some(prefix) = self.upload_prefix {
            base.executor.upload_prefix = Some(prefix.into());
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_merge_over_defaults() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "engine": "sim",
                "pool": { "minSize": 2, "maxSize": 6 },
                "allowPrivateNetworks": true,
                "uploadPrefix": "/srv/uploads"
            }"#,
        )
        .unwrap();
        let config = file.apply(PlaneConfig::default());
        assert_eq!(config.engine.kind, EngineKind::Sim);
        assert_eq!(config.pool.min_size, 2);
        assert_eq!(config.pool.max_size, 6);
        assert!(config.executor.url_guard.allow_private_networks);
        assert_eq!(
            config.executor.upload_prefix.as_deref(),
            Some(std::path::Path::new("/srv/uploads"))
        );
    }
}
