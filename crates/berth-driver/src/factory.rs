//! Engine selection and launching.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DriverResult;
use crate::sim::SimFleet;
use crate::traits::BrowserEngine;

/// Which engine backs launched instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Real Chrome over CDP.
    Cdp,
    /// Deterministic in-memory engine.
    Sim,
}

/// Per-launch configuration; one of these exists per pool launch profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Chrome `--proxy-server` value, e.g. `http://10.0.0.1:3128`.
    pub proxy_server: Option<String>,
    /// Base directory for per-instance profile dirs; system temp when unset.
    pub profile_base_dir: Option<std::path::PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            proxy_server: None,
            profile_base_dir: None,
            extra_args: Vec::new(),
        }
    }
}

/// Launches engines of one kind. Cheap to clone; the sim fleet handle is
/// shared across clones so tests can reach every launched instance.
#[derive(Clone)]
pub struct Launcher {
    kind: EngineKind,
    fleet: SimFleet,
}

impl Launcher {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            fleet: SimFleet::new(),
        }
    }

    /// Sim launcher sharing an existing fleet handle.
    pub fn sim(fleet: SimFleet) -> Self {
        Self {
            kind: EngineKind::Sim,
            fleet,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn fleet(&self) -> &SimFleet {
        &self.fleet
    }

    pub async fn launch(&self, options: &LaunchOptions) -> DriverResult<Arc<dyn BrowserEngine>> {
        match self.kind {
            EngineKind::Sim => {
                let engine = self.fleet.launch()?;
                info!(engine_id = %engine.id(), "sim engine launched");
                Ok(engine as Arc<dyn BrowserEngine>)
            }
            #[cfg(feature = "cdp")]
            EngineKind::Cdp => {
                let engine = crate::cdp::CdpEngine::launch(options).await?;
                info!(engine_id = %engine.id(), headless = options.headless, "chrome launched");
                Ok(Arc::new(engine))
            }
            #[cfg(not(feature = "cdp"))]
            EngineKind::Cdp => Err(crate::error::DriverError::NotSupported(
                "built without the cdp feature".into(),
            )),
        }
    }
}
