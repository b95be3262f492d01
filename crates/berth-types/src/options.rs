//! Context configuration snapshots.
//!
//! A context's options are fixed at creation time; changing the viewport at
//! runtime goes through the `setViewport` action, which updates the live page
//! but never this snapshot.

use serde::{Deserialize, Serialize};

use crate::limits::{DEVICE_SCALE_RANGE, VIEWPORT_HEIGHT_RANGE, VIEWPORT_WIDTH_RANGE};
use crate::{Error, Result};

/// Viewport dimensions and device emulation flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale")]
    pub device_scale_factor: f64,
    #[serde(default)]
    pub has_touch: bool,
    #[serde(default)]
    pub is_mobile: bool,
    #[serde(default)]
    pub is_landscape: bool,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            device_scale_factor: 1.0,
            has_touch: false,
            is_mobile: false,
            is_landscape: false,
        }
    }
}

impl Viewport {
    /// Enforce the documented integer bounds.
    pub fn validate(&self) -> Result<()> {
        let (w_min, w_max) = VIEWPORT_WIDTH_RANGE;
        if self.width < w_min || self.width > w_max {
            return Err(Error::invalid_argument(format!(
                "viewport width {} outside [{}, {}]",
                self.width, w_min, w_max
            )));
        }
        let (h_min, h_max) = VIEWPORT_HEIGHT_RANGE;
        if self.height < h_min || self.height > h_max {
            return Err(Error::invalid_argument(format!(
                "viewport height {} outside [{}, {}]",
                self.height, h_min, h_max
            )));
        }
        let (s_min, s_max) = DEVICE_SCALE_RANGE;
        if self.device_scale_factor < s_min || self.device_scale_factor > s_max {
            return Err(Error::invalid_argument(format!(
                "deviceScaleFactor {} outside [{}, {}]",
                self.device_scale_factor, s_min, s_max
            )));
        }
        Ok(())
    }

    /// Normalized copy: scale clamped to one decimal of precision, landscape
    /// derived from dimensions when not set explicitly.
    pub fn normalize(mut self) -> Self {
        self.device_scale_factor = (self.device_scale_factor * 10.0).round() / 10.0;
        if self.width > self.height {
            self.is_landscape = true;
        }
        self
    }
}

/// Per-context proxy policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyPolicy {
    /// Disabled means no proxy, ever, for this context.
    pub enabled: bool,
    /// Restrict endpoint selection to endpoints carrying all of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Seconds between sticky-assignment rotations. Zero disables the timer.
    #[serde(default = "default_rotation_secs")]
    pub rotation_interval_secs: u64,
    /// Rotate immediately when the assigned endpoint reports a failure.
    #[serde(default)]
    pub rotate_on_error: bool,
}

fn default_rotation_secs() -> u64 {
    600
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            tags: Vec::new(),
            rotation_interval_secs: default_rotation_secs(),
            rotate_on_error: false,
        }
    }
}

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Immutable configuration snapshot taken when a context is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub proxy: ProxyPolicy,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub incognito: bool,
    /// Default action timeout for this context, milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Launch-profile key used when binding a browser instance.
    #[serde(default = "default_config_key")]
    pub config_key: String,
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    crate::limits::DEFAULT_ACTION_TIMEOUT_MS
}

fn default_config_key() -> String {
    "default".to_string()
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            user_agent: None,
            proxy: ProxyPolicy::default(),
            headless: true,
            incognito: false,
            default_timeout_ms: default_timeout_ms(),
            config_key: default_config_key(),
        }
    }
}

impl ContextOptions {
    pub fn validate(&self) -> Result<()> {
        self.viewport.validate()?;
        if self.default_timeout_ms == 0 {
            return Err(Error::invalid_argument("defaultTimeoutMs must be positive"));
        }
        if self.config_key.is_empty() {
            return Err(Error::invalid_argument("configKey must not be empty"));
        }
        Ok(())
    }
}
