//! Parameter and result types for page operations.

use berth_types::SameSite;
use serde::{Deserialize, Serialize};

/// When a navigation is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitUntil {
    #[default]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle0")]
    NetworkIdle0,
    #[serde(rename = "networkidle2")]
    NetworkIdle2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateParams {
    pub wait_until: WaitUntil,
    pub timeout_ms: u64,
    pub referer: Option<String>,
}

impl Default for NavigateParams {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::Load,
            timeout_ms: 30_000,
            referer: None,
        }
    }
}

/// What the engine reports after a navigation settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationOutcome {
    pub final_url: String,
    /// Engines that do not surface response codes report `None`.
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickParams {
    pub button: MouseButton,
    pub click_count: u32,
    /// Delay between press and release, milliseconds.
    pub delay_ms: u64,
}

impl Default for ClickParams {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl ScreenshotFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpeg => "jpeg",
        }
    }
}

/// Capture clip rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenshotParams {
    /// Capture a single element instead of the viewport.
    pub selector: Option<String>,
    pub full_page: bool,
    pub format: ScreenshotFormat,
    /// JPEG quality, 0-100. Ignored for PNG.
    pub quality: Option<u8>,
    pub clip: Option<ClipRect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfParams {
    pub landscape: bool,
    pub print_background: bool,
    pub scale: Option<f64>,
    pub paper_width: Option<f64>,
    pub paper_height: Option<f64>,
    pub page_ranges: Option<String>,
}

impl Default for PdfParams {
    fn default() -> Self {
        Self {
            landscape: false,
            print_background: true,
            scale: None,
            paper_width: None,
            paper_height: None,
            page_ranges: None,
        }
    }
}

/// A cookie as seen at the driver boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieParam {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Unix seconds; `None` means session cookie.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: Option<SameSite>,
}

impl CookieParam {
    pub fn new<S: Into<String>>(name: S, value: S) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_wire_names() {
        assert_eq!(
            serde_json::to_string(&WaitUntil::DomContentLoaded).unwrap(),
            "\"domcontentloaded\""
        );
        assert_eq!(
            serde_json::to_string(&WaitUntil::NetworkIdle0).unwrap(),
            "\"networkidle0\""
        );
        let w: WaitUntil = serde_json::from_str("\"load\"").unwrap();
        assert_eq!(w, WaitUntil::Load);
    }

    #[test]
    fn click_defaults() {
        let p = ClickParams::default();
        assert_eq!(p.button, MouseButton::Left);
        assert_eq!(p.click_count, 1);
    }
}
