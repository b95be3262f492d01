//! The engine capability contract consumed by the execution plane.

use async_trait::async_trait;
use berth_types::Viewport;
use serde::{Deserialize, Serialize};

use crate::error::DriverResult;
use crate::params::{
    ClickParams, CookieParam, NavigateParams, NavigationOutcome, PdfParams, ScreenshotParams,
};

/// Browser history as reported by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryInfo {
    pub length: usize,
    /// Index of the current entry, 0-based.
    pub current: usize,
}

impl HistoryInfo {
    pub fn can_go_back(&self) -> bool {
        self.current > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.current + 1 < self.length
    }
}

/// A running browser process (or its in-memory stand-in).
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a new blank page.
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>>;

    /// Cheap liveness probe; `false` means the process or connection is gone.
    async fn is_connected(&self) -> bool;

    async fn version(&self) -> DriverResult<String>;

    /// Terminate the browser and release its resources.
    async fn close(&self) -> DriverResult<()>;
}

/// One browsing surface inside an engine.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str, params: NavigateParams) -> DriverResult<NavigationOutcome>;

    async fn reload(&self, timeout_ms: u64) -> DriverResult<NavigationOutcome>;

    async fn history(&self) -> DriverResult<HistoryInfo>;

    async fn go_back(&self, timeout_ms: u64) -> DriverResult<NavigationOutcome>;

    async fn go_forward(&self, timeout_ms: u64) -> DriverResult<NavigationOutcome>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn content(&self) -> DriverResult<String>;

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value>;

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> DriverResult<()>;

    async fn wait_for_function(&self, expression: &str, timeout_ms: u64) -> DriverResult<()>;

    async fn click(&self, selector: &str, params: ClickParams) -> DriverResult<()>;

    async fn type_text(&self, selector: &str, text: &str, delay_ms: u64) -> DriverResult<()>;

    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<Vec<String>>;

    async fn hover(&self, selector: &str) -> DriverResult<()>;

    async fn focus(&self, selector: &str) -> DriverResult<()>;

    async fn blur(&self, selector: &str) -> DriverResult<()>;

    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()>;

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()>;

    async fn viewport(&self) -> DriverResult<Viewport>;

    async fn set_user_agent(&self, user_agent: &str) -> DriverResult<()>;

    async fn set_cookies(&self, cookies: Vec<CookieParam>) -> DriverResult<()>;

    async fn cookies(&self) -> DriverResult<Vec<CookieParam>>;

    async fn delete_cookie(&self, name: &str, domain: Option<&str>) -> DriverResult<()>;

    async fn clear_cookies(&self) -> DriverResult<()>;

    async fn screenshot(&self, params: ScreenshotParams) -> DriverResult<Vec<u8>>;

    async fn pdf(&self, params: PdfParams) -> DriverResult<Vec<u8>>;

    /// Attach a local file to an `<input type="file">` element.
    async fn upload_file(&self, selector: &str, path: &str) -> DriverResult<()>;

    async fn close(&self) -> DriverResult<()>;
}
