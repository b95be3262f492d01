//! Chrome engine over CDP via spider_chrome.
//!
//! Each engine owns one Chrome process with a unique profile directory.
//! Chrome enforces a SingletonLock per profile, so instances can never share
//! a user-data dir. The event handler task must be polled for the browser to
//! make progress; when that stream ends the connection is gone.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use spider_chrome::cdp::browser_protocol::dom::SetFileInputFilesParams;
use spider_chrome::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use spider_chrome::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam as CdpCookieParam, CookieSameSite, DeleteCookiesParams,
    TimeSinceEpoch,
};
use spider_chrome::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, GetNavigationHistoryParams, NavigateToHistoryEntryParams,
    PrintToPdfParams,
};
use spider_chrome::{Browser, BrowserConfig, Page};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use berth_types::{SameSite, Viewport};

use crate::error::{DriverError, DriverResult};
use crate::factory::LaunchOptions;
use crate::params::{
    ClickParams, CookieParam, NavigateParams, NavigationOutcome, PdfParams, ScreenshotFormat,
    ScreenshotParams, WaitUntil,
};
use crate::traits::{BrowserEngine, HistoryInfo, PageHandle};

pub struct CdpEngine {
    id: String,
    browser: Mutex<Browser>,
    connected: Arc<AtomicBool>,
    handler_task: tokio::task::JoinHandle<()>,
    // Keeps the profile directory alive for the browser's lifetime.
    _profile_dir: TempDir,
}

impl CdpEngine {
    pub async fn launch(options: &LaunchOptions) -> DriverResult<Self> {
        let id = berth_types::instance_id();

        let profile_dir = match &options.profile_base_dir {
            Some(base) => TempDir::new_in(base)
                .map_err(|e| DriverError::Launch(format!("profile dir in {base:?}: {e}")))?,
            None => {
                TempDir::new().map_err(|e| DriverError::Launch(format!("profile dir: {e}")))?
            }
        };

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding");
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = &options.proxy_server {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        for arg in &options.extra_args {
            builder = builder.arg(arg);
        }

        let mut config = builder.build().map_err(DriverError::Launch)?;
        // Set directly so spider_chrome's own default does not win.
        config.user_data_dir = Some(profile_dir.path().to_path_buf());

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let handler_task = {
            let connected = connected.clone();
            let engine_id = id.clone();
            tokio::spawn(async move {
                debug!(engine_id = %engine_id, "browser event handler started");
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        warn!(engine_id = %engine_id, error = %e, "browser event error");
                    }
                }
                connected.store(false, Ordering::SeqCst);
                debug!(engine_id = %engine_id, "browser event handler ended");
            })
        };

        debug!(engine_id = %id, profile = ?profile_dir.path(), "chrome launched");

        Ok(Self {
            id,
            browser: Mutex::new(browser),
            connected,
            handler_task,
            _profile_dir: profile_dir,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn ensure_connected(&self) -> DriverResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::ConnectionClosed)
        }
    }
}

impl Drop for CdpEngine {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl BrowserEngine for CdpEngine {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>> {
        self.ensure_connected()?;
        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::PageCreation(e.to_string()))?;
        Ok(Box::new(CdpPage {
            page,
            connected: self.connected.clone(),
            last_viewport: std::sync::Mutex::new(None),
        }))
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn version(&self) -> DriverResult<String> {
        self.ensure_connected()?;
        let browser = self.browser.lock().await;
        browser
            .version()
            .await
            .map(|v| v.product)
            .map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn close(&self) -> DriverResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(engine_id = %self.id, error = %e, "error closing browser");
        }
        self.handler_task.abort();
        Ok(())
    }
}

pub struct CdpPage {
    page: Page,
    connected: Arc<AtomicBool>,
    last_viewport: std::sync::Mutex<Option<Viewport>>,
}

impl CdpPage {
    fn classify(&self, err: impl std::fmt::Display) -> DriverError {
        if !self.connected.load(Ordering::SeqCst) {
            return DriverError::ConnectionClosed;
        }
        let msg = err.to_string();
        if msg.contains("detached") || msg.contains("Target closed") {
            DriverError::Detached(msg)
        } else {
            DriverError::Other(msg)
        }
    }

    async fn nav_outcome(&self) -> DriverResult<NavigationOutcome> {
        let final_url = self
            .page
            .url()
            .await
            .map_err(|e| self.classify(e))?
            .unwrap_or_default();
        // CDP does not surface the main-resource status without a network
        // event subscription; callers treat None as unknown.
        Ok(NavigationOutcome {
            final_url,
            status_code: None,
        })
    }

    async fn find(&self, selector: &str) -> DriverResult<spider_chrome::element::Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::ElementNotFound {
                selector: selector.to_string(),
            })
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn goto(&self, url: &str, params: NavigateParams) -> DriverResult<NavigationOutcome> {
        match params.wait_until {
            WaitUntil::Load => {}
            other => {
                // spider_chrome's goto settles on the load event.
                warn!(wait_until = ?other, "wait condition approximated as load");
            }
        }
        let nav = timeout(Duration::from_millis(params.timeout_ms), async {
            self.page
                .goto(url)
                .await
                .map_err(|e| DriverError::Navigation(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| DriverError::Navigation(e.to_string()))?;
            Ok::<_, DriverError>(())
        })
        .await;
        match nav {
            Ok(Ok(())) => self.nav_outcome().await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DriverError::Timeout(params.timeout_ms)),
        }
    }

    async fn reload(&self, timeout_ms: u64) -> DriverResult<NavigationOutcome> {
        timeout(Duration::from_millis(timeout_ms), self.page.reload())
            .await
            .map_err(|_| DriverError::Timeout(timeout_ms))?
            .map_err(|e| self.classify(e))?;
        self.nav_outcome().await
    }

    async fn history(&self) -> DriverResult<HistoryInfo> {
        let resp = self
            .page
            .execute(GetNavigationHistoryParams::default())
            .await
            .map_err(|e| self.classify(e))?;
        Ok(HistoryInfo {
            length: resp.entries.len(),
            current: resp.current_index as usize,
        })
    }

    async fn go_back(&self, timeout_ms: u64) -> DriverResult<NavigationOutcome> {
        let resp = self
            .page
            .execute(GetNavigationHistoryParams::default())
            .await
            .map_err(|e| self.classify(e))?;
        let current = resp.current_index as usize;
        if current == 0 {
            return Err(DriverError::NoHistory);
        }
        let entry = &resp.entries[current - 1];
        timeout(
            Duration::from_millis(timeout_ms),
            self.page
                .execute(NavigateToHistoryEntryParams::new(entry.id)),
        )
        .await
        .map_err(|_| DriverError::Timeout(timeout_ms))?
        .map_err(|e| self.classify(e))?;
        self.nav_outcome().await
    }

    async fn go_forward(&self, timeout_ms: u64) -> DriverResult<NavigationOutcome> {
        let resp = self
            .page
            .execute(GetNavigationHistoryParams::default())
            .await
            .map_err(|e| self.classify(e))?;
        let current = resp.current_index as usize;
        if current + 1 >= resp.entries.len() {
            return Err(DriverError::NoHistory);
        }
        let entry = &resp.entries[current + 1];
        timeout(
            Duration::from_millis(timeout_ms),
            self.page
                .execute(NavigateToHistoryEntryParams::new(entry.id)),
        )
        .await
        .map_err(|_| DriverError::Timeout(timeout_ms))?
        .map_err(|e| self.classify(e))?;
        self.nav_outcome().await
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| self.classify(e))?
            .unwrap_or_default())
    }

    async fn content(&self) -> DriverResult<String> {
        self.page.content().await.map_err(|e| self.classify(e))
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::ScriptRuntime(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| DriverError::ScriptRuntime(e.to_string()))
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> DriverResult<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(timeout_ms));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn wait_for_function(&self, expression: &str, timeout_ms: u64) -> DriverResult<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let value = self.evaluate(expression).await?;
            let truthy = match &value {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                serde_json::Value::String(s) => !s.is_empty(),
                serde_json::Value::Null => false,
                _ => true,
            };
            if truthy {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(timeout_ms));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn click(&self, selector: &str, params: ClickParams) -> DriverResult<()> {
        let element = self.find(selector).await?;
        for _ in 0..params.click_count.max(1) {
            element.click().await.map_err(|e| self.classify(e))?;
            if params.delay_ms > 0 {
                sleep(Duration::from_millis(params.delay_ms)).await;
            }
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, delay_ms: u64) -> DriverResult<()> {
        let element = self.find(selector).await?;
        element.focus().await.map_err(|e| self.classify(e))?;
        if delay_ms == 0 {
            element.type_str(text).await.map_err(|e| self.classify(e))?;
        } else {
            for ch in text.chars() {
                element
                    .type_str(&ch.to_string())
                    .await
                    .map_err(|e| self.classify(e))?;
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
        Ok(())
    }

    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<Vec<String>> {
        self.find(selector).await?;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                const wanted = {vals};
                const selected = [];
                for (const opt of el.options) {{
                    opt.selected = wanted.includes(opt.value);
                    if (opt.selected) selected.push(opt.value);
                }}
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return selected;
            }})()"#,
            sel = serde_json::to_string(selector).unwrap_or_default(),
            vals = serde_json::to_string(values).unwrap_or_default(),
        );
        let value = self.evaluate(&script).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn hover(&self, selector: &str) -> DriverResult<()> {
        let element = self.find(selector).await?;
        element.hover().await.map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn focus(&self, selector: &str) -> DriverResult<()> {
        let element = self.find(selector).await?;
        element.focus().await.map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn blur(&self, selector: &str) -> DriverResult<()> {
        self.find(selector).await?;
        let script = format!(
            "document.querySelector({}).blur()",
            serde_json::to_string(selector).unwrap_or_default()
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()> {
        self.evaluate(&format!("window.scrollBy({dx}, {dy})"))
            .await?;
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(viewport.device_scale_factor)
            .mobile(viewport.is_mobile)
            .build()
            .map_err(DriverError::Other)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| self.classify(e))?;
        *self.last_viewport.lock().unwrap() = Some(viewport);
        Ok(())
    }

    async fn viewport(&self) -> DriverResult<Viewport> {
        // CDP has no read-back for metrics overrides; report the last set.
        Ok(self.last_viewport.lock().unwrap().unwrap_or_default())
    }

    async fn set_user_agent(&self, user_agent: &str) -> DriverResult<()> {
        self.page
            .set_user_agent(user_agent)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn set_cookies(&self, cookies: Vec<CookieParam>) -> DriverResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CdpCookieParam::builder()
                .name(cookie.name)
                .value(cookie.value)
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            if let Some(domain) = cookie.domain {
                builder = builder.domain(domain);
            }
            if let Some(path) = cookie.path {
                builder = builder.path(path);
            }
            if let Some(expires) = cookie.expires {
                builder = builder.expires(TimeSinceEpoch::new(expires));
            }
            if let Some(same_site) = cookie.same_site {
                builder = builder.same_site(match same_site {
                    SameSite::Strict => CookieSameSite::Strict,
                    SameSite::Lax => CookieSameSite::Lax,
                    SameSite::None => CookieSameSite::None,
                });
            }
            params.push(builder.build().map_err(DriverError::Other)?);
        }
        self.page
            .set_cookies(params)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieParam>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| self.classify(e))?;
        Ok(cookies
            .into_iter()
            .map(|c| {
                let expires = c.expires;
                CookieParam {
                    name: c.name,
                    value: c.value,
                    domain: Some(c.domain),
                    path: Some(c.path),
                    expires: (expires > 0.0).then_some(expires),
                    secure: c.secure,
                    http_only: c.http_only,
                    same_site: c.same_site.map(|s| match s {
                        CookieSameSite::Strict => SameSite::Strict,
                        CookieSameSite::Lax => SameSite::Lax,
                        CookieSameSite::None => SameSite::None,
                    }),
                }
            })
            .collect())
    }

    async fn delete_cookie(&self, name: &str, domain: Option<&str>) -> DriverResult<()> {
        let mut builder = DeleteCookiesParams::builder().name(name);
        if let Some(domain) = domain {
            builder = builder.domain(domain);
        }
        let params = builder.build().map_err(DriverError::Other)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn clear_cookies(&self) -> DriverResult<()> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn screenshot(&self, params: ScreenshotParams) -> DriverResult<Vec<u8>> {
        if let Some(selector) = &params.selector {
            let element = self.find(selector).await?;
            return element.screenshot(match params.format {
                ScreenshotFormat::Png => CaptureScreenshotFormat::Png,
                ScreenshotFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
            })
            .await
            .map_err(|e| self.classify(e));
        }

        let mut builder = spider_chrome::page::ScreenshotParams::builder();
        builder = match params.format {
            ScreenshotFormat::Png => builder.format(CaptureScreenshotFormat::Png),
            ScreenshotFormat::Jpeg => builder.format(CaptureScreenshotFormat::Jpeg),
        };
        if let Some(quality) = params.quality {
            builder = builder.quality(quality as i64);
        }
        if params.full_page {
            builder = builder.full_page(true);
        }
        self.page
            .screenshot(builder.build())
            .await
            .map_err(|e| self.classify(e))
    }

    async fn pdf(&self, params: PdfParams) -> DriverResult<Vec<u8>> {
        let cdp_params = PrintToPdfParams {
            landscape: Some(params.landscape),
            print_background: Some(params.print_background),
            scale: params.scale,
            paper_width: params.paper_width,
            paper_height: params.paper_height,
            page_ranges: params.page_ranges,
            ..Default::default()
        };
        self.page
            .pdf(cdp_params)
            .await
            .map_err(|e| self.classify(e))
    }

    async fn upload_file(&self, selector: &str, path: &str) -> DriverResult<()> {
        if !Path::new(path).exists() {
            return Err(DriverError::Other(format!("upload file not found: {path}")));
        }
        let element = self.find(selector).await?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(DriverError::Other)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }
}
