//! Deterministic in-memory engine.
//!
//! Implements the full capability contract without a browser process, with
//! behavior simple enough to reason about in tests: navigation normalizes the
//! URL and records history, `evaluate` folds constant arithmetic, cookies
//! live in a per-engine jar, screenshots and PDFs are small well-formed
//! byte stubs. A `SimFleet` tracks every launched engine so tests can kill
//! instances and inject launch failures.
//!
//! Selector resolution is lexical: after a successful navigation every
//! selector resolves except those containing the marker substring `missing`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use berth_types::Viewport;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{DriverError, DriverResult};
use crate::params::{
    ClickParams, CookieParam, NavigateParams, NavigationOutcome, PdfParams, ScreenshotFormat,
    ScreenshotParams,
};
use crate::traits::{BrowserEngine, HistoryInfo, PageHandle};

const SELECTOR_MISSING_MARKER: &str = "missing";

/// Control surface over every sim engine launched through a `Launcher`.
#[derive(Clone, Default)]
pub struct SimFleet {
    inner: Arc<StdMutex<FleetInner>>,
}

#[derive(Default)]
struct FleetInner {
    engines: Vec<Arc<SimEngine>>,
    fail_launches: usize,
    launched: usize,
}

impl SimFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` launches will fail with `DriverError::Launch`.
    pub fn fail_next_launches(&self, n: usize) {
        self.inner.lock().unwrap().fail_launches = n;
    }

    /// Total successful launches so far.
    pub fn launched(&self) -> usize {
        self.inner.lock().unwrap().launched
    }

    /// Engines launched so far, oldest first.
    pub fn engines(&self) -> Vec<Arc<SimEngine>> {
        self.inner.lock().unwrap().engines.clone()
    }

    /// Kill the most recently launched engine that is still connected.
    pub fn kill_newest(&self) -> Option<Arc<SimEngine>> {
        let engines = self.engines();
        for engine in engines.into_iter().rev() {
            if engine.connected() {
                engine.kill();
                return Some(engine);
            }
        }
        None
    }

    pub(crate) fn launch(&self) -> DriverResult<Arc<SimEngine>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_launches > 0 {
            inner.fail_launches -= 1;
            return Err(DriverError::Launch("simulated launch failure".into()));
        }
        let engine = Arc::new(SimEngine::new());
        inner.engines.push(engine.clone());
        inner.launched += 1;
        Ok(engine)
    }
}

/// Engine-wide state shared by its pages.
struct SimShared {
    connected: AtomicBool,
    cookies: StdMutex<Vec<CookieParam>>,
    open_pages: AtomicUsize,
}

pub struct SimEngine {
    id: String,
    shared: Arc<SimShared>,
}

impl SimEngine {
    pub fn new() -> Self {
        Self {
            id: berth_types::instance_id(),
            shared: Arc::new(SimShared {
                connected: AtomicBool::new(true),
                cookies: StdMutex::new(Vec::new()),
                open_pages: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Simulate a browser crash: every subsequent operation on this engine
    /// or its pages fails with `ProcessExited`.
    pub fn kill(&self) {
        debug!(engine_id = %self.id, "sim engine killed");
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    pub fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.shared.open_pages.load(Ordering::SeqCst)
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserEngine for SimEngine {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>> {
        if !self.connected() {
            return Err(DriverError::ProcessExited);
        }
        self.shared.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimPage {
            shared: self.shared.clone(),
            state: StdMutex::new(PageState::default()),
        }))
    }

    async fn is_connected(&self) -> bool {
        self.connected()
    }

    async fn version(&self) -> DriverResult<String> {
        if !self.connected() {
            return Err(DriverError::ProcessExited);
        }
        Ok("SimBrowser/1.0".to_string())
    }

    async fn close(&self) -> DriverResult<()> {
        self.shared.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct PageState {
    history: VecDeque<String>,
    history_index: usize,
    ready: bool,
    closed: bool,
    viewport: Option<Viewport>,
    user_agent: Option<String>,
}

impl PageState {
    fn current_url(&self) -> Option<&String> {
        if self.history.is_empty() {
            None
        } else {
            self.history.get(self.history_index)
        }
    }
}

pub struct SimPage {
    shared: Arc<SimShared>,
    state: StdMutex<PageState>,
}

impl SimPage {
    fn check_alive(&self) -> DriverResult<()> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(DriverError::ProcessExited);
        }
        if self.state.lock().unwrap().closed {
            return Err(DriverError::Detached("page closed".into()));
        }
        Ok(())
    }

    fn require_element(&self, selector: &str) -> DriverResult<()> {
        self.check_alive()?;
        let ready = self.state.lock().unwrap().ready;
        if !ready || selector.contains(SELECTOR_MISSING_MARKER) {
            return Err(DriverError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    fn host(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        let url = state.current_url()?;
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    fn outcome(&self) -> DriverResult<NavigationOutcome> {
        let state = self.state.lock().unwrap();
        let url = state
            .current_url()
            .cloned()
            .ok_or_else(|| DriverError::Navigation("no page loaded".into()))?;
        Ok(NavigationOutcome {
            final_url: url,
            status_code: Some(200),
        })
    }
}

#[async_trait]
impl PageHandle for SimPage {
    async fn goto(&self, url: &str, _params: NavigateParams) -> DriverResult<NavigationOutcome> {
        self.check_alive()?;
        // The url crate performs the normalization the contract expects:
        // default ports stripped, empty path becomes "/".
        let normalized = url::Url::parse(url)
            .map_err(|e| DriverError::Navigation(format!("unparseable url: {e}")))?;
        let mut state = self.state.lock().unwrap();
        // A fresh navigation discards any forward history.
        if !state.history.is_empty() {
            let new_len = state.history_index + 1;
            state.history.truncate(new_len);
        }
        state.history.push_back(normalized.to_string());
        state.history_index = state.history.len() - 1;
        state.ready = true;
        drop(state);
        self.outcome()
    }

    async fn reload(&self, _timeout_ms: u64) -> DriverResult<NavigationOutcome> {
        self.check_alive()?;
        self.outcome()
    }

    async fn history(&self) -> DriverResult<HistoryInfo> {
        self.check_alive()?;
        let state = self.state.lock().unwrap();
        Ok(HistoryInfo {
            length: state.history.len(),
            current: state.history_index,
        })
    }

    async fn go_back(&self, _timeout_ms: u64) -> DriverResult<NavigationOutcome> {
        self.check_alive()?;
        {
            let mut state = self.state.lock().unwrap();
            if state.history_index == 0 {
                return Err(DriverError::NoHistory);
            }
            state.history_index -= 1;
        }
        self.outcome()
    }

    async fn go_forward(&self, _timeout_ms: u64) -> DriverResult<NavigationOutcome> {
        self.check_alive()?;
        {
            let mut state = self.state.lock().unwrap();
            if state.history_index + 1 >= state.history.len() {
                return Err(DriverError::NoHistory);
            }
            state.history_index += 1;
        }
        self.outcome()
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.check_alive()?;
        let state = self.state.lock().unwrap();
        Ok(state.current_url().cloned().unwrap_or_default())
    }

    async fn content(&self) -> DriverResult<String> {
        self.check_alive()?;
        let url = self.current_url().await?;
        let user_agent = self
            .state
            .lock()
            .unwrap()
            .user_agent
            .clone()
            .unwrap_or_default();
        Ok(format!(
            "<html><head><title>Sim Page</title></head>\
             <body data-url=\"{url}\" data-user-agent=\"{user_agent}\"></body></html>"
        ))
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        self.check_alive()?;
        let trimmed = script.trim();
        if let Some(rest) = trimmed.strip_prefix("throw") {
            return Err(DriverError::ScriptRuntime(rest.trim().to_string()));
        }
        if trimmed == "true" {
            return Ok(serde_json::Value::Bool(true));
        }
        if trimmed == "false" {
            return Ok(serde_json::Value::Bool(false));
        }
        if let Some(s) = string_literal(trimmed) {
            return Ok(serde_json::Value::String(s));
        }
        if let Some(n) = eval_arithmetic(trimmed) {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                return Ok(serde_json::json!(n as i64));
            }
            return Ok(serde_json::json!(n));
        }
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> DriverResult<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            match self.require_element(selector) {
                Ok(()) => return Ok(()),
                Err(DriverError::ElementNotFound { .. }) => {
                    if Instant::now() >= deadline {
                        return Err(DriverError::Timeout(timeout_ms));
                    }
                    sleep(Duration::from_millis(25)).await;
                }
                Err(e) => return Err(e),
            }
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
                _ => false,
            };
            if truthy {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(timeout_ms));
            }
            sleep(Duration::from_millis(25)).await;
        }
    }

    async fn click(&self, selector: &str, _params: ClickParams) -> DriverResult<()> {
        self.require_element(selector)
    }

    async fn type_text(&self, selector: &str, _text: &str, _delay_ms: u64) -> DriverResult<()> {
        self.require_element(selector)
    }

    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<Vec<String>> {
        self.require_element(selector)?;
        Ok(values.to_vec())
    }

    async fn hover(&self, selector: &str) -> DriverResult<()> {
        self.require_element(selector)
    }

    async fn focus(&self, selector: &str) -> DriverResult<()> {
        self.require_element(selector)
    }

    async fn blur(&self, selector: &str) -> DriverResult<()> {
        self.require_element(selector)
    }

    async fn scroll_by(&self, _dx: f64, _dy: f64) -> DriverResult<()> {
        self.check_alive()
    }

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        self.check_alive()?;
        self.state.lock().unwrap().viewport = Some(viewport);
        Ok(())
    }

    async fn viewport(&self) -> DriverResult<Viewport> {
        self.check_alive()?;
        Ok(self.state.lock().unwrap().viewport.unwrap_or_default())
    }

    async fn set_user_agent(&self, user_agent: &str) -> DriverResult<()> {
        self.check_alive()?;
        self.state.lock().unwrap().user_agent = Some(user_agent.to_string());
        Ok(())
    }

    async fn set_cookies(&self, cookies: Vec<CookieParam>) -> DriverResult<()> {
        self.check_alive()?;
        let host = self.host();
        let mut jar = self.shared.cookies.lock().unwrap();
        for mut cookie in cookies {
            if cookie.domain.is_none() {
                cookie.domain = host.clone();
            }
            jar.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
            jar.push(cookie);
        }
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieParam>> {
        self.check_alive()?;
        let host = self.host();
        let jar = self.shared.cookies.lock().unwrap();
        Ok(jar
            .iter()
            .filter(|c| match (&c.domain, &host) {
                (Some(domain), Some(host)) => {
                    host == domain || host.ends_with(&format!(".{domain}"))
                }
                (None, _) => true,
                (Some(_), None) => false,
            })
            .cloned()
            .collect())
    }

    async fn delete_cookie(&self, name: &str, domain: Option<&str>) -> DriverResult<()> {
        self.check_alive()?;
        let mut jar = self.shared.cookies.lock().unwrap();
        jar.retain(|c| {
            c.name != name || (domain.is_some() && c.domain.as_deref() != domain)
        });
        Ok(())
    }

    async fn clear_cookies(&self) -> DriverResult<()> {
        self.check_alive()?;
        self.shared.cookies.lock().unwrap().clear();
        Ok(())
    }

    async fn screenshot(&self, params: ScreenshotParams) -> DriverResult<Vec<u8>> {
        self.check_alive()?;
        if let Some(selector) = &params.selector {
            self.require_element(selector)?;
        }
        // Valid magic bytes followed by a deterministic payload.
        let mut bytes = match params.format {
            ScreenshotFormat::Png => vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
            ScreenshotFormat::Jpeg => vec![0xFF, 0xD8, 0xFF, 0xE0],
        };
        let payload_len = if params.full_page { 4096 } else { 1024 };
        bytes.resize(bytes.len() + payload_len, 0x42);
        Ok(bytes)
    }

    async fn pdf(&self, _params: PdfParams) -> DriverResult<Vec<u8>> {
        self.check_alive()?;
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(2048, 0x20);
        bytes.extend_from_slice(b"\n%%EOF\n");
        Ok(bytes)
    }

    async fn upload_file(&self, selector: &str, path: &str) -> DriverResult<()> {
        self.require_element(selector)?;
        if path.is_empty() {
            return Err(DriverError::Other("empty upload path".into()));
        }
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            self.shared.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn string_literal(s: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            let inner = &s[1..s.len() - 1];
            if !inner.contains(quote) {
                return Some(inner.to_string());
            }
        }
    }
    None
}

/// Constant-fold `+ - * / ( )` arithmetic over decimal literals.
fn eval_arithmetic(s: &str) -> Option<f64> {
    let tokens = tokenize(s)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos == parser.tokens.len() {
        Some(value)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn tokenize(s: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '0'..='9' | '.' => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num(num.parse().ok()?));
            }
            _ => return None,
        }
    }
    if tokens.is_empty() {
        None
    } else {
        Some(tokens)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.peek()?;
        self.pos += 1;
        Some(t)
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.next();
                    value += self.term()?;
                }
                Token::Minus => {
                    self.next();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Some(value)
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.next();
                    value *= self.factor()?;
                }
                Token::Slash => {
                    self.next();
                    value /= self.factor()?;
                }
                _ => break,
            }
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.next()? {
            Token::Num(n) => Some(n),
            Token::Minus => Some(-self.factor()?),
            Token::Open => {
                let value = self.expr()?;
                match self.next()? {
                    Token::Close => Some(value),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(engine: &SimEngine) -> Box<dyn PageHandle> {
        futures::executor::block_on(engine.new_page()).unwrap()
    }

    #[tokio::test]
    async fn navigation_normalizes_and_tracks_history() {
        let engine = SimEngine::new();
        let page = engine.new_page().await.unwrap();

        let out = page
            .goto("https://example.com", NavigateParams::default())
            .await
            .unwrap();
        assert_eq!(out.final_url, "https://example.com/");
        assert_eq!(out.status_code, Some(200));

        let out = page
            .goto("https://example.com:443/a", NavigateParams::default())
            .await
            .unwrap();
        assert_eq!(out.final_url, "https://example.com/a");

        let hist = page.history().await.unwrap();
        assert_eq!(hist.length, 2);
        assert!(hist.can_go_back());
        assert!(!hist.can_go_forward());

        let out = page.go_back(1000).await.unwrap();
        assert_eq!(out.final_url, "https://example.com/");
        assert!(page.history().await.unwrap().can_go_forward());
    }

    #[tokio::test]
    async fn go_back_without_history_fails() {
        let engine = SimEngine::new();
        let page = engine.new_page().await.unwrap();
        page.goto("https://example.com", NavigateParams::default())
            .await
            .unwrap();
        assert!(matches!(
            page.go_back(1000).await,
            Err(DriverError::NoHistory)
        ));
    }

    #[tokio::test]
    async fn evaluate_folds_arithmetic() {
        let engine = SimEngine::new();
        let page = engine.new_page().await.unwrap();
        assert_eq!(page.evaluate("1+2+3").await.unwrap(), serde_json::json!(6));
        assert_eq!(
            page.evaluate("2 * (3 + 4)").await.unwrap(),
            serde_json::json!(14)
        );
        assert_eq!(
            page.evaluate("'hello'").await.unwrap(),
            serde_json::json!("hello")
        );
        assert!(matches!(
            page.evaluate("throw 'boom'").await,
            Err(DriverError::ScriptRuntime(_))
        ));
        assert_eq!(
            page.evaluate("window.someGlobal").await.unwrap(),
            serde_json::Value::Null
        );
    }

    #[tokio::test]
    async fn cookies_roundtrip_with_domain_filter() {
        let engine = SimEngine::new();
        let page = engine.new_page().await.unwrap();
        page.goto("https://example.com", NavigateParams::default())
            .await
            .unwrap();

        page.set_cookies(vec![CookieParam::new("sid", "abc")])
            .await
            .unwrap();
        let cookies = page.cookies().await.unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "abc");
        assert_eq!(cookies[0].domain.as_deref(), Some("example.com"));

        page.delete_cookie("sid", None).await.unwrap();
        assert!(page.cookies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn killed_engine_fails_everything() {
        let engine = SimEngine::new();
        let page = engine.new_page().await.unwrap();
        page.goto("https://example.com", NavigateParams::default())
            .await
            .unwrap();

        engine.kill();
        assert!(!engine.is_connected().await);
        assert!(matches!(
            page.current_url().await,
            Err(DriverError::ProcessExited)
        ));
        assert!(matches!(
            engine.new_page().await,
            Err(DriverError::ProcessExited)
        ));
    }

    #[tokio::test]
    async fn missing_elements_and_screenshots() {
        let engine = SimEngine::new();
        let page = engine.new_page().await.unwrap();
        page.goto("https://example.com", NavigateParams::default())
            .await
            .unwrap();

        assert!(page.click("#button", ClickParams::default()).await.is_ok());
        assert!(matches!(
            page.click("#missing-button", ClickParams::default()).await,
            Err(DriverError::ElementNotFound { .. })
        ));

        let png = page.screenshot(ScreenshotParams::default()).await.unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert!(png.len() > 8);

        let pdf = page.pdf(PdfParams::default()).await.unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn fleet_controls_launches() {
        let fleet = SimFleet::new();
        fleet.fail_next_launches(1);
        assert!(fleet.launch().is_err());
        let engine = fleet.launch().unwrap();
        assert_eq!(fleet.launched(), 1);
        assert!(engine.connected());
        fleet.kill_newest();
        assert!(!engine.connected());
    }

    #[test]
    fn page_count_tracks_closes() {
        let engine = SimEngine::new();
        let p = page(&engine);
        assert_eq!(engine.open_pages(), 1);
        futures::executor::block_on(p.close()).unwrap();
        assert_eq!(engine.open_pages(), 0);
    }
}
