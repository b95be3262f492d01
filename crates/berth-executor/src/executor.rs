//! The execution pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use berth_driver::{
    ClickParams, DriverError, NavigateParams, PdfParams, ScreenshotParams,
};
use berth_events::{topics, Event, EventBus};
use berth_pool::BrowserPool;
use berth_proxy::ProxyManager;
use berth_registry::{Context, SessionRegistry};
use berth_types::{Error, ErrorKind, Principal, Protocol, Result, MAX_ACTION_TIMEOUT_MS};
use base64::Engine as _;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::action::{Action, ActionResult, BatchOptions, CookieOp, HistoryDirection};
use crate::history::{ActionRecord, ContextMetrics};
use crate::runtime::ContextRuntime;
use crate::script_guard::ScriptGuard;
use crate::url_guard::{UrlGuard, UrlGuardConfig};

/// Extra slack given to the outer deadline so driver-level timeouts, which
/// produce better errors, usually fire first.
const DISPATCH_GRACE_MS: u64 = 50;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub history_capacity: usize,
    /// Uploads are confined to this prefix; `None` disables uploads.
    pub upload_prefix: Option<PathBuf>,
    pub url_guard: UrlGuardConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 500,
            upload_prefix: None,
            url_guard: UrlGuardConfig::default(),
        }
    }
}

/// Caller-side parameters for one execution.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub principal: Principal,
    pub context_id: String,
    /// Target page; defaults to the context's newest page.
    pub page_id: Option<String>,
    pub origin: Protocol,
    /// Request-level deadline override, milliseconds.
    pub timeout_ms: Option<u64>,
}

pub struct ActionExecutor {
    registry: Arc<SessionRegistry>,
    pool: Arc<BrowserPool>,
    proxy: Arc<ProxyManager>,
    bus: EventBus,
    url_guard: UrlGuard,
    script_guard: ScriptGuard,
    config: ExecutorConfig,
    runtimes: DashMap<String, Arc<ContextRuntime>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ActionExecutor {
    pub fn new(
        config: ExecutorConfig,
        registry: Arc<SessionRegistry>,
        pool: Arc<BrowserPool>,
        proxy: Arc<ProxyManager>,
        bus: EventBus,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            url_guard: UrlGuard::new(config.url_guard.clone()),
            script_guard: ScriptGuard::new(),
            registry,
            pool,
            proxy,
            bus,
            config,
            runtimes: DashMap::new(),
            shutdown_rx,
        })
    }

    /// Register a freshly created context with its first lease.
    pub async fn attach_context(&self, context: &Context, lease: berth_pool::Lease) -> Result<()> {
        self.pool
            .assign_context(lease.instance_id(), &context.id)
            .await;
        self.registry
            .bind_instance(&context.id, Some(lease.instance_id().to_string()))
            .await?;
        let runtime = Arc::new(ContextRuntime::new(
            context.id.clone(),
            context.options.clone(),
            self.registry.context_lock(&context.id),
            self.config.history_capacity,
        ));
        *runtime.lease.lock().await = Some(lease);
        self.runtimes.insert(context.id.clone(), runtime);
        Ok(())
    }

    /// Tear down a context's runtime: close pages, return the lease.
    pub async fn detach_context(&self, context_id: &str) {
        let Some((_, runtime)) = self.runtimes.remove(context_id) else {
            return;
        };
        let pages = runtime.pages.lock().unwrap().drain();
        for page in pages {
            let _ = page.close().await;
        }
        let lease = runtime.lease.lock().await.take();
        if let Some(lease) = lease {
            self.pool.detach_context(lease.instance_id(), context_id).await;
            self.proxy.release_context(context_id);
            lease.release().await;
        }
    }

    /// Crash path: the instance is already gone, so leases are discarded
    /// rather than released and dead page handles are dropped.
    pub async fn invalidate_bindings(&self, context_ids: &[String]) {
        for context_id in context_ids {
            let Some(runtime) = self.runtimes.get(context_id).map(|r| r.clone()) else {
                continue;
            };
            runtime.pages.lock().unwrap().drain();
            let taken = runtime.lease.lock().await.take();
            if let Some(lease) = taken {
                lease.forget();
            }
        }
    }

    /// Execute one action with full per-context serialization.
    pub async fn execute(&self, req: ExecRequest, action: Action) -> ActionResult {
        self.execute_one(req, action, true).await
    }

    /// Execute a batch. Envelope problems (size, parallel bounds, duplicate
    /// pages in a parallel batch) fail the call; per-action failures land in
    /// the returned results.
    pub async fn execute_batch(
        &self,
        req: ExecRequest,
        items: Vec<(Option<String>, Action)>,
        options: BatchOptions,
    ) -> Result<Vec<ActionResult>> {
        options.validate(items.len())?;

        if options.parallel > 1 {
            let mut seen = std::collections::HashSet::new();
            for (page_id, _) in &items {
                let Some(page_id) = page_id else {
                    return Err(Error::invalid_argument(
                        "parallel batches require an explicit pageId per action",
                    ));
                };
                if !seen.insert(page_id.clone()) {
                    return Err(Error::invalid_argument(
                        "parallel batches require distinct pages",
                    ));
                }
            }
            use futures::StreamExt;
            let results = futures::stream::iter(items.into_iter().map(|(page_id, action)| {
                let req = ExecRequest {
                    page_id,
                    ..req.clone()
                };
                self.execute_one(req, action, false)
            }))
            .buffered(options.parallel)
            .collect::<Vec<_>>()
            .await;
            return Ok(results);
        }

        let mut results = Vec::with_capacity(items.len());
        for (page_id, action) in items {
            let req = ExecRequest {
                page_id,
                ..req.clone()
            };
            let result = self.execute_one(req, action, true).await;
            let failed = !result.success;
            results.push(result);
            if failed && options.stop_on_error {
                break;
            }
        }
        Ok(results)
    }

    /// Explicitly open a page in a context (pages are usually created
    /// implicitly by the first `navigate`).
    pub async fn create_page(
        &self,
        principal: &Principal,
        context_id: &str,
        origin: Protocol,
    ) -> Result<berth_registry::Page> {
        let context = self.registry.get_context(principal, context_id).await?;
        let runtime = self.runtime_for(&context);
        let _guard = runtime.serial.lock().await;

        let engine = self
            .ensure_bound(&runtime, runtime.options.default_timeout_ms)
            .await?;
        let handle: Arc<dyn berth_driver::PageHandle> = Arc::from(engine.new_page().await?);
        handle.set_viewport(runtime.options.viewport).await?;
        if let Some(user_agent) = &runtime.options.user_agent {
            handle.set_user_agent(user_agent).await?;
        }
        let page = self.registry.create_page(context_id, origin).await?;
        runtime
            .pages
            .lock()
            .unwrap()
            .insert(page.id.clone(), handle);
        Ok(page)
    }

    pub async fn close_page(
        &self,
        principal: &Principal,
        page_id: &str,
        origin: Protocol,
    ) -> Result<()> {
        let page = self.registry.close_page(principal, page_id, origin).await?;
        if let Some(runtime) = self.runtimes.get(&page.context_id).map(|r| r.clone()) {
            let handle = runtime.pages.lock().unwrap().remove(page_id);
            if let Some(handle) = handle {
                let _ = handle.close().await;
            }
        }
        Ok(())
    }

    pub async fn history(
        &self,
        principal: &Principal,
        context_id: &str,
        limit: usize,
    ) -> Result<Vec<ActionRecord>> {
        self.registry.get_context(principal, context_id).await?;
        Ok(self
            .runtimes
            .get(context_id)
            .map(|r| r.ring.lock().unwrap().recent(limit))
            .unwrap_or_default())
    }

    pub async fn metrics(&self, principal: &Principal, context_id: &str) -> Result<ContextMetrics> {
        self.registry.get_context(principal, context_id).await?;
        self.runtimes
            .get(context_id)
            .map(|r| r.ring.lock().unwrap().metrics())
            .ok_or_else(|| Error::not_found(format!("context {context_id} has no runtime")))
    }

    /// Release every runtime; called once at service shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.runtimes.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.detach_context(&id).await;
        }
    }

    async fn execute_one(&self, req: ExecRequest, action: Action, full_serial: bool) -> ActionResult {
        let started = Instant::now();
        let action_type = action.action_type().to_string();

        // 1. Authorize: the caller must own the target context. Failures
        // here never touch the context's history.
        let context = match self.registry.get_context(&req.principal, &req.context_id).await {
            Ok(context) => context,
            Err(e) => {
                return failure_result(&action_type, &req, None, e, started, Vec::new());
            }
        };

        let runtime = self.runtime_for(&context);
        let _serial_guard = if full_serial {
            Some(runtime.serial.lock().await)
        } else {
            None
        };
        // The recorded interval covers execution only, not time spent parked
        // behind the context lock; record windows never overlap.
        let started = Instant::now();

        let mut warnings = Vec::new();
        let mut page_id = None;
        let outcome = self
            .pipeline(&req, &action, &runtime, &mut warnings, &mut page_id)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(data) => ActionResult {
                action_type: action_type.clone(),
                context_id: req.context_id.clone(),
                page_id: page_id.clone(),
                success: true,
                data,
                error: None,
                error_message: None,
                warnings: warnings.clone(),
                duration_ms,
            },
            Err(e) => {
                if e.kind() == ErrorKind::BrowserCrashed {
                    self.on_fatal(&runtime).await;
                }
                ActionResult {
                    action_type: action_type.clone(),
                    context_id: req.context_id.clone(),
                    page_id: page_id.clone(),
                    success: false,
                    data: serde_json::Value::Null,
                    error: Some(e.kind()),
                    error_message: Some(e.message().to_string()),
                    warnings: warnings.clone(),
                    duration_ms,
                }
            }
        };

        // 6. Record: ring append, metrics, event — one atomic tail.
        {
            let _tail = runtime.record_lock.lock().unwrap();
            runtime.ring.lock().unwrap().push(ActionRecord {
                action_type: action_type.clone(),
                page_id: result.page_id.clone(),
                context_id: req.context_id.clone(),
                success: result.success,
                duration_ms,
                error: result.error,
                at: chrono::Utc::now(),
            });
            self.bus.publish(
                Event::new(topics::PAGE_ACTION_EXECUTED, req.origin).with_fields(
                    serde_json::json!({
                        "context_id": req.context_id,
                        "page_id": result.page_id,
                        "action_type": action_type,
                        "success": result.success,
                        "error": result.error,
                        "duration_ms": duration_ms,
                    }),
                ),
            );
        }
        if let Some(page_id) = &result.page_id {
            if let Err(e) = self.registry.note_action(&req.context_id, page_id).await {
                debug!(error = %e, "failed to bump action counters");
            }
        }
        if result.success && matches!(action, Action::Navigate { .. } | Action::HistoryNavigate { .. })
        {
            if let (Some(page_id), Some(final_url)) =
                (&result.page_id, result.data.get("finalUrl").and_then(|v| v.as_str()))
            {
                let _ = self.registry.set_page_url(page_id, final_url, true).await;
                self.bus.publish(
                    Event::new(topics::PAGE_NAVIGATED, req.origin).with_fields(
                        serde_json::json!({
                            "context_id": req.context_id,
                            "page_id": page_id,
                            "url": final_url,
                        }),
                    ),
                );
            }
        }

        result
    }

    fn runtime_for(&self, context: &Context) -> Arc<ContextRuntime> {
        self.runtimes
            .entry(context.id.clone())
            .or_insert_with(|| {
                Arc::new(ContextRuntime::new(
                    context.id.clone(),
                    context.options.clone(),
                    self.registry.context_lock(&context.id),
                    self.config.history_capacity,
                ))
            })
            .clone()
    }

    /// Steps 2-5: validate, pre-check, bind, resolve, dispatch.
    async fn pipeline(
        &self,
        req: &ExecRequest,
        action: &Action,
        runtime: &Arc<ContextRuntime>,
        warnings: &mut Vec<String>,
        page_id_out: &mut Option<String>,
    ) -> Result<serde_json::Value> {
        action.validate()?;

        // Pre-checks that need no page.
        match action {
            Action::Navigate { url, .. } => {
                warnings.extend(self.url_guard.check(url)?);
            }
            Action::Evaluate { code, .. } => {
                warnings.extend(self.script_guard.check(code)?);
            }
            Action::Wait { target, .. } => {
                if let Some(function) = &target.function {
                    warnings.extend(self.script_guard.check(function)?);
                }
            }
            Action::Upload { file_path, .. } => {
                let Some(prefix) = &self.config.upload_prefix else {
                    return Err(Error::blocked("file uploads are disabled"));
                };
                let path = PathBuf::from(file_path);
                if !path.starts_with(prefix) || file_path.contains("..") {
                    return Err(Error::blocked(format!(
                        "upload path must stay under {}",
                        prefix.display()
                    )));
                }
            }
            _ => {}
        }

        let timeout_ms = req
            .timeout_ms
            .or(action.timeout_ms())
            .unwrap_or(runtime.options.default_timeout_ms)
            .min(MAX_ACTION_TIMEOUT_MS);

        let engine = self.ensure_bound(runtime, timeout_ms).await?;
        let (page_id, page) = self.resolve_page(req, action, runtime, &engine).await?;
        *page_id_out = Some(page_id);

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            result = self.dispatch(action, &page, runtime, timeout_ms) => result,
            _ = sleep(Duration::from_millis(timeout_ms + DISPATCH_GRACE_MS)) => {
                Err(Error::timeout(format!("action deadline of {timeout_ms}ms exceeded")))
            }
            _ = shutdown_rx.changed() => Err(Error::canceled("service shutting down")),
        }
    }

    /// Bind a browser instance if the context does not hold one. Contexts in
    /// `Recovering` or `Paused` re-bind here on their next action.
    async fn ensure_bound(
        &self,
        runtime: &Arc<ContextRuntime>,
        timeout_ms: u64,
    ) -> Result<Arc<dyn berth_driver::BrowserEngine>> {
        let mut slot = runtime.lease.lock().await;
        if let Some(lease) = &*slot {
            return Ok(lease.engine());
        }

        let deadline = Some(Duration::from_millis(timeout_ms));
        let key = &runtime.options.config_key;
        let lease = if runtime.options.proxy.enabled {
            match self.proxy.current_route(&runtime.context_id).await? {
                Some(route) => {
                    self.pool
                        .acquire_proxied(key, &route.endpoint_id, &route.server_url, deadline)
                        .await?
                }
                None => self.pool.acquire(key, deadline).await?,
            }
        } else {
            self.pool.acquire(key, deadline).await?
        };

        self.pool
            .assign_context(lease.instance_id(), &runtime.context_id)
            .await;
        self.registry
            .bind_instance(&runtime.context_id, Some(lease.instance_id().to_string()))
            .await?;
        debug!(
            context_id = %runtime.context_id,
            instance_id = %lease.instance_id(),
            "context re-bound to browser instance"
        );
        let engine = lease.engine();
        *slot = Some(lease);
        Ok(engine)
    }

    /// Step 3: find the target page, auto-creating one for a `navigate`
    /// into a context with no pages.
    async fn resolve_page(
        &self,
        req: &ExecRequest,
        action: &Action,
        runtime: &Arc<ContextRuntime>,
        engine: &Arc<dyn berth_driver::BrowserEngine>,
    ) -> Result<(String, Arc<dyn berth_driver::PageHandle>)> {
        if let Some(page_id) = &req.page_id {
            return runtime
                .pages
                .lock()
                .unwrap()
                .get(page_id)
                .map(|handle| (page_id.clone(), handle))
                .ok_or_else(|| Error::not_found(format!("page {page_id}")));
        }

        if let Some((id, handle)) = runtime.pages.lock().unwrap().newest() {
            return Ok((id, handle));
        }

        if !matches!(action, Action::Navigate { .. }) {
            return Err(Error::not_found("context has no pages"));
        }

        let handle: Arc<dyn berth_driver::PageHandle> = Arc::from(engine.new_page().await?);
        handle.set_viewport(runtime.options.viewport).await?;
        if let Some(user_agent) = &runtime.options.user_agent {
            handle.set_user_agent(user_agent).await?;
        }
        let page = self
            .registry
            .create_page(&runtime.context_id, req.origin)
            .await?;
        runtime
            .pages
            .lock()
            .unwrap()
            .insert(page.id.clone(), handle.clone());
        Ok((page.id, handle))
    }

    /// Step 5: the per-variant handlers.
    async fn dispatch(
        &self,
        action: &Action,
        page: &Arc<dyn berth_driver::PageHandle>,
        runtime: &Arc<ContextRuntime>,
        timeout_ms: u64,
    ) -> Result<serde_json::Value> {
        match action {
            Action::Navigate {
                url, wait_until, ..
            } => {
                let route = if runtime.options.proxy.enabled {
                    self.proxy.proxy_for_url(url, &runtime.context_id).await?
                } else {
                    None
                };
                let params = NavigateParams {
                    wait_until: *wait_until,
                    timeout_ms,
                    referer: None,
                };
                match page.goto(url, params).await {
                    Ok(outcome) => {
                        if let Some(route) = &route {
                            self.proxy.report_success(&route.endpoint_id).await;
                        }
                        Ok(serde_json::json!({
                            "finalUrl": outcome.final_url,
                            "statusCode": outcome.status_code,
                        }))
                    }
                    Err(e) => {
                        if let Some(route) = &route {
                            if !matches!(e, DriverError::Timeout(_)) {
                                self.proxy
                                    .report_failure(&route.endpoint_id, &e.to_string())
                                    .await;
                            }
                            if matches!(e, DriverError::Navigation(_)) {
                                return Err(Error::proxy_failure(e.to_string()));
                            }
                        }
                        Err(e.into())
                    }
                }
            }
            Action::Click {
                selector,
                button,
                click_count,
                delay_ms,
                ..
            } => {
                page.click(
                    selector,
                    ClickParams {
                        button: *button,
                        click_count: *click_count,
                        delay_ms: *delay_ms,
                    },
                )
                .await?;
                Ok(serde_json::json!({}))
            }
            Action::Type {
                selector,
                text,
                delay_ms,
                ..
            } => {
                page.type_text(selector, text, *delay_ms).await?;
                Ok(serde_json::json!({}))
            }
            Action::Select {
                selector, values, ..
            } => {
                let selected = page.select(selector, values).await?;
                Ok(serde_json::json!({ "selected": selected }))
            }
            Action::Hover { selector } => {
                page.hover(selector).await?;
                Ok(serde_json::json!({}))
            }
            Action::Focus { selector } => {
                page.focus(selector).await?;
                Ok(serde_json::json!({}))
            }
            Action::Blur { selector } => {
                page.blur(selector).await?;
                Ok(serde_json::json!({}))
            }
            Action::Screenshot {
                selector,
                full_page,
                format,
                quality,
                clip,
            } => {
                let bytes = page
                    .screenshot(ScreenshotParams {
                        selector: selector.clone(),
                        full_page: *full_page,
                        format: *format,
                        quality: *quality,
                        clip: *clip,
                    })
                    .await?;
                Ok(serde_json::json!({
                    "image": base64::engine::general_purpose::STANDARD.encode(&bytes),
                    "format": format.as_str(),
                    "size": bytes.len(),
                }))
            }
            Action::Pdf {
                landscape,
                print_background,
                scale,
                paper_width,
                paper_height,
                page_ranges,
            } => {
                let bytes = page
                    .pdf(PdfParams {
                        landscape: *landscape,
                        print_background: *print_background,
                        scale: *scale,
                        paper_width: *paper_width,
                        paper_height: *paper_height,
                        page_ranges: page_ranges.clone(),
                    })
                    .await?;
                Ok(serde_json::json!({
                    "pdf": base64::engine::general_purpose::STANDARD.encode(&bytes),
                    "size": bytes.len(),
                }))
            }
            Action::Evaluate { code, args, .. } => {
                let script = if args.is_empty() {
                    code.clone()
                } else {
                    let rendered: Vec<String> = args
                        .iter()
                        .map(|a| serde_json::to_string(a).unwrap_or_else(|_| "null".into()))
                        .collect();
                    format!("({})({})", code, rendered.join(", "))
                };
                let value = page.evaluate(&script).await?;
                Ok(serde_json::json!({ "value": value }))
            }
            Action::Wait { target, .. } => {
                if let Some(selector) = &target.selector {
                    page.wait_for_selector(selector, timeout_ms).await?;
                } else if let Some(function) = &target.function {
                    page.wait_for_function(function, timeout_ms).await?;
                } else if let Some(duration_ms) = target.duration_ms {
                    sleep(Duration::from_millis(duration_ms.min(timeout_ms))).await;
                }
                Ok(serde_json::json!({}))
            }
            Action::Cookie {
                operation,
                cookies,
                name,
                domain,
            } => match operation {
                CookieOp::Set => {
                    page.set_cookies(cookies.clone()).await?;
                    Ok(serde_json::json!({ "set": cookies.len() }))
                }
                CookieOp::Get => {
                    let mut all = page.cookies().await?;
                    if let Some(name) = name {
                        all.retain(|c| &c.name == name);
                    }
                    Ok(serde_json::json!({ "cookies": all }))
                }
                CookieOp::Delete => {
                    let name = name.as_deref().unwrap_or_default();
                    page.delete_cookie(name, domain.as_deref()).await?;
                    Ok(serde_json::json!({}))
                }
                CookieOp::Clear => {
                    page.clear_cookies().await?;
                    Ok(serde_json::json!({}))
                }
            },
            Action::HistoryNavigate { direction, .. } => {
                let outcome = match direction {
                    HistoryDirection::Refresh => page.reload(timeout_ms).await?,
                    HistoryDirection::Back => {
                        let history = page.history().await?;
                        if !history.can_go_back() {
                            return Err(Error::invalid_argument("no history entry to go back to"));
                        }
                        page.go_back(timeout_ms).await?
                    }
                    HistoryDirection::Forward => {
                        let history = page.history().await?;
                        if !history.can_go_forward() {
                            return Err(Error::invalid_argument(
                                "no history entry to go forward to",
                            ));
                        }
                        page.go_forward(timeout_ms).await?
                    }
                };
                Ok(serde_json::json!({
                    "finalUrl": outcome.final_url,
                    "statusCode": outcome.status_code,
                }))
            }
            Action::SetViewport { viewport } => {
                let normalized = viewport.normalize();
                page.set_viewport(normalized).await?;
                Ok(serde_json::json!({ "viewport": normalized }))
            }
            Action::SetUserAgent { user_agent } => {
                page.set_user_agent(user_agent).await?;
                Ok(serde_json::json!({}))
            }
            Action::Content {} => {
                let content = page.content().await?;
                Ok(serde_json::json!({ "content": content }))
            }
            Action::Scroll { dx, dy } => {
                page.scroll_by(*dx, *dy).await?;
                Ok(serde_json::json!({}))
            }
            Action::Upload {
                selector,
                file_path,
                ..
            } => {
                page.upload_file(selector, file_path).await?;
                Ok(serde_json::json!({}))
            }
        }
    }

    /// The instance died under us: discard the binding, flag the context for
    /// recovery, and hand the carcass to the pool.
    async fn on_fatal(&self, runtime: &Arc<ContextRuntime>) {
        warn!(context_id = %runtime.context_id, "browser died mid-action");
        runtime.pages.lock().unwrap().drain();
        let lease = runtime.lease.lock().await.take();
        self.registry
            .mark_recovering(std::slice::from_ref(&runtime.context_id))
            .await;
        if let Some(lease) = lease {
            let instance_id = lease.instance_id().to_string();
            lease.forget();
            self.pool.report_crash(&instance_id, "driver failure").await;
        }
    }
}

fn failure_result(
    action_type: &str,
    req: &ExecRequest,
    page_id: Option<String>,
    error: Error,
    started: Instant,
    warnings: Vec<String>,
) -> ActionResult {
    ActionResult {
        action_type: action_type.to_string(),
        context_id: req.context_id.clone(),
        page_id,
        success: false,
        data: serde_json::Value::Null,
        error: Some(error.kind()),
        error_message: Some(error.message().to_string()),
        warnings,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
