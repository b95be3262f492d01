//! End-to-end pipeline tests against the sim engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use berth_driver::{EngineKind, Launcher};
use berth_events::EventBus;
use berth_executor::{
    parse_action, Action, ActionExecutor, BatchOptions, ExecRequest, ExecutorConfig,
};
use berth_pool::{BrowserPool, PoolConfig};
use berth_proxy::{ProxyManager, ProxyManagerConfig};
use berth_registry::{Context, InMemoryStore, RegistryConfig, SessionRegistry};
use berth_types::{ContextOptions, ErrorKind, Principal, Protocol};
use tokio::sync::watch;

struct Harness {
    executor: Arc<ActionExecutor>,
    registry: Arc<SessionRegistry>,
    pool: Arc<BrowserPool>,
    launcher: Launcher,
    principal: Principal,
    context: Context,
    // Keeps the cancellation root alive for the executor's lifetime.
    _shutdown_tx: watch::Sender<bool>,
}

async fn harness() -> Harness {
    harness_with(ExecutorConfig::default()).await
}

async fn harness_with(config: ExecutorConfig) -> Harness {
    let bus = EventBus::new();
    let launcher = Launcher::new(EngineKind::Sim);
    let pool_config = PoolConfig {
        min_size: 0,
        max_size: 4,
        ..PoolConfig::default()
    };
    let pool = BrowserPool::start(pool_config, launcher.clone(), bus.clone()).await;
    let registry = SessionRegistry::new(
        RegistryConfig::default(),
        Arc::new(InMemoryStore::new()),
        bus.clone(),
    );
    let proxy = ProxyManager::new(ProxyManagerConfig::default(), bus.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor = ActionExecutor::new(
        config,
        registry.clone(),
        pool.clone(),
        proxy,
        bus,
        shutdown_rx,
    );

    let principal = Principal::new("u1", "User One");
    let session = registry
        .create_session(&principal, None, HashMap::new(), Protocol::Http)
        .await
        .unwrap();
    let context = registry
        .create_context(&principal, &session.id, ContextOptions::default(), Protocol::Http)
        .await
        .unwrap();
    let lease = pool.acquire("default", None).await.unwrap();
    executor.attach_context(&context, lease).await.unwrap();

    Harness {
        executor,
        registry,
        pool,
        launcher,
        principal,
        context,
        _shutdown_tx: shutdown_tx,
    }
}

fn request(h: &Harness) -> ExecRequest {
    ExecRequest {
        principal: h.principal.clone(),
        context_id: h.context.id.clone(),
        page_id: None,
        origin: Protocol::Http,
        timeout_ms: None,
    }
}

fn navigate(url: &str) -> Action {
    parse_action(serde_json::json!({
        "type": "navigate",
        "url": url,
        "waitUntil": "load",
        "timeoutMs": 10_000,
    }))
    .unwrap()
}

#[tokio::test]
async fn navigate_then_screenshot() {
    let h = harness().await;

    let result = h
        .executor
        .execute(request(&h), navigate("https://example.com"))
        .await;
    assert!(result.success, "navigate failed: {:?}", result.error_message);
    assert_eq!(result.data["finalUrl"], "https://example.com/");
    let page_id = result.page_id.clone().unwrap();

    let result = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({
                "type": "screenshot",
                "fullPage": false,
                "format": "png",
            }))
            .unwrap(),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.data["format"], "png");
    assert!(result.data["size"].as_u64().unwrap() > 0);
    assert_eq!(result.page_id.as_deref(), Some(page_id.as_str()));

    // Registry tracked the navigation.
    let page = h.registry.get_page(&h.principal, &page_id).await.unwrap();
    assert_eq!(page.url, "https://example.com/");
    assert!(page.ready);
}

#[tokio::test]
async fn ssrf_targets_are_blocked() {
    let h = harness().await;
    let result = h
        .executor
        .execute(request(&h), navigate("http://127.0.0.1/"))
        .await;
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::BlockedByPolicy));

    // The block is recorded in history.
    let history = h
        .executor
        .history(&h.principal, &h.context.id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].error, Some(ErrorKind::BlockedByPolicy));
}

#[tokio::test]
async fn evaluate_guards_and_runs() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;

    let rejected = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({"type": "evaluate", "code": "eval('1')"})).unwrap(),
        )
        .await;
    assert!(!rejected.success);
    assert_eq!(rejected.error, Some(ErrorKind::BlockedByPolicy));

    let ok = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({"type": "evaluate", "code": "1+2+3"})).unwrap(),
        )
        .await;
    assert!(ok.success);
    assert_eq!(ok.data["value"], 6);
}

#[tokio::test]
async fn script_runtime_error_is_classified() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;
    let result = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({"type": "evaluate", "code": "throw 'boom'"})).unwrap(),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::ScriptRuntimeError));
}

#[tokio::test]
async fn non_navigate_without_pages_is_not_found() {
    let h = harness().await;
    let result = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({"type": "click", "selector": "#go"})).unwrap(),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn crash_fails_action_then_rebinds_on_retry() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;

    // Kill the engine behind the context's back.
    h.launcher.fleet().kill_newest().unwrap();

    let failed = h
        .executor
        .execute(request(&h), navigate("https://example.com/again"))
        .await;
    assert!(!failed.success);
    assert_eq!(failed.error, Some(ErrorKind::BrowserCrashed));

    // The context is recovering; a retry re-binds to a fresh instance.
    let retried = h
        .executor
        .execute(request(&h), navigate("https://example.com/again"))
        .await;
    assert!(retried.success, "retry failed: {:?}", retried.error_message);
    assert_eq!(retried.data["finalUrl"], "https://example.com/again");

    let stats = h.pool.stats().await;
    assert_eq!(stats.crashed_total, 1);
}

#[tokio::test]
async fn cookie_roundtrip() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;

    let set = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({
                "type": "cookie",
                "operation": "set",
                "cookies": [{"name": "sid", "value": "abc123", "secure": true}],
            }))
            .unwrap(),
        )
        .await;
    assert!(set.success, "{:?}", set.error_message);

    let get = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({
                "type": "cookie",
                "operation": "get",
                "name": "sid",
            }))
            .unwrap(),
        )
        .await;
    assert!(get.success);
    let cookies = get.data["cookies"].as_array().unwrap();
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0]["value"], "abc123");
}

#[tokio::test]
async fn history_navigation_probes_before_moving() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com/a"))
        .await;

    let back = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({"type": "historyNavigate", "direction": "back"}))
                .unwrap(),
        )
        .await;
    assert!(!back.success);
    assert_eq!(back.error, Some(ErrorKind::InvalidArgument));

    h.executor
        .execute(request(&h), navigate("https://example.com/b"))
        .await;
    let back = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({"type": "historyNavigate", "direction": "back"}))
                .unwrap(),
        )
        .await;
    assert!(back.success, "{:?}", back.error_message);
    assert_eq!(back.data["finalUrl"], "https://example.com/a");

    // Refresh is always permitted.
    let refresh = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({"type": "historyNavigate", "direction": "refresh"}))
                .unwrap(),
        )
        .await;
    assert!(refresh.success);
}

#[tokio::test]
async fn viewport_roundtrip_normalizes() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;

    let result = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({
                "type": "setViewport",
                "width": 1920,
                "height": 1080,
                "deviceScaleFactor": 1.52,
            }))
            .unwrap(),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.data["viewport"]["width"], 1920);
    assert_eq!(result.data["viewport"]["deviceScaleFactor"], 1.5);
    assert_eq!(result.data["viewport"]["isLandscape"], true);
}

#[tokio::test]
async fn cross_principal_execution_is_denied_and_unrecorded() {
    let h = harness().await;
    let intruder = Principal::new("intruder", "Intruder");
    let result = h
        .executor
        .execute(
            ExecRequest {
                principal: intruder,
                ..request(&h)
            },
            navigate("https://example.com"),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::PermissionDenied));

    let history = h
        .executor
        .history(&h.principal, &h.context.id, 10)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn batch_stops_on_error_by_default() {
    let h = harness().await;
    let items = vec![
        (None, navigate("https://example.com")),
        (
            None,
            parse_action(serde_json::json!({"type": "click", "selector": "#missing-button"}))
                .unwrap(),
        ),
        (
            None,
            parse_action(serde_json::json!({"type": "content"})).unwrap(),
        ),
    ];
    let results = h
        .executor
        .execute_batch(request(&h), items, BatchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 2, "third action skipped after failure");
    assert!(results[0].success);
    assert!(!results[1].success);
}

#[tokio::test]
async fn batch_size_cap_rejects_envelope() {
    let h = harness().await;
    let items: Vec<(Option<String>, Action)> = (0..101)
        .map(|_| (None, navigate("https://example.com")))
        .collect();
    let err = h
        .executor
        .execute_batch(request(&h), items, BatchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn parallel_batch_requires_distinct_pages() {
    let h = harness().await;
    let items = vec![
        (Some("page_a".to_string()), navigate("https://example.com")),
        (Some("page_a".to_string()), navigate("https://example.com")),
    ];
    let err = h
        .executor
        .execute_batch(
            request(&h),
            items,
            BatchOptions {
                stop_on_error: true,
                parallel: 2,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn concurrent_actions_on_one_context_are_serialized() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;

    let wait = |ms: u64| {
        parse_action(serde_json::json!({
            "type": "wait",
            "durationMs": ms,
            "timeoutMs": 1000,
        }))
        .unwrap()
    };

    let a = h.executor.execute(request(&h), wait(60));
    let b = h.executor.execute(request(&h), wait(60));
    let (ra, rb) = tokio::join!(a, b);
    assert!(ra.success && rb.success);

    let records = h
        .executor
        .history(&h.principal, &h.context.id, 10)
        .await
        .unwrap();
    let waits: Vec<_> = records.iter().filter(|r| r.action_type == "wait").collect();
    assert_eq!(waits.len(), 2);
    // Records carry completion time and duration; serialized execution means
    // one action's window ends before the other's begins.
    let window = |r: &berth_executor::ActionRecord| {
        let end = r.at;
        let start = end - chrono::Duration::milliseconds(r.duration_ms as i64);
        (start, end)
    };
    let (a_start, a_end) = window(waits[1]);
    let (b_start, b_end) = window(waits[0]);
    // Allow a few ms of wall-clock sampling slack around the boundary.
    let slack = chrono::Duration::milliseconds(5);
    assert!(
        a_end <= b_start + slack || b_end <= a_start + slack,
        "action windows overlap"
    );
}

#[tokio::test]
async fn metrics_aggregate_over_actions() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;
    h.executor
        .execute(request(&h), navigate("http://127.0.0.1/"))
        .await;

    let metrics = h
        .executor
        .metrics(&h.principal, &h.context.id)
        .await
        .unwrap();
    assert_eq!(metrics.total, 2);
    assert_eq!(metrics.successes, 1);
    assert_eq!(metrics.failures, 1);
    assert_eq!(metrics.by_type["navigate"], 2);
}

#[tokio::test]
async fn detach_returns_lease_to_pool() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;
    assert_eq!(h.pool.stats().await.in_use, 1);

    h.executor.detach_context(&h.context.id).await;
    let stats = h.pool.stats().await;
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn uploads_disabled_by_default() {
    let h = harness().await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;
    let result = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({
                "type": "upload",
                "selector": "#file",
                "filePath": "/tmp/anything.txt",
            }))
            .unwrap(),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::BlockedByPolicy));
}

#[tokio::test]
async fn upload_prefix_is_enforced() {
    let h = harness_with(ExecutorConfig {
        upload_prefix: Some("/srv/uploads".into()),
        ..ExecutorConfig::default()
    })
    .await;
    h.executor
        .execute(request(&h), navigate("https://example.com"))
        .await;

    let escape = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({
                "type": "upload",
                "selector": "#file",
                "filePath": "/srv/uploads/../secrets.txt",
            }))
            .unwrap(),
        )
        .await;
    assert!(!escape.success);
    assert_eq!(escape.error, Some(ErrorKind::BlockedByPolicy));

    let inside = h
        .executor
        .execute(
            request(&h),
            parse_action(serde_json::json!({
                "type": "upload",
                "selector": "#file",
                "filePath": "/srv/uploads/data.csv",
            }))
            .unwrap(),
        )
        .await;
    assert!(inside.success, "{:?}", inside.error_message);
}
