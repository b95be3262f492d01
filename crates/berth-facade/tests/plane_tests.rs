//! Service-level scenarios against the sim engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use berth_driver::EngineKind;
use berth_executor::{parse_action, ExecRequest};
use berth_facade::{BrowserPlane, PlaneConfig};
use berth_pool::PoolConfig;
use berth_proxy::{EndpointConfig, ProxyManagerConfig, ProxyScheme, SelectionStrategy};
use berth_types::{ContextOptions, ErrorKind, Principal, Protocol, ProxyPolicy, Viewport};

fn sim_config() -> PlaneConfig {
    PlaneConfig {
        engine: EngineKind::Sim.into(),
        pool: PoolConfig {
            min_size: 0,
            max_size: 4,
            ..PoolConfig::default()
        },
        ..PlaneConfig::default()
    }
}

async fn plane() -> Arc<BrowserPlane> {
    BrowserPlane::start(sim_config()).await
}

fn u1() -> Principal {
    Principal::new("u1", "User One")
}

async fn session_and_context(plane: &BrowserPlane) -> (String, String) {
    let session = plane
        .create_session(&u1(), None, HashMap::new(), Protocol::Http)
        .await
        .unwrap();
    let context = plane
        .create_context(
            &u1(),
            &session.id,
            ContextOptions {
                viewport: Viewport {
                    width: 1280,
                    height: 720,
                    ..Viewport::default()
                },
                ..ContextOptions::default()
            },
            Protocol::Http,
        )
        .await
        .unwrap();
    (session.id, context.id)
}

fn exec(context_id: &str) -> ExecRequest {
    ExecRequest {
        principal: u1(),
        context_id: context_id.to_string(),
        page_id: None,
        origin: Protocol::Http,
        timeout_ms: None,
    }
}

#[tokio::test]
async fn navigate_and_screenshot_scenario() {
    let plane = plane().await;
    let (_, context_id) = session_and_context(&plane).await;

    let nav = plane
        .execute(
            exec(&context_id),
            parse_action(serde_json::json!({
                "type": "navigate",
                "url": "https://example.com",
                "waitUntil": "load",
                "timeoutMs": 10_000,
            }))
            .unwrap(),
        )
        .await;
    assert!(nav.success);
    assert_eq!(nav.data["finalUrl"], "https://example.com/");

    let shot = plane
        .execute(
            exec(&context_id),
            parse_action(serde_json::json!({
                "type": "screenshot",
                "fullPage": false,
                "format": "png",
            }))
            .unwrap(),
        )
        .await;
    assert!(shot.success);
    assert_eq!(shot.data["format"], "png");
    assert!(shot.data["size"].as_u64().unwrap() > 0);

    plane.shutdown().await;
}

#[tokio::test]
async fn ssrf_block_scenario() {
    let plane = plane().await;
    let (_, context_id) = session_and_context(&plane).await;

    let nav = plane
        .execute(
            exec(&context_id),
            parse_action(serde_json::json!({"type": "navigate", "url": "http://127.0.0.1/"}))
                .unwrap(),
        )
        .await;
    assert!(!nav.success);
    assert_eq!(nav.error, Some(ErrorKind::BlockedByPolicy));
    plane.shutdown().await;
}

#[tokio::test]
async fn crash_recovery_scenario() {
    let plane = plane().await;
    let (_, context_id) = session_and_context(&plane).await;

    plane
        .execute(
            exec(&context_id),
            parse_action(serde_json::json!({"type": "navigate", "url": "https://example.com"}))
                .unwrap(),
        )
        .await;

    plane.launcher().fleet().kill_newest().unwrap();

    let failed = plane
        .execute(
            exec(&context_id),
            parse_action(serde_json::json!({"type": "navigate", "url": "https://example.com"}))
                .unwrap(),
        )
        .await;
    assert_eq!(failed.error, Some(ErrorKind::BrowserCrashed));

    let retried = plane
        .execute(
            exec(&context_id),
            parse_action(serde_json::json!({"type": "navigate", "url": "https://example.com"}))
                .unwrap(),
        )
        .await;
    assert!(retried.success);
    plane.shutdown().await;
}

#[tokio::test]
async fn context_close_releases_resources() {
    let plane = plane().await;
    let (session_id, context_id) = session_and_context(&plane).await;

    plane
        .execute(
            exec(&context_id),
            parse_action(serde_json::json!({"type": "navigate", "url": "https://example.com"}))
                .unwrap(),
        )
        .await;

    plane
        .close_context(&u1(), &context_id, Protocol::Http)
        .await
        .unwrap();
    let err = plane.get_context(&u1(), &context_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let contexts = plane.list_contexts(&u1(), &session_id).await.unwrap();
    assert!(contexts.is_empty());
    plane.shutdown().await;
}

#[tokio::test]
async fn session_delete_cascades() {
    let plane = plane().await;
    let (session_id, context_id) = session_and_context(&plane).await;

    plane
        .delete_session(&u1(), &session_id, Protocol::Http)
        .await
        .unwrap();
    assert_eq!(
        plane.get_session(&u1(), &session_id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        plane.get_context(&u1(), &context_id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    plane.shutdown().await;
}

#[tokio::test]
async fn health_reports_components_and_uptime() {
    let plane = plane().await;
    let health = plane.health().await;
    assert!(matches!(
        health.overall,
        berth_facade::OverallState::Healthy | berth_facade::OverallState::Degraded
    ));
    assert_eq!(health.pool.max_size, 4);

    let catalog = plane.catalog();
    assert_eq!(catalog["service"], "berth");
    plane.shutdown().await;
}

#[tokio::test]
async fn proxied_context_binds_through_assigned_endpoint() {
    let mut config = sim_config();
    config.proxy = ProxyManagerConfig {
        endpoints: vec![EndpointConfig {
            scheme: ProxyScheme::Http,
            host: "proxy.example".to_string(),
            port: 3128,
            username: None,
            password: None,
            bypass: vec![],
            tags: vec![],
            priority: 5,
        }],
        strategy: SelectionStrategy::Priority,
        // Long probe interval keeps the prober quiet during the test.
        probe_interval: Duration::from_secs(3600),
        ..ProxyManagerConfig::default()
    };
    let plane = BrowserPlane::start(config).await;

    let session = plane
        .create_session(&u1(), None, HashMap::new(), Protocol::Http)
        .await
        .unwrap();
    let context = plane
        .create_context(
            &u1(),
            &session.id,
            ContextOptions {
                proxy: ProxyPolicy {
                    enabled: true,
                    ..ProxyPolicy::default()
                },
                ..ContextOptions::default()
            },
            Protocol::Http,
        )
        .await
        .unwrap();
    assert!(context.assigned_instance.is_some());

    let health = plane.health().await;
    assert_eq!(health.proxy.assignments, 1);

    let nav = plane
        .execute(
            exec(&context.id),
            parse_action(serde_json::json!({"type": "navigate", "url": "https://example.com"}))
                .unwrap(),
        )
        .await;
    assert!(nav.success);

    // Traffic success fed the endpoint's health counters.
    let health = plane.health().await;
    assert_eq!(health.proxy.endpoints[0].total_successes, 1);
    plane.shutdown().await;
}

#[tokio::test]
async fn events_flow_to_subscribers() {
    let plane = plane().await;
    let mut sub = plane.subscribe(vec!["session.*".to_string()]);

    plane
        .create_session(&u1(), None, HashMap::new(), Protocol::Ws)
        .await
        .unwrap();
    let event = sub.next().await.unwrap();
    assert_eq!(event.topic, "session.created");
    assert_eq!(event.origin, Protocol::Ws);
    plane.shutdown().await;
}

#[tokio::test]
async fn expired_sessions_release_contexts() {
    let mut config = sim_config();
    config.registry.sweep_interval = Duration::from_millis(50);
    let plane = BrowserPlane::start(config).await;

    let session = plane
        .create_session(&u1(), Some(Duration::from_millis(50)), HashMap::new(), Protocol::Http)
        .await
        .unwrap();
    plane
        .create_context(&u1(), &session.id, ContextOptions::default(), Protocol::Http)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        plane.get_session(&u1(), &session.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    // The context's lease went back to the pool.
    let health = plane.health().await;
    assert_eq!(health.pool.in_use, 0);
    plane.shutdown().await;
}
