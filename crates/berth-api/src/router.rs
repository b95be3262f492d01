//! HTTP router assembly.

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::handlers::{actions, contexts, sessions, system};
use crate::state::AppState;
use crate::ws;

pub fn build_router(state: AppState, ws_enabled: bool) -> Router {
    let api = Router::new()
        .route("/sessions", post(sessions::create).get(sessions::list))
        .route(
            "/sessions/:id",
            get(sessions::get)
                .patch(sessions::update_metadata)
                .delete(sessions::delete),
        )
        .route("/sessions/:id/extend", post(sessions::extend))
        .route(
            "/sessions/:id/contexts",
            post(contexts::create).get(contexts::list),
        )
        .route("/contexts/:id", get(contexts::get).delete(contexts::close))
        .route("/contexts/:id/pages", post(contexts::create_page))
        .route(
            "/pages/:id",
            get(contexts::get_page).delete(contexts::close_page),
        )
        .route("/contexts/:id/execute", post(actions::execute))
        .route("/contexts/:id/batch", post(actions::execute_batch))
        .route("/contexts/:id/history", get(actions::history))
        .route("/contexts/:id/metrics", get(actions::metrics))
        .route("/catalog", get(system::catalog));

    let mut protected = Router::new().nest("/api/v1", api);
    if ws_enabled {
        protected = protected.route("/ws/events", get(ws::events_upgrade));
    }
    let protected = protected.layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/healthz", get(system::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use berth_driver::EngineKind;
    use berth_facade::{BrowserPlane, PlaneConfig};
    use berth_pool::PoolConfig;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let plane = BrowserPlane::start(PlaneConfig {
            engine: EngineKind::Sim.into(),
            pool: PoolConfig {
                min_size: 0,
                max_size: 2,
                ..PoolConfig::default()
            },
            ..PlaneConfig::default()
        })
        .await;
        AppState::new(plane, AuthConfig::from_spec("tok1:u1:Alice"))
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let router = build_router(test_state().await, true);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_requires_credentials() {
        let router = build_router(test_state().await, true);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/catalog")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_catalog_and_session_create() {
        let router = build_router(test_state().await, true);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/catalog")
                    .header("x-api-key", "tok1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/sessions")
                    .header("x-api-key", "tok1")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
