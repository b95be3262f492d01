use std::net::SocketAddr;
use std::path::PathBuf;

use berth_api::auth::AuthConfig;
use berth_api::config::FileConfig;
use berth_api::{build_router, AppState};
use berth_facade::{BrowserPlane, PlaneConfig};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "berth-api")]
#[command(about = "Multi-tenant headless-browser rental service")]
struct Args {
    /// JSON config file; missing file falls back to defaults.
    #[arg(long, default_value = "config/berth.json")]
    config: PathBuf,

    /// HTTP (and WebSocket) listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind_http: SocketAddr,

    /// TCP RPC listen address.
    #[arg(long, default_value = "0.0.0.0:8090")]
    bind_rpc: SocketAddr,

    /// Disable the HTTP front-end.
    #[arg(long)]
    no_http: bool,

    /// Disable the RPC front-end.
    #[arg(long)]
    no_rpc: bool,

    /// Disable the WebSocket push channel.
    #[arg(long)]
    no_ws: bool,

    /// API keys as `token:user:name[:role[;role]]`, comma-separated.
    #[arg(long, env = "BERTH_API_KEYS", default_value = "")]
    api_keys: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_http = %args.bind_http,
        bind_rpc = %args.bind_rpc,
        "starting berth-api"
    );

    let plane_config = FileConfig::load(&args.config)?.apply(PlaneConfig::default());
    let plane = BrowserPlane::start(plane_config).await;

    let auth = AuthConfig::from_spec(&args.api_keys);
    if auth.is_empty() {
        warn!("no api keys configured; every request will be rejected");
    }
    let state = AppState::new(plane.clone(), auth);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut adapters = Vec::new();

    if !args.no_http {
        let router = build_router(state.clone(), !args.no_ws);
        let listener = tokio::net::TcpListener::bind(args.bind_http).await?;
        info!(addr = %args.bind_http, ws_enabled = !args.no_ws, "http adapter listening");
        let mut rx = shutdown_rx.clone();
        adapters.push(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.changed().await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "http adapter exited with error");
            }
        }));
    }

    if !args.no_rpc {
        let listener = tokio::net::TcpListener::bind(args.bind_rpc).await?;
        let state = state.clone();
        let rx = shutdown_rx.clone();
        adapters.push(tokio::spawn(async move {
            if let Err(e) = berth_api::rpc::serve(state, listener, rx).await {
                warn!(error = %e, "rpc adapter exited with error");
            }
        }));
    }

    wait_for_signal().await;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    plane.shutdown().await;
    for adapter in adapters {
        let _ = adapter.await;
    }
    info!("berth-api stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
