//! TCP RPC adapter round trips.

use berth_api::auth::AuthConfig;
use berth_api::{rpc, AppState};
use berth_driver::EngineKind;
use berth_facade::{BrowserPlane, PlaneConfig};
use berth_pool::PoolConfig;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

async fn rpc_server() -> (std::net::SocketAddr, watch::Sender<bool>) {
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
    let state = AppState::new(plane, AuthConfig::from_spec("tok1:u1:Alice"));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let addr = rpc::spawn(state, shutdown_rx).await.unwrap();
    (addr, shutdown_tx)
}

async fn roundtrip(stream: &mut TcpStream, frame: Value) -> Value {
    let mut bytes = serde_json::to_vec(&frame).unwrap();
    bytes.push(b'\n');
    stream.write_all(&bytes).await.unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn session_lifecycle_over_rpc() {
    let (addr, _shutdown) = rpc_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = roundtrip(
        &mut stream,
        json!({"id": 1, "token": "tok1", "op": "session.create", "params": {}}),
    )
    .await;
    assert_eq!(response["id"], 1);
    let session_id = response["result"]["id"].as_str().unwrap().to_string();

    let response = roundtrip(
        &mut stream,
        json!({
            "id": 2,
            "token": "tok1",
            "op": "context.create",
            "params": {"sessionId": session_id},
        }),
    )
    .await;
    let context_id = response["result"]["id"].as_str().unwrap().to_string();

    let response = roundtrip(
        &mut stream,
        json!({
            "id": 3,
            "token": "tok1",
            "op": "execute",
            "params": {
                "contextId": context_id,
                "action": {"type": "navigate", "url": "https://example.com"},
            },
        }),
    )
    .await;
    assert_eq!(response["result"]["success"], true);
    assert_eq!(response["result"]["data"]["finalUrl"], "https://example.com/");
}

#[tokio::test]
async fn bad_token_is_unauthorized() {
    let (addr, _shutdown) = rpc_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = roundtrip(
        &mut stream,
        json!({"id": 7, "token": "wrong", "op": "session.create", "params": {}}),
    )
    .await;
    assert_eq!(response["id"], 7);
    assert_eq!(response["error"]["kind"], "Unauthorized");
}

#[tokio::test]
async fn malformed_frame_is_rejected() {
    let (addr, _shutdown) = rpc_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"this is not json\n").await.unwrap();
    let mut reader = BufReader::new(&mut stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["error"]["kind"], "InvalidArgument");
}
