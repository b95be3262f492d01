//! Binary RPC adapter: newline-delimited JSON frames over TCP.
//!
//! Each request line is `{"id": ..., "token": ..., "op": ..., "params": {...}}`;
//! each response line echoes the id with either `result` or `error`.
//! Frames above the size cap are rejected without reading further.

use berth_types::{Error, Protocol};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::AppState;

const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: Value,
    token: String,
    op: String,
    #[serde(default)]
    params: Value,
}

pub async fn serve(
    state: AppState,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "rpc adapter listening");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!(peer = %peer, "rpc connection accepted");
                let state = state.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(state, stream, shutdown_rx).await {
                        debug!(peer = %peer, error = %e, "rpc connection ended with error");
                    }
                });
            }
            _ = shutdown_rx.changed() => {
                info!("rpc adapter stopped");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    state: AppState,
    stream: TcpStream,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown_rx.changed() => return Ok(()),
        };
        let Some(line) = line else { return Ok(()) };
        if line.trim().is_empty() {
            continue;
        }
        if line.len() > MAX_FRAME_BYTES {
            let response = error_frame(Value::Null, &Error::invalid_argument("frame too large"));
            write_frame(&mut write_half, &response).await?;
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => {
                let id = request.id.clone();
                match process(&state, request).await {
                    Ok(result) => json!({ "id": id, "result": result }),
                    Err(e) => error_frame(id, &e),
                }
            }
            Err(e) => error_frame(
                Value::Null,
                &Error::invalid_argument(format!("malformed frame: {e}")),
            ),
        };
        write_frame(&mut write_half, &response).await?;
    }
}

async fn process(state: &AppState, request: RpcRequest) -> berth_types::Result<Value> {
    let principal = state.auth.resolve_token(&request.token)?;
    crate::ops::dispatch_op(
        &state.plane,
        &principal,
        Protocol::Rpc,
        &request.op,
        request.params,
    )
    .await
}

fn error_frame(id: Value, error: &Error) -> Value {
    json!({
        "id": id,
        "error": {
            "kind": error.kind(),
            "message": error.message(),
        }
    })
}

async fn write_frame(
    writer: &mut (impl AsyncWriteExt + Unpin),
    frame: &Value,
) -> anyhow::Result<()> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    if let Err(e) = writer.write_all(&bytes).await {
        warn!(error = %e, "rpc write failed");
        return Err(e.into());
    }
    Ok(())
}

/// Convenience used by tests: spawn the adapter on an ephemeral port.
pub async fn spawn(
    state: AppState,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<std::net::SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = serve(state, listener, shutdown_rx).await {
            warn!(error = %e, "rpc adapter exited with error");
        }
    });
    Ok(addr)
}
