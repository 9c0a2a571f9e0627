//! Control socket: line-delimited JSON-RPC 2.0 over a Unix socket.
//!
//! Each request is one JSON object on one line; each response likewise.
//! Requests on a connection are answered in order.

use super::handlers::{ApiState, RadarApiImpl, RadarApiServer, internal_error};
use anyhow::{Context, Result};
use jsonrpsee::types::{ErrorCode, ErrorObject};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type RpcOutcome = Result<Value, ErrorObject<'static>>;

/// Handle to a running control socket.
pub struct ServerHandle {
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
    accept_loop: Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Connections already being served finish on their own.
    pub async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(()).await;
        }

        if let Some(task) = self.accept_loop.lock().await.take() {
            task.await.context("Accept loop panicked")?;
        }

        Ok(())
    }
}

/// Bind `socket_path` and serve the API until [`ServerHandle::stop`].
///
/// A stale socket file left by a previous run is replaced.
pub async fn start_server(socket_path: &Path, state: ApiState) -> Result<ServerHandle> {
    if socket_path.exists() {
        warn!("Removing stale socket at {:?}", socket_path);
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove existing socket at {:?}", socket_path))?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {:?}", parent))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind Unix socket at {:?}", socket_path))?;
    info!("Control socket listening on {:?}", socket_path);

    let api = Arc::new(RadarApiImpl::new(state));
    let (tx, mut rx) = mpsc::channel::<()>(1);

    let accept_loop = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = rx.recv() => {
                    debug!("Control socket shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let api = api.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, &api).await {
                                warn!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }
    });

    Ok(ServerHandle {
        shutdown: Mutex::new(Some(tx)),
        accept_loop: Mutex::new(Some(accept_loop)),
    })
}

async fn serve_connection(mut stream: UnixStream, api: &RadarApiImpl) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!("Request: {}", line);

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => dispatch(request, api).await,
            Err(e) => response(
                Value::Null,
                Err(ErrorObject::owned(
                    ErrorCode::ParseError.code(),
                    format!("Parse error: {}", e),
                    None::<()>,
                )),
            ),
        };

        writer.write_all(response.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn dispatch(request: Value, api: &RadarApiImpl) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    let outcome = match request.get("method").and_then(Value::as_str) {
        Some("sync_now") => serialize(api.sync_now().await),
        Some("last_run") => serialize(api.last_run().await),
        Some("status") => serialize(api.status().await),
        Some(other) => Err(ErrorObject::owned(
            ErrorCode::MethodNotFound.code(),
            format!("Method not found: {}", other),
            None::<()>,
        )),
        None => Err(ErrorObject::owned(
            ErrorCode::InvalidRequest.code(),
            "Invalid Request: missing method",
            None::<()>,
        )),
    };

    response(id, outcome)
}

fn serialize<T: Serialize>(result: Result<T, ErrorObject<'static>>) -> RpcOutcome {
    result.and_then(|value| serde_json::to_value(value).map_err(internal_error))
}

fn response(id: Value, outcome: RpcOutcome) -> Value {
    match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "result": result, "id": id }),
        Err(error) => json!({
            "jsonrpc": "2.0",
            "error": { "code": error.code(), "message": error.message() },
            "id": id,
        }),
    }
}
